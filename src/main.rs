// TERYT Reconcile - CLI
//
// Reads the TERYT catalogs and an OSM extract from the data directory,
// links map places to SIMC settlements and writes per-province osmChange
// files plus diagnostic reports.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use teryt_reconcile::{pipeline, RunConfig, RunSummary};

#[derive(Parser, Debug)]
#[command(name = "teryt-reconcile", version, about = "Match OSM places against the TERYT registry")]
struct Cli {
    /// Directory with TERC.csv, SIMC.csv, WMRODZ.csv and data.osm
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Where change files and wiki tables are written
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Where diagnostic channels and summary.json are written
    #[arg(long)]
    reports_dir: Option<PathBuf>,

    /// JSON run configuration; command-line directories take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the wiki tables
    #[arg(long)]
    no_wiki: bool,

    /// Match and report, but write no change files
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.reports_dir {
            config.reports_dir = dir.clone();
        }
        if self.no_wiki {
            config.write_wiki = false;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        Ok(config)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = cli.run_config().and_then(|config| {
        let summary = pipeline::run(&config)?;
        print_summary(&config, &summary);
        Ok(())
    });

    if let Err(err) = result {
        eprintln!("❌ {:?}", err);
        std::process::exit(1);
    }
}

fn print_summary(config: &RunConfig, summary: &RunSummary) {
    println!("🗺️  TERYT ↔ OSM reconciliation ({})", summary.generator);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "📂 Registry: {} provinces, {} counties, {} municipalities",
        summary.provinces, summary.counties, summary.municipalities
    );
    println!("📂 SIMC settlements: {}", summary.settlements);
    println!("📂 Map places: {}", summary.places);

    println!("\n🎯 Matching");
    println!("✓ Already tagged: {}", summary.preassigned);
    for pass in &summary.passes {
        let grid = pass
            .grid
            .map(|size| size.to_string())
            .unwrap_or_else(|| "no grid".to_string());
        println!(
            "✓ Pass {} ({}): {} of {} matched, {} ambiguous, {} conflicts",
            pass.pass, grid, pass.matched, pass.pool, pass.ambiguous, pass.conflicts
        );
    }
    println!("✓ Discarded as outliers: {}", summary.discarded);
    println!("✓ Accepted: {} ({} left undecided)", summary.accepted, summary.unmatched);

    println!("\n📝 Output");
    println!("✓ Places updated: {}", summary.updated);
    if config.dry_run {
        println!("✓ Dry run, no change files written");
    }
    for path in &summary.change_files {
        println!("✓ {}", path.display());
    }
    println!("✓ Reports: {}", config.reports_dir.display());

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🔑 Fingerprint: {}", summary.fingerprint);
}
