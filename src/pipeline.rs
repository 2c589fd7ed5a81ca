// 🚀 Pipeline - one full batch run from catalogs to change files
//
// Load → match → emit. Each step logs its counts; the run ends with a
// summary.json next to the diagnostic channels.

use crate::changeset::ChangeEmitter;
use crate::config::{check_inputs, RunConfig};
use crate::entities::admin::AdminRegistry;
use crate::entities::place::PlaceCatalog;
use crate::entities::settlement::{KindTable, SettlementCatalog};
use crate::matcher::{MatchEngine, PassStats};
use crate::osm::load_nodes;
use crate::parser::{load_kinds, load_simc, load_terc};
use crate::reporting::Reporter;
use crate::wiki;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub generator: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    pub provinces: usize,
    pub counties: usize,
    pub municipalities: usize,
    pub settlements: usize,
    pub places: usize,

    pub preassigned: usize,
    pub matched: usize,
    pub discarded: usize,
    pub accepted: usize,
    pub unmatched: usize,
    pub updated: usize,
    pub passes: Vec<PassStats>,

    /// Hash of the accepted (OSM id, SIMC id) pairs
    pub fingerprint: String,
    /// Messages per diagnostic channel
    pub channels: BTreeMap<String, usize>,
    pub change_files: Vec<PathBuf>,
}

/// Run the whole reconciliation with `config`
pub fn run(config: &RunConfig) -> Result<RunSummary> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();
    tracing::info!(%run_id, generator = %config.generator, "starting run");

    let mut reporter = Reporter::to_directory(&config.reports_dir)?;
    reporter.configure_all(&config.channel_table());

    let files = config.input_files();
    check_inputs(&files, &mut reporter)?;

    // Load
    let registry = AdminRegistry::from_rows(&load_terc(&files.terc)?)
        .context("Failed to build administrative registry")?;
    let kinds = KindTable::from_rows(&load_kinds(&files.kinds)?);
    let mut settlements = SettlementCatalog::from_rows(&load_simc(&files.simc)?, &registry, &kinds)
        .context("Failed to build settlement catalog")?;
    let nodes = load_nodes(&files.osm)?;
    let mut places = PlaceCatalog::from_nodes(nodes, &registry, &mut settlements, &mut reporter);

    if config.write_wiki {
        wiki::write_tables(&registry, &kinds, &config.output_dir)?;
    }

    // Match
    let engine = MatchEngine::new(&registry, &config.matching);
    let outcome = engine.run(&mut places, &mut settlements, &mut reporter);
    let fingerprint = outcome.fingerprint(&places, &settlements);

    // Emit
    let emitter = ChangeEmitter::new(&registry, &config.generator);
    let updates = emitter.apply(&outcome.accepted, &mut places, &settlements, &mut reporter);
    let change_files = if config.dry_run {
        tracing::info!(updated = updates.len(), "dry run, no change files written");
        Vec::new()
    } else {
        emitter.write_changes(&updates, &places, &config.output_dir)?
    };

    let channels = reporter.counts();
    reporter.close()?;

    let summary = RunSummary {
        run_id,
        generator: config.generator.clone(),
        started_at,
        finished_at: Utc::now(),
        provinces: registry.province_count(),
        counties: registry.county_count(),
        municipalities: registry.municipality_count(),
        settlements: settlements.len(),
        places: places.len(),
        preassigned: outcome.preassigned.len(),
        matched: outcome.matched.len(),
        discarded: outcome.discarded.len(),
        accepted: outcome.accepted.len(),
        unmatched: outcome.unmatched,
        updated: updates.len(),
        passes: outcome.passes,
        fingerprint,
        channels,
        change_files,
    };

    let summary_path = config.reports_dir.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(&summary)?;
    fs::write(&summary_path, json)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    tracing::info!(
        accepted = summary.accepted,
        updated = summary.updated,
        fingerprint = %summary.fingerprint,
        "run finished"
    );
    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================
