// ⚙️ Run Configuration - directories, grid resolutions, channel table
//
// Everything has a default; a JSON file only needs the keys it changes.

use crate::grid::GridSize;
use crate::reporting::{ChannelOptions, Location, Reporter};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const TERC_FILE: &str = "TERC.csv";
pub const SIMC_FILE: &str = "SIMC.csv";
pub const KINDS_FILE: &str = "WMRODZ.csv";
pub const OSM_FILE: &str = "data.osm";

// ============================================================================
// MATCHING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// One grid-assisted pass per entry, after the name-only pass
    pub match_grids: Vec<GridSize>,
    /// Refinement rounds; each one re-checks the previous round's suspects
    pub refine_grids: Vec<GridSize>,
    /// Same-unit neighbours a match needs in its cell
    pub min_neighbours: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            match_grids: vec![GridSize::new(31, 31), GridSize::new(43, 43)],
            refine_grids: vec![GridSize::new(23, 23), GridSize::new(19, 19)],
            min_neighbours: 2,
        }
    }
}

// ============================================================================
// RUN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub write_wiki: bool,
    /// Match and report, but write no change files
    pub dry_run: bool,
    pub generator: String,
    pub matching: MatchConfig,
    /// Overrides on top of `default_channels()`
    pub channels: BTreeMap<String, ChannelOptions>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            reports_dir: PathBuf::from("reports"),
            write_wiki: true,
            dry_run: false,
            generator: format!("{} {}", crate::GENERATOR_NAME, crate::VERSION),
            matching: MatchConfig::default(),
            channels: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn input_files(&self) -> InputFiles {
        InputFiles::in_dir(&self.data_dir)
    }

    /// Default channel table with this run's overrides applied
    pub fn channel_table(&self) -> BTreeMap<String, ChannelOptions> {
        let mut table = default_channels();
        table.extend(self.channels.iter().map(|(k, v)| (k.clone(), *v)));
        table
    }
}

/// Channel options used unless the config says otherwise
pub fn default_channels() -> BTreeMap<String, ChannelOptions> {
    let quiet_mapped = ChannelOptions::new(true, true, 2);
    let table = [
        ("errors", ChannelOptions::new(false, true, 2)),
        ("bad_type", quiet_mapped),
        ("not_found", quiet_mapped),
        ("not_found2", quiet_mapped),
        ("not_found3", quiet_mapped),
        ("hierarchy_mismatch", quiet_mapped),
        ("ambiguous1", quiet_mapped),
        ("ambiguous2", quiet_mapped),
        ("ambiguous3", ChannelOptions::new(false, true, 2)),
        ("match", quiet_mapped),
        ("bad_match", ChannelOptions::new(true, true, 1)),
        ("really_bad_match", ChannelOptions::new(true, true, 1)),
        ("preassigned", ChannelOptions::new(true, false, 1)),
        ("province_set", ChannelOptions::new(true, false, 0)),
        ("county_set", ChannelOptions::new(true, false, 0)),
        ("updated", ChannelOptions::new(true, true, 1)),
    ];
    table
        .into_iter()
        .map(|(name, options)| (name.to_string(), options))
        .collect()
}

// ============================================================================
// INPUT FILES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFiles {
    pub terc: PathBuf,
    pub simc: PathBuf,
    pub kinds: PathBuf,
    pub osm: PathBuf,
}

impl InputFiles {
    pub fn in_dir(dir: &Path) -> Self {
        InputFiles {
            terc: dir.join(TERC_FILE),
            simc: dir.join(SIMC_FILE),
            kinds: dir.join(KINDS_FILE),
            osm: dir.join(OSM_FILE),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [
            self.terc.as_path(),
            self.simc.as_path(),
            self.kinds.as_path(),
            self.osm.as_path(),
        ]
    }

    pub fn missing(&self) -> Vec<&Path> {
        self.all().into_iter().filter(|p| !p.exists()).collect()
    }
}

/// Fail before any processing when an input is absent
pub fn check_inputs(files: &InputFiles, reporter: &mut Reporter) -> Result<()> {
    let missing = files.missing();
    for path in &missing {
        reporter.output(
            "critical",
            format!("Missing input file: {}", path.display()),
            Location::none(),
        );
    }
    if !missing.is_empty() {
        bail!("{} required input file(s) missing", missing.len());
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
