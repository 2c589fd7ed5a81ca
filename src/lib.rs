// TERYT Reconcile - Core Library
// Exposes all modules for use in the CLI and tests

pub mod error;
pub mod parser;
pub mod osm;
pub mod entities;
pub mod grid;
pub mod reporting;
pub mod config;
pub mod matcher;
pub mod changeset;
pub mod wiki;
pub mod pipeline;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use error::{LookupError, UnitKind};
pub use parser::{load_kinds, load_simc, load_terc, KindRow, SimcRow, TercRow};
pub use osm::{load_nodes, read_nodes, write_node, OsmNode};
pub use entities::{
    AdminRegistry, Hierarchy, KindTable, MapPlace, PlaceCatalog, PlaceId, Settlement,
    SettlementCatalog, SettlementId,
};
pub use grid::{Grid, GridMember, GridSize};
pub use reporting::{ChannelOptions, Location, Reporter};
pub use config::{MatchConfig, RunConfig};
pub use matcher::{MatchEngine, MatchOutcome, PassStats, Verdict};
pub use changeset::{ChangeEmitter, PlaceUpdate, TagChange};
pub use pipeline::{run, RunSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name written into generated OSM files
pub const GENERATOR_NAME: &str = "teryt-reconcile";
