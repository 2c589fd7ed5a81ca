// Shared fixtures for unit tests

use crate::entities::admin::AdminRegistry;
use crate::entities::place::{PlaceCatalog, PlaceId};
use crate::entities::settlement::{KindTable, SettlementCatalog, SettlementId};
use crate::osm::OsmNode;
use crate::parser::SimcRow;
use crate::reporting::Reporter;
use chrono::NaiveDate;

pub fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
}

/// Four provinces, two "bielski" counties, one city county each for
/// Kraków and Warszawa
pub fn sample_registry() -> AdminRegistry {
    let mut registry = AdminRegistry::new();
    registry.add_province("MAŁOPOLSKIE", "12", as_of());
    registry.add_province("MAZOWIECKIE", "14", as_of());
    registry.add_province("PODLASKIE", "20", as_of());
    registry.add_province("ŚLĄSKIE", "24", as_of());

    registry.add_county("powiat krakowski", "1206", as_of()).unwrap();
    registry.add_county("Kraków", "1261", as_of()).unwrap();
    registry.add_county("Warszawa", "1465", as_of()).unwrap();
    registry.add_county("bielski", "2003", as_of()).unwrap();
    registry.add_county("bielski", "2402", as_of()).unwrap();

    registry.add_municipality("Zielonki", "1206152", as_of()).unwrap();
    registry.add_municipality("Kraków", "1261011", as_of()).unwrap();
    registry.add_municipality("Warszawa", "1465011", as_of()).unwrap();
    registry.add_municipality("Bielsk Podlaski", "2003022", as_of()).unwrap();
    registry.add_municipality("Jasienica", "2402042", as_of()).unwrap();
    registry
}

pub fn sample_kinds() -> KindTable {
    let mut kinds = KindTable::new();
    kinds.insert("00", "część miasta");
    kinds.insert("01", "wieś");
    kinds.insert("03", "osada");
    kinds.insert("95", "dzielnica m.st. Warszawy");
    kinds.insert("96", "miasto");
    kinds
}

pub fn simc_row(id: &str, name: &str, terc: &str, kind: &str, parent_id: &str) -> SimcRow {
    SimcRow {
        province: terc[..2].to_string(),
        county: terc[2..4].to_string(),
        municipality: terc[4..6].to_string(),
        municipality_type: terc[6..].to_string(),
        kind: kind.to_string(),
        common_name: "1".to_string(),
        name: name.to_string(),
        id: id.to_string(),
        parent_id: parent_id.to_string(),
        as_of: "2023-01-01".to_string(),
    }
}

pub fn sample_settlement_rows() -> Vec<SimcRow> {
    vec![
        simc_row("0316031", "Bibice", "1206152", "01", ""),
        simc_row("0316048", "Nowa Wieś", "1206152", "01", "0316031"),
        simc_row("0920334", "Nowa Wieś", "2402042", "01", ""),
        simc_row("0950463", "Kraków", "1261011", "96", ""),
        simc_row("0918123", "Warszawa", "1465011", "96", ""),
        simc_row("0388736", "Mokotów", "1465011", "95", "0918123"),
    ]
}

pub fn place_node(id: &str, name: &str, place: &str, lat: f64, lon: f64) -> OsmNode {
    OsmNode::new(id, lat, lon)
        .with_tag("name", name)
        .with_tag("place", place)
}

/// Registry, catalogs and an in-memory reporter wired together
pub struct World {
    pub registry: AdminRegistry,
    pub kinds: KindTable,
    pub settlements: SettlementCatalog,
    pub places: PlaceCatalog,
    pub reporter: Reporter,
}

impl World {
    pub fn insert(&mut self, node: OsmNode) -> PlaceId {
        self.places
            .insert(node, &self.registry, &mut self.settlements, &mut self.reporter)
    }

    pub fn settlement(&self, simc_id: &str) -> SettlementId {
        self.settlements.by_identifier(simc_id).unwrap()
    }
}

pub fn sample_world() -> World {
    world_with(&sample_settlement_rows())
}

pub fn world_with(rows: &[SimcRow]) -> World {
    let registry = sample_registry();
    let kinds = sample_kinds();
    let settlements = SettlementCatalog::from_rows(rows, &registry, &kinds).unwrap();
    World {
        registry,
        kinds,
        settlements,
        places: PlaceCatalog::new(),
        reporter: Reporter::in_memory(),
    }
}
