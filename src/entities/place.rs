// 📍 Map Places - OSM place nodes with their administrative hierarchy
//
// Each record derives Province/County/Municipality from its tags when it
// is inserted. The link to a Settlement is mutual and only changes through
// PlaceCatalog::assign / unassign, which keep both halves in step.

use crate::entities::admin::{
    normalize_terc_code, AdminRegistry, CountyId, MunicipalityId, ProvinceId,
};
use crate::entities::settlement::{normalize_place_type, Settlement, SettlementCatalog, SettlementId};
use crate::error::{LookupError, UnitKind};
use crate::osm::OsmNode;
use crate::reporting::{Location, Reporter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlaceId(usize);

// ============================================================================
// HIERARCHY
// ============================================================================

/// Administrative position of a record; any level may be unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub province: Option<ProvinceId>,
    pub county: Option<CountyId>,
    pub municipality: Option<MunicipalityId>,
}

impl Hierarchy {
    pub fn of_settlement(settlement: &Settlement) -> Self {
        Hierarchy {
            province: Some(settlement.province),
            county: Some(settlement.county),
            municipality: Some(settlement.municipality),
        }
    }

    pub fn of_municipality(registry: &AdminRegistry, id: MunicipalityId) -> Self {
        let municipality = registry.municipality(id);
        Hierarchy {
            province: Some(municipality.province),
            county: Some(municipality.county),
            municipality: Some(id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.province.is_none() && self.county.is_none() && self.municipality.is_none()
    }

    /// True when no level known on both sides disagrees
    pub fn is_consistent_with(&self, other: &Hierarchy) -> bool {
        fn agree<T: PartialEq>(a: Option<T>, b: Option<T>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }
        agree(self.province, other.province)
            && agree(self.county, other.county)
            && agree(self.municipality, other.municipality)
    }
}

// ============================================================================
// MAP PLACE
// ============================================================================

#[derive(Debug, Clone)]
pub struct MapPlace {
    pub node: OsmNode,
    pub name: Option<String>,
    /// Raw `place` tag
    pub place_type: Option<String>,
    /// `place` folded through the alias table
    pub normalized_type: Option<String>,
    /// `is_in` with components re-joined by ", "
    pub is_in: Option<String>,
    pub simc_id: Option<String>,
    pub terc_id: Option<String>,

    derived: Hierarchy,
    hierarchy: Hierarchy,
    settlement: Option<SettlementId>,
    preassigned: bool,
}

impl MapPlace {
    pub fn osm_id(&self) -> &str {
        &self.node.id
    }

    pub fn lat(&self) -> f64 {
        self.node.lat
    }

    pub fn lon(&self) -> f64 {
        self.node.lon
    }

    /// Effective hierarchy: the settlement's once linked, the derived one otherwise
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    /// Hierarchy as read from the record's own tags
    pub fn derived_hierarchy(&self) -> &Hierarchy {
        &self.derived
    }

    pub fn settlement(&self) -> Option<SettlementId> {
        self.settlement
    }

    /// Linked through a `teryt:simc` tag already present in the map data
    pub fn is_preassigned(&self) -> bool {
        self.preassigned
    }

    pub fn is_matched(&self) -> bool {
        self.settlement.is_some()
    }
}

impl fmt::Display for MapPlace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.is_in) {
            (None, _) => write!(f, "unknown #{}", self.node.id),
            (Some(name), Some(is_in)) => write!(f, "{}, {}", name, is_in),
            (Some(name), None) => f.write_str(name),
        }
    }
}

// ============================================================================
// ASSIGNMENT ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssignError {
    #[error("settlement {settlement} is already matched to map record {place}")]
    AlreadyMatched { settlement: String, place: String },

    #[error("map record {place} is already linked to settlement {settlement}")]
    PlaceAlreadyLinked { place: String, settlement: String },
}

/// Lookup result as an Option; ambiguous names and malformed codes are
/// reported on `errors`, plain misses stay silent
fn noted<T>(
    result: Result<T, LookupError>,
    place: &MapPlace,
    location: Location<'_>,
    reporter: &mut Reporter,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            if err.is_noteworthy() {
                reporter.output("errors", format!("{}: {}", place, err), location);
            }
            None
        }
    }
}

// ============================================================================
// CATALOG
// ============================================================================

/// How many records got a province / county out of their tags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    pub provinces_matched: usize,
    pub counties_matched: usize,
    pub municipalities_matched: usize,
    pub preassigned: usize,
}

#[derive(Debug, Default)]
pub struct PlaceCatalog {
    places: Vec<MapPlace>,
    by_osm_id: HashMap<String, PlaceId>,
    by_simc_id: HashMap<String, PlaceId>,
    by_name: HashMap<String, Vec<PlaceId>>,
    by_type: HashMap<String, Vec<PlaceId>>,
    stats: LoadStats,
}

impl PlaceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(
        nodes: Vec<OsmNode>,
        registry: &AdminRegistry,
        settlements: &mut SettlementCatalog,
        reporter: &mut Reporter,
    ) -> Self {
        let mut catalog = PlaceCatalog::new();
        let mut progress = reporter.progress("Loading map places", nodes.len());
        for node in nodes {
            catalog.insert(node, registry, settlements, reporter);
            progress.tick();
        }
        progress.finish();

        reporter.output(
            "stats",
            format!(
                "Loaded {} places. Matched {} provinces and {} counties.",
                catalog.len(),
                catalog.stats.provinces_matched,
                catalog.stats.counties_matched
            ),
            Location::none(),
        );
        catalog
    }

    /// Add one node, deriving its hierarchy and pre-existing link
    pub fn insert(
        &mut self,
        node: OsmNode,
        registry: &AdminRegistry,
        settlements: &mut SettlementCatalog,
        reporter: &mut Reporter,
    ) -> PlaceId {
        let id = PlaceId(self.places.len());

        let name = node.name().map(str::to_string);
        let place_type = node.tag("place").map(str::to_string);
        let normalized_type = place_type.as_deref().map(normalize_place_type);
        let is_in_parts: Vec<String> = node
            .tag("is_in")
            .map(|value| {
                value
                    .split(',')
                    .map(|part| part.trim().to_string())
                    .filter(|part| !part.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let is_in = (!is_in_parts.is_empty()).then(|| is_in_parts.join(", "));

        let mut place = MapPlace {
            node,
            name,
            place_type,
            normalized_type,
            is_in,
            simc_id: None,
            terc_id: None,
            derived: Hierarchy::default(),
            hierarchy: Hierarchy::default(),
            settlement: None,
            preassigned: false,
        };

        place.derived = self.derive_hierarchy(&place, &is_in_parts, registry, reporter);
        place.hierarchy = place.derived;

        let preassigned = self.resolve_simc_tag(id, &mut place, settlements, reporter);
        self.apply_terc_tag(&mut place, preassigned, registry, settlements, reporter);

        if let Some(settlement) = preassigned {
            let authoritative = Hierarchy::of_settlement(settlements.get(settlement));
            if !place.derived.is_consistent_with(&authoritative) {
                reporter.output(
                    "errors",
                    format!(
                        "{}: teryt:simc disagrees with the location given by other tags",
                        place
                    ),
                    Location::new(&place.node, &place.derived, registry),
                );
            }
            place.settlement = Some(settlement);
            place.hierarchy = authoritative;
            place.preassigned = true;
            settlements.set_matched(settlement, Some(id));
            self.stats.preassigned += 1;
            reporter.output(
                "preassigned",
                format!(
                    "{} already has SIMC record {}",
                    place,
                    settlements.get(settlement).id
                ),
                Location::new(&place.node, &place.hierarchy, registry),
            );
        }

        self.by_osm_id.insert(place.node.id.clone(), id);
        if let Some(name) = &place.name {
            self.by_name.entry(name.to_lowercase()).or_default().push(id);
        }
        if let Some(place_type) = &place.place_type {
            self.by_type.entry(place_type.clone()).or_default().push(id);
        }
        self.places.push(place);
        id
    }

    /// Province, county and municipality from explicit tags, else from `is_in`
    ///
    /// Explicit tags accept bare names; `is_in` fragments must carry the unit
    /// prefix, and the first fragment that resolves wins. A more specific
    /// unit overrides a contradicting coarser one and fills it when missing.
    fn derive_hierarchy(
        &mut self,
        place: &MapPlace,
        is_in_parts: &[String],
        registry: &AdminRegistry,
        reporter: &mut Reporter,
    ) -> Hierarchy {
        let node = &place.node;
        let mut hierarchy = Hierarchy::default();

        let province = match node.tag("is_in:province") {
            Some(value) => noted(
                registry.province_by_name(value, true),
                place,
                Location::new(node, &hierarchy, registry),
                reporter,
            ),
            None => is_in_parts.iter().find_map(|part| {
                noted(
                    registry.province_by_name(part, false),
                    place,
                    Location::new(node, &hierarchy, registry),
                    reporter,
                )
            }),
        };
        hierarchy.province = province;
        if let Some(province) = hierarchy.province {
            self.stats.provinces_matched += 1;
            reporter.output(
                "province_set",
                format!(
                    "{} ({}) is in {}",
                    place,
                    node.id,
                    registry.province(province).full_name()
                ),
                Location::new(node, &hierarchy, registry),
            );
        }

        let county = match node.tag("is_in:county") {
            Some(value) => noted(
                registry.county_by_name(value, true, hierarchy.province),
                place,
                Location::new(node, &hierarchy, registry),
                reporter,
            ),
            None => is_in_parts.iter().find_map(|part| {
                noted(
                    registry.county_by_name(part, false, hierarchy.province),
                    place,
                    Location::new(node, &hierarchy, registry),
                    reporter,
                )
            }),
        };
        if let Some(county) = county {
            self.stats.counties_matched += 1;
            let owner = registry.county(county).province;
            if hierarchy.province.is_some_and(|province| province != owner) {
                reporter.output(
                    "errors",
                    format!("{}: county does not match province", place),
                    Location::new(node, &hierarchy, registry),
                );
            }
            hierarchy.county = Some(county);
            hierarchy.province = Some(owner);
            reporter.output(
                "county_set",
                format!("{} is in {}", place, registry.county(county).full_name()),
                Location::new(node, &hierarchy, registry),
            );
        }

        let municipality = match node.tag("is_in:municipality") {
            Some(value) => noted(
                registry.municipality_by_name(value, true, hierarchy.county),
                place,
                Location::new(node, &hierarchy, registry),
                reporter,
            ),
            None => is_in_parts.iter().find_map(|part| {
                noted(
                    registry.municipality_by_name(part, false, hierarchy.county),
                    place,
                    Location::new(node, &hierarchy, registry),
                    reporter,
                )
            }),
        };
        if let Some(municipality) = municipality {
            self.stats.municipalities_matched += 1;
            let full = Hierarchy::of_municipality(registry, municipality);
            if !hierarchy.is_consistent_with(&full) {
                reporter.output(
                    "errors",
                    format!("{}: municipality does not match county or province", place),
                    Location::new(node, &hierarchy, registry),
                );
            }
            hierarchy = full;
        }

        hierarchy
    }

    /// Read `teryt:simc` and find the settlement it names
    ///
    /// A code already claimed by another record is reported and not linked.
    fn resolve_simc_tag(
        &mut self,
        id: PlaceId,
        place: &mut MapPlace,
        settlements: &SettlementCatalog,
        reporter: &mut Reporter,
    ) -> Option<SettlementId> {
        let raw = place.node.tag("teryt:simc")?.trim().to_string();
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
            reporter.output(
                "errors",
                format!("{}: invalid teryt:simc value {:?}", place, raw),
                Location::none(),
            );
            return None;
        }
        place.simc_id = Some(raw.clone());

        if let Some(&other) = self.by_simc_id.get(&raw) {
            reporter.output(
                "errors",
                format!(
                    "Duplicate SIMC code in map data: {} (#{} and #{})",
                    raw,
                    place.node.id,
                    self.places[other.0].node.id
                ),
                Location::none(),
            );
            return None;
        }
        self.by_simc_id.insert(raw.clone(), id);

        match settlements.by_identifier(&raw) {
            Ok(settlement) => Some(settlement),
            Err(err) => {
                reporter.output(
                    "errors",
                    format!("{}: teryt:simc value not in SIMC ({})", place, err),
                    Location::none(),
                );
                None
            }
        }
    }

    /// Read `teryt:terc`: checked against the SIMC link, or used to fill
    /// the derived hierarchy when there is none
    fn apply_terc_tag(
        &mut self,
        place: &mut MapPlace,
        preassigned: Option<SettlementId>,
        registry: &AdminRegistry,
        settlements: &SettlementCatalog,
        reporter: &mut Reporter,
    ) {
        let Some(raw) = place.node.tag("teryt:terc").map(str::to_string) else {
            return;
        };
        let code = match normalize_terc_code(&raw, UnitKind::Municipality) {
            Ok(code) => code,
            Err(err) => {
                reporter.output(
                    "errors",
                    format!("{}: invalid teryt:terc ({})", place, err),
                    Location::none(),
                );
                return;
            }
        };
        place.terc_id = Some(code.clone());

        if let Some(settlement) = preassigned {
            let municipality = registry.municipality(settlements.get(settlement).municipality);
            if municipality.code != code {
                reporter.output(
                    "errors",
                    format!("{}: teryt:terc does not match teryt:simc", place),
                    Location::none(),
                );
            }
            return;
        }

        let Ok(municipality) = registry.municipality_by_code(&code) else {
            return;
        };
        let from_code = Hierarchy::of_municipality(registry, municipality);
        if !place.derived.is_consistent_with(&from_code) {
            reporter.output(
                "errors",
                format!(
                    "{}: teryt:terc disagrees with the location given by other tags",
                    place
                ),
                Location::new(&place.node, &place.derived, registry),
            );
        }
        if place.derived.municipality.is_none() {
            place.derived = from_code;
            place.hierarchy = from_code;
        }
    }

    // ========================================================================
    // MUTUAL LINK
    // ========================================================================

    /// Link a record and a settlement in both directions
    ///
    /// The record takes over the settlement's hierarchy. A settlement that
    /// already belongs to another record is never taken over.
    pub fn assign(
        &mut self,
        place: PlaceId,
        settlement: SettlementId,
        settlements: &mut SettlementCatalog,
    ) -> Result<(), AssignError> {
        let target = settlements.get(settlement);
        match target.matched_place() {
            Some(owner) if owner == place => return Ok(()),
            Some(owner) => {
                return Err(AssignError::AlreadyMatched {
                    settlement: target.id.clone(),
                    place: self.places[owner.0].node.id.clone(),
                })
            }
            None => {}
        }
        if let Some(current) = self.places[place.0].settlement {
            return Err(AssignError::PlaceAlreadyLinked {
                place: self.places[place.0].node.id.clone(),
                settlement: settlements.get(current).id.clone(),
            });
        }

        let record = &mut self.places[place.0];
        record.settlement = Some(settlement);
        record.hierarchy = Hierarchy::of_settlement(target);
        record.simc_id = Some(target.id.clone());
        settlements.set_matched(settlement, Some(place));
        Ok(())
    }

    /// Break a record's link; its hierarchy falls back to the derived one
    pub fn unassign(&mut self, place: PlaceId, settlements: &mut SettlementCatalog) {
        let record = &mut self.places[place.0];
        if let Some(settlement) = record.settlement.take() {
            if settlements.get(settlement).matched_place() == Some(place) {
                settlements.set_matched(settlement, None);
            }
            record.hierarchy = record.derived;
            record.preassigned = false;
            record.simc_id = record
                .node
                .tag("teryt:simc")
                .map(|simc| simc.trim().to_string());
        }
    }

    // ========================================================================
    // ACCESS
    // ========================================================================

    pub fn get(&self, id: PlaceId) -> &MapPlace {
        &self.places[id.0]
    }

    /// Mutable access for tag updates; the link itself stays private
    pub fn get_mut(&mut self, id: PlaceId) -> &mut MapPlace {
        &mut self.places[id.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = PlaceId> {
        (0..self.places.len()).map(PlaceId)
    }

    pub fn by_osm_id(&self, osm_id: &str) -> Option<PlaceId> {
        self.by_osm_id.get(osm_id).copied()
    }

    pub fn by_simc_id(&self, simc_id: &str) -> Option<PlaceId> {
        self.by_simc_id.get(simc_id).copied()
    }

    /// All records with this name (case-insensitive)
    pub fn by_name(&self, name: &str) -> &[PlaceId] {
        self.by_name
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn by_type(&self, place_type: &str) -> &[PlaceId] {
        self.by_type
            .get(place_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn stats(&self) -> LoadStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{place_node, sample_world};

    #[test]
    fn test_explicit_tags_set_hierarchy() {
        let mut world = sample_world();
        let node = place_node("1", "Bibice", "village", 50.1, 19.9)
            .with_tag("is_in:province", "małopolskie")
            .with_tag("is_in:county", "krakowski");

        let id = world.insert(node);
        let place = world.places.get(id);
        let registry = &world.registry;

        let hierarchy = place.hierarchy();
        assert_eq!(registry.province(hierarchy.province.unwrap()).name, "małopolskie");
        assert_eq!(registry.county(hierarchy.county.unwrap()).name, "krakowski");
        assert_eq!(hierarchy.municipality, None);
        assert_eq!(world.places.stats().provinces_matched, 1);
        assert_eq!(world.places.stats().counties_matched, 1);
    }

    #[test]
    fn test_is_in_requires_prefixes() {
        let mut world = sample_world();
        let node = place_node("1", "Bibice", "hamlet", 50.1, 19.9)
            .with_tag("is_in", "Zielonki ,powiat krakowski, Poland");

        let id = world.insert(node);
        let place = world.places.get(id);

        assert_eq!(place.is_in.as_deref(), Some("Zielonki, powiat krakowski, Poland"));
        assert_eq!(place.normalized_type.as_deref(), Some("village"));
        // "Zielonki" has no "gmina" prefix, so only the county resolves
        assert_eq!(place.hierarchy().municipality, None);
        let county = place.hierarchy().county.unwrap();
        assert_eq!(world.registry.county(county).name, "krakowski");
        // and the county back-fills its province
        assert_eq!(
            place.hierarchy().province,
            Some(world.registry.county(county).province)
        );
    }

    #[test]
    fn test_county_overrides_contradicting_province() {
        let mut world = sample_world();
        let node = place_node("1", "Bibice", "village", 50.1, 19.9)
            .with_tag("is_in:province", "śląskie")
            .with_tag("is_in:county", "krakowski");

        let id = world.insert(node);
        let hierarchy = *world.places.get(id).hierarchy();

        assert_eq!(world.reporter.count("errors"), 1);
        let county = world.registry.county(hierarchy.county.unwrap());
        assert_eq!(hierarchy.province, Some(county.province));
    }

    #[test]
    fn test_county_tag_uses_province_to_disambiguate() {
        let mut world = sample_world();
        let node = place_node("1", "Mazańcowice", "village", 49.8, 19.0)
            .with_tag("is_in", "powiat bielski, województwo śląskie");

        let id = world.insert(node);
        let county = world.places.get(id).hierarchy().county.unwrap();

        assert_eq!(world.registry.county(county).code, "2402");
    }

    #[test]
    fn test_ambiguous_county_tag_is_reported() {
        let mut world = sample_world();
        let id = world.insert(
            place_node("1", "Mazańcowice", "village", 49.8, 19.0).with_tag("is_in:county", "bielski"),
        );

        assert_eq!(world.places.get(id).hierarchy().county, None);
        assert_eq!(world.reporter.count("errors"), 1);
        assert!(world.reporter.messages("errors")[0].contains("ambiguous county name \"bielski\""));

        // plain misses and prefix-less fragments stay silent
        world.insert(
            place_node("2", "Bibice", "village", 50.1, 19.9)
                .with_tag("is_in", "Zielonki, powiat nieznany, Poland"),
        );
        assert_eq!(world.reporter.count("errors"), 1);
    }

    #[test]
    fn test_preassigned_record_links_both_ways() {
        let mut world = sample_world();
        let bibice = world.settlement("0316031");
        let node = place_node("1", "Bibice", "village", 50.1, 19.9)
            .with_tag("teryt:simc", "0316031")
            .with_tag("is_in:province", "śląskie");

        let id = world.insert(node);
        let place = world.places.get(id);

        assert!(place.is_preassigned());
        assert_eq!(place.settlement(), Some(bibice));
        assert_eq!(world.settlements.get(bibice).matched_place(), Some(id));
        // The settlement's hierarchy wins over the tag, which is reported
        assert_eq!(
            *place.hierarchy(),
            Hierarchy::of_settlement(world.settlements.get(bibice))
        );
        assert_eq!(world.reporter.count("errors"), 1);
        assert_eq!(world.places.by_simc_id("0316031"), Some(id));
    }

    #[test]
    fn test_duplicate_simc_code_is_not_linked() {
        let mut world = sample_world();
        let first = world.insert(
            place_node("1", "Bibice", "village", 50.1, 19.9).with_tag("teryt:simc", "0316031"),
        );
        let second = world.insert(
            place_node("2", "Bibice", "village", 50.1, 19.9).with_tag("teryt:simc", "0316031"),
        );

        assert!(world.places.get(first).is_preassigned());
        assert!(!world.places.get(second).is_matched());
        assert_eq!(world.reporter.count("errors"), 1);
    }

    #[test]
    fn test_terc_tag_fills_hierarchy() {
        let mut world = sample_world();
        let id = world.insert(
            place_node("1", "Bibice", "village", 50.1, 19.9).with_tag("teryt:terc", "12-06-15-2"),
        );
        let place = world.places.get(id);

        assert_eq!(place.terc_id.as_deref(), Some("1206152"));
        let municipality = place.hierarchy().municipality.unwrap();
        assert_eq!(world.registry.municipality(municipality).name, "Zielonki");

        let bad = world.insert(
            place_node("2", "Bibice", "village", 50.1, 19.9).with_tag("teryt:terc", "12x"),
        );
        assert_eq!(world.places.get(bad).terc_id, None);
        assert_eq!(world.reporter.count("errors"), 1);
    }

    #[test]
    fn test_assign_rejects_second_claim() {
        let mut world = sample_world();
        let bibice = world.settlement("0316031");
        let first = world.insert(place_node("1", "Bibice", "village", 50.1, 19.9));
        let second = world.insert(place_node("2", "Bibice", "village", 50.1, 19.9));

        world
            .places
            .assign(first, bibice, &mut world.settlements)
            .unwrap();
        let err = world
            .places
            .assign(second, bibice, &mut world.settlements)
            .unwrap_err();

        assert!(matches!(err, AssignError::AlreadyMatched { .. }));
        assert_eq!(world.settlements.get(bibice).matched_place(), Some(first));
        assert_eq!(world.places.get(second).settlement(), None);
        assert!(!world.places.get(first).is_preassigned());
    }

    #[test]
    fn test_unassign_restores_derived_hierarchy() {
        let mut world = sample_world();
        let bibice = world.settlement("0316031");
        let id = world.insert(place_node("1", "Bibice", "village", 50.1, 19.9));

        world.places.assign(id, bibice, &mut world.settlements).unwrap();
        assert!(world.places.get(id).hierarchy().municipality.is_some());

        world.places.unassign(id, &mut world.settlements);
        assert_eq!(world.places.get(id).settlement(), None);
        assert_eq!(world.settlements.get(bibice).matched_place(), None);
        assert!(world.places.get(id).hierarchy().is_empty());
        assert_eq!(world.places.get(id).simc_id, None);
    }

    #[test]
    fn test_hierarchy_consistency() {
        let world = sample_world();
        let bibice = Hierarchy::of_settlement(world.settlements.get(world.settlement("0316031")));
        let province_only = Hierarchy {
            province: bibice.province,
            ..Hierarchy::default()
        };
        let elsewhere = Hierarchy::of_settlement(world.settlements.get(world.settlement("0920334")));

        assert!(Hierarchy::default().is_consistent_with(&bibice));
        assert!(province_only.is_consistent_with(&bibice));
        assert!(!elsewhere.is_consistent_with(&bibice));
    }

    #[test]
    fn test_name_index_is_case_insensitive() {
        let mut world = sample_world();
        let id = world.insert(place_node("1", "Nowa Wieś", "village", 50.1, 19.9));

        assert_eq!(world.places.by_name("NOWA WIEŚ"), &[id]);
        assert_eq!(world.places.by_type("village"), &[id]);
        assert_eq!(world.places.by_osm_id("1"), Some(id));
        assert!(world.places.by_name("Bibice").is_empty());
    }
}
