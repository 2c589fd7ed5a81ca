// 🏘️ Settlement Catalog - SIMC records linked into the TERC hierarchy
//
// Loading is two-phase: every row becomes a Settlement first, then parent
// identifiers are resolved, since a parent may appear after its children.

use crate::entities::admin::{AdminRegistry, CountyId, MunicipalityId, ProvinceId};
use crate::entities::place::PlaceId;
use crate::error::{LookupError, UnitKind};
use crate::parser::{parse_as_of, KindRow, SimcRow};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// WMRODZ kind name → map place type
pub const KIND_TO_PLACE_TYPE: &[(&str, &str)] = &[
    ("wieś", "village"),
    ("miasto", "city"),
    ("dzielnica m.st. Warszawy", "suburb"),
    ("część miasta", "suburb"),
];

/// Map place types folded onto the registry vocabulary
pub const PLACE_TYPE_ALIASES: &[(&str, &str)] = &[("hamlet", "village"), ("town", "city")];

pub fn normalize_place_type(raw: &str) -> String {
    PLACE_TYPE_ALIASES
        .iter()
        .find(|(alias, _)| *alias == raw)
        .map(|(_, normalized)| normalized.to_string())
        .unwrap_or_else(|| raw.to_string())
}

// ============================================================================
// KIND TABLE
// ============================================================================

/// Settlement kinds (WMRODZ) and the place type each maps to
#[derive(Debug, Clone, Default)]
pub struct KindTable {
    names: BTreeMap<String, String>,
    place_types: BTreeMap<String, String>,
}

impl KindTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: &[KindRow]) -> Self {
        let mut table = KindTable::new();
        for row in rows {
            table.insert(&row.kind, &row.name);
        }
        table
    }

    pub fn insert(&mut self, kind: &str, name: &str) {
        let name = name.trim();
        if kind.is_empty() || name.is_empty() {
            return;
        }
        self.names.insert(kind.to_string(), name.to_string());
        if let Some((_, place_type)) = KIND_TO_PLACE_TYPE.iter().find(|(n, _)| *n == name) {
            self.place_types
                .insert(kind.to_string(), place_type.to_string());
        }
    }

    pub fn name(&self, kind: &str) -> Option<&str> {
        self.names.get(kind).map(String::as_str)
    }

    pub fn place_type(&self, kind: &str) -> Option<&str> {
        self.place_types.get(kind).map(String::as_str)
    }

    /// (code, name, mapped place type) ordered by code
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, Option<&str>)> {
        self.names
            .iter()
            .map(|(kind, name)| (kind.as_str(), name.as_str(), self.place_type(kind)))
    }
}

// ============================================================================
// SETTLEMENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SettlementId(usize);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    /// SIMC identifier (SYM)
    pub id: String,
    pub name: String,
    /// WMRODZ kind code (RM)
    pub kind: String,
    /// Place type derived from the kind
    pub place_type: String,
    pub as_of: NaiveDate,
    pub municipality: MunicipalityId,
    pub county: CountyId,
    pub province: ProvinceId,
    pub parent_id: Option<String>,

    parent: Option<SettlementId>,
    matched: Option<PlaceId>,
}

impl Settlement {
    pub fn parent(&self) -> Option<SettlementId> {
        self.parent
    }

    /// The map record this settlement is linked to, if any
    pub fn matched_place(&self) -> Option<PlaceId> {
        self.matched
    }

    /// "Bibice, Zielonki, powiat krakowski, województwo małopolskie"
    pub fn describe(&self, registry: &AdminRegistry) -> String {
        format!(
            "{}, {}, {}, {}",
            self.name,
            registry.municipality(self.municipality).name,
            registry.county(self.county).full_name(),
            registry.province(self.province).full_name()
        )
    }
}

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Default)]
pub struct SettlementCatalog {
    settlements: Vec<Settlement>,
    by_id: HashMap<String, SettlementId>,
    by_name: HashMap<String, Vec<SettlementId>>,
    by_type: HashMap<String, Vec<SettlementId>>,
}

impl SettlementCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the catalog from SIMC rows and link parents
    pub fn from_rows(
        rows: &[SimcRow],
        registry: &AdminRegistry,
        kinds: &KindTable,
    ) -> Result<Self> {
        let mut catalog = SettlementCatalog::new();
        let mut dropped = 0;

        for row in rows {
            if catalog.insert(row, registry, kinds)?.is_none() {
                dropped += 1;
            }
        }
        catalog.link_parents();

        tracing::info!(
            settlements = catalog.len(),
            dropped,
            "settlement catalog loaded"
        );

        Ok(catalog)
    }

    /// Phase one: add a single row
    ///
    /// Rows whose kind has no place type, or whose municipality is not in
    /// the registry, are dropped (Ok(None)). Only an unreadable date is an
    /// error.
    pub fn insert(
        &mut self,
        row: &SimcRow,
        registry: &AdminRegistry,
        kinds: &KindTable,
    ) -> Result<Option<SettlementId>> {
        let Some(place_type) = kinds.place_type(&row.kind) else {
            tracing::debug!(id = %row.id, kind = %row.kind, "kind without place type, dropped");
            return Ok(None);
        };

        let municipality = match registry.municipality_by_code(&row.terc_code()) {
            Ok(municipality) => municipality,
            Err(err) => {
                tracing::warn!(id = %row.id, name = %row.name, "settlement dropped: {}", err);
                return Ok(None);
            }
        };
        let unit = registry.municipality(municipality);

        let as_of = parse_as_of(&row.as_of)
            .with_context(|| format!("SIMC row {} ({})", row.id, row.name))?;

        // A settlement naming itself as parent has no parent
        let parent_id = Some(row.parent_id.trim())
            .filter(|p| !p.is_empty() && *p != row.id)
            .map(str::to_string);

        let id = SettlementId(self.settlements.len());
        self.by_id.insert(row.id.clone(), id);
        self.by_name
            .entry(row.name.to_lowercase())
            .or_default()
            .push(id);
        self.by_type
            .entry(place_type.to_string())
            .or_default()
            .push(id);
        self.settlements.push(Settlement {
            id: row.id.clone(),
            name: row.name.clone(),
            kind: row.kind.clone(),
            place_type: place_type.to_string(),
            as_of,
            municipality,
            county: unit.county,
            province: unit.province,
            parent_id,
            parent: None,
            matched: None,
        });

        Ok(Some(id))
    }

    /// Phase two: resolve parent identifiers into references
    pub fn link_parents(&mut self) {
        let mut unresolved = 0;
        for index in 0..self.settlements.len() {
            let parent = match &self.settlements[index].parent_id {
                Some(parent_id) => self.by_id.get(parent_id).copied(),
                None => continue,
            };
            if parent.is_none() {
                unresolved += 1;
            }
            self.settlements[index].parent = parent;
        }
        if unresolved > 0 {
            tracing::warn!(unresolved, "settlements with unknown parent");
        }
    }

    // ========================================================================
    // LOOKUPS
    // ========================================================================

    pub fn get(&self, id: SettlementId) -> &Settlement {
        &self.settlements[id.0]
    }

    pub fn by_identifier(&self, id: &str) -> Result<SettlementId, LookupError> {
        self.by_id
            .get(id)
            .copied()
            .ok_or_else(|| LookupError::not_found(UnitKind::Settlement, id))
    }

    /// All settlements with this name (case-insensitive)
    pub fn by_name(&self, name: &str) -> Result<&[SettlementId], LookupError> {
        self.by_name
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .ok_or_else(|| LookupError::not_found(UnitKind::Settlement, name))
    }

    pub fn by_type(&self, place_type: &str) -> &[SettlementId] {
        self.by_type
            .get(place_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Parent chain, nearest first
    pub fn ancestors(&self, id: SettlementId) -> Vec<SettlementId> {
        let mut chain = Vec::new();
        let mut current = self.get(id).parent;
        while let Some(parent) = current {
            // SIMC data should be a forest; stop on a cycle anyway
            if parent == id || chain.contains(&parent) {
                break;
            }
            chain.push(parent);
            current = self.get(parent).parent;
        }
        chain
    }

    pub fn ids(&self) -> impl Iterator<Item = SettlementId> {
        (0..self.settlements.len()).map(SettlementId)
    }

    pub fn len(&self) -> usize {
        self.settlements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settlements.is_empty()
    }

    /// Reverse half of the mutual link; only PlaceCatalog calls this
    pub(crate) fn set_matched(&mut self, id: SettlementId, place: Option<PlaceId>) {
        self.settlements[id.0].matched = place;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_kinds, sample_registry, simc_row};

    #[test]
    fn test_kind_table() {
        let kinds = sample_kinds();
        assert_eq!(kinds.place_type("01"), Some("village"));
        assert_eq!(kinds.place_type("96"), Some("city"));
        assert_eq!(kinds.place_type("95"), Some("suburb"));
        assert_eq!(kinds.place_type("03"), None);
        assert_eq!(kinds.name("03"), Some("osada"));

        let entries: Vec<_> = kinds.entries().collect();
        assert_eq!(entries[0], ("00", "część miasta", Some("suburb")));
    }

    #[test]
    fn test_normalize_place_type() {
        assert_eq!(normalize_place_type("hamlet"), "village");
        assert_eq!(normalize_place_type("town"), "city");
        assert_eq!(normalize_place_type("village"), "village");
        assert_eq!(normalize_place_type("isolated_dwelling"), "isolated_dwelling");
    }

    #[test]
    fn test_unknown_kind_is_dropped() {
        let registry = sample_registry();
        let kinds = sample_kinds();
        let rows = vec![
            simc_row("0316031", "Bibice", "1206152", "01", ""),
            simc_row("0316048", "Osada Leśna", "1206152", "03", ""),
        ];

        let catalog = SettlementCatalog::from_rows(&rows, &registry, &kinds).unwrap();

        assert_eq!(catalog.len(), 1);
        assert!(catalog.by_identifier("0316048").is_err());
        assert!(catalog.by_name("Osada Leśna").is_err());
    }

    #[test]
    fn test_parent_linking() {
        let registry = sample_registry();
        let kinds = sample_kinds();
        // The child comes before its parent and the parent names itself
        let rows = vec![
            simc_row("0316054", "Bibice Dolne", "1206152", "01", "0316031"),
            simc_row("0316031", "Bibice", "1206152", "01", "0316031"),
            simc_row("0316060", "Zagubiona", "1206152", "01", "9999999"),
        ];

        let catalog = SettlementCatalog::from_rows(&rows, &registry, &kinds).unwrap();
        let child = catalog.by_identifier("0316054").unwrap();
        let parent = catalog.by_identifier("0316031").unwrap();
        let orphan = catalog.by_identifier("0316060").unwrap();

        assert_eq!(catalog.get(child).parent(), Some(parent));
        assert_eq!(catalog.get(parent).parent(), None);
        assert_eq!(catalog.get(parent).parent_id, None);
        assert_eq!(catalog.get(orphan).parent(), None);
        assert_eq!(catalog.ancestors(child), vec![parent]);
    }

    #[test]
    fn test_lookups() {
        let registry = sample_registry();
        let kinds = sample_kinds();
        let rows = vec![
            simc_row("0316031", "Nowa Wieś", "1206152", "01", ""),
            simc_row("0920334", "Nowa Wieś", "2402042", "01", ""),
            simc_row("0950463", "Kraków", "1261011", "96", ""),
        ];

        let catalog = SettlementCatalog::from_rows(&rows, &registry, &kinds).unwrap();

        assert_eq!(catalog.by_name("NOWA WIEŚ").unwrap().len(), 2);
        assert_eq!(catalog.by_type("village").len(), 2);
        assert_eq!(catalog.by_type("city").len(), 1);
        assert!(catalog.by_type("suburb").is_empty());

        let krakow = catalog.get(catalog.by_identifier("0950463").unwrap());
        assert_eq!(krakow.place_type, "city");
        assert_eq!(registry.county(krakow.county).name, "Kraków");
        assert_eq!(krakow.matched_place(), None);
        assert_eq!(
            krakow.describe(&registry),
            "Kraków, Kraków, powiat m. Kraków, województwo małopolskie"
        );
    }
}
