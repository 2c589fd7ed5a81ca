// 🏛️ Administrative Registry - Province → County → Municipality (TERC)
//
// The registry owns every unit and hands out copyable ids. An id is the
// unit's identity: two municipalities with equal names are still two ids.
// Parents are resolved while loading, so units never change afterwards.

use crate::error::{LookupError, UnitKind};
use crate::parser::{parse_as_of, TercLevel, TercRow};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// TERC code of the capital city county
pub const CAPITAL_COUNTY_CODE: &str = "1465";

const PROVINCE_PREFIXES: &[&str] = &["województwo ", "wojewodztwo ", "woj. "];
const COUNTY_PREFIXES: &[&str] = &[
    "powiat miejski ",
    "powiat m. ",
    "powiat ",
    "pow. ",
    "p. ",
];
const MUNICIPALITY_PREFIXES: &[&str] = &[
    "gmina miejsko-wiejska ",
    "gmina miejska ",
    "gmina wiejska ",
    "gmina ",
    "gm. ",
];

// ============================================================================
// IDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProvinceId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CountyId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MunicipalityId(usize);

/// Any unit, as returned by a code lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminUnit {
    Province(ProvinceId),
    County(CountyId),
    Municipality(MunicipalityId),
}

// ============================================================================
// UNITS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Province {
    /// Lower-cased name without the "województwo" prefix
    pub name: String,
    /// Two digits
    pub code: String,
    pub as_of: NaiveDate,
}

impl Province {
    pub fn full_name(&self) -> String {
        format!("województwo {}", self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct County {
    /// Name as registered; a capitalized name marks a city county
    pub name: String,
    /// Province code + two digits
    pub code: String,
    pub as_of: NaiveDate,
    pub province: ProvinceId,
}

impl County {
    pub fn is_city(&self) -> bool {
        self.name.chars().next().is_some_and(char::is_uppercase)
    }

    pub fn is_capital(&self) -> bool {
        self.code == CAPITAL_COUNTY_CODE
    }

    pub fn full_name(&self) -> String {
        if self.is_city() {
            format!("powiat m. {}", self.name)
        } else {
            format!("powiat {}", self.name)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Municipality {
    pub name: String,
    /// Province + county + municipality + type digit (7 digits)
    pub code: String,
    pub as_of: NaiveDate,
    pub county: CountyId,
    pub province: ProvinceId,
}

impl Municipality {
    /// The RODZ digit (1 urban, 2 rural, 3 urban-rural, ...)
    pub fn kind(&self) -> &str {
        &self.code[6..]
    }

    pub fn full_name(&self) -> String {
        format!("gmina {}", self.name)
    }
}

// ============================================================================
// CODE NORMALIZATION
// ============================================================================

/// Normalize a TERC code of the given level
///
/// Separators are dropped. Municipality codes may also come in the
/// ten-digit TERC10 form, counties in its seven-digit prefix.
pub fn normalize_terc_code(value: &str, kind: UnitKind) -> Result<String, LookupError> {
    let digits: String = value.chars().filter(char::is_ascii_digit).collect();
    let bad_code = || LookupError::BadCode {
        kind,
        code: value.to_string(),
    };

    match (kind, digits.len()) {
        (UnitKind::Province, 2) => Ok(digits),
        (UnitKind::County, 4) | (UnitKind::Municipality, 7) => Ok(digits),
        (UnitKind::County, 7) | (UnitKind::Municipality, 10) => {
            Ok(format!("{}{}", &digits[1..3], &digits[5..]))
        }
        _ => Err(bad_code()),
    }
}

/// Lower-case a name and strip one of the unit prefixes
///
/// Returns None when no prefix is present and the lookup is not permissive.
fn strip_prefix(name: &str, prefixes: &[&str], permissive: bool) -> Option<String> {
    let lowered = name.trim().to_lowercase();
    for prefix in prefixes {
        if let Some(rest) = lowered.strip_prefix(prefix) {
            return Some(rest.trim().to_string());
        }
    }
    if permissive {
        Some(lowered)
    } else {
        None
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// All administrative units of one TERC snapshot
#[derive(Debug, Default)]
pub struct AdminRegistry {
    provinces: Vec<Province>,
    counties: Vec<County>,
    municipalities: Vec<Municipality>,

    province_by_code: HashMap<String, ProvinceId>,
    province_by_name: HashMap<String, ProvinceId>,
    county_by_code: HashMap<String, CountyId>,
    county_by_name: HashMap<String, Vec<CountyId>>,
    municipality_by_code: HashMap<String, MunicipalityId>,
    municipality_by_name: HashMap<String, Vec<MunicipalityId>>,
}

impl AdminRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from TERC rows
    ///
    /// Rows may come in any order: provinces are created first, then
    /// counties, then municipalities, so every parent exists when a child
    /// resolves it. Units whose parent is missing are skipped with a warning.
    pub fn from_rows(rows: &[TercRow]) -> Result<Self> {
        let mut registry = AdminRegistry::new();

        let mut ordered: Vec<&TercRow> = rows.iter().collect();
        ordered.sort_by_key(|row| row.level());

        for row in ordered {
            let as_of = parse_as_of(&row.as_of)
                .with_context(|| format!("TERC row {} ({})", row.code(), row.name))?;

            let added = match row.level() {
                TercLevel::Province => {
                    registry.add_province(&row.name, &row.code(), as_of);
                    Ok(())
                }
                TercLevel::County => registry
                    .add_county(&row.name, &row.code(), as_of)
                    .map(|_| ()),
                TercLevel::Municipality => registry
                    .add_municipality(&row.name, &row.code(), as_of)
                    .map(|_| ()),
            };

            if let Err(err) = added {
                tracing::warn!(code = %row.code(), name = %row.name, "skipping TERC row: {}", err);
            }
        }

        tracing::info!(
            provinces = registry.provinces.len(),
            counties = registry.counties.len(),
            municipalities = registry.municipalities.len(),
            "administrative registry loaded"
        );

        Ok(registry)
    }

    pub fn add_province(&mut self, name: &str, code: &str, as_of: NaiveDate) -> ProvinceId {
        let name = strip_prefix(name, PROVINCE_PREFIXES, true).unwrap_or_default();
        let id = ProvinceId(self.provinces.len());
        self.province_by_code.insert(code.to_string(), id);
        self.province_by_name.insert(name.clone(), id);
        self.provinces.push(Province {
            name,
            code: code.to_string(),
            as_of,
        });
        id
    }

    pub fn add_county(
        &mut self,
        name: &str,
        code: &str,
        as_of: NaiveDate,
    ) -> Result<CountyId, LookupError> {
        let code = normalize_terc_code(code, UnitKind::County)?;
        let province = self.province_by_code(&code[..2])?;

        // Keep the case: it tells city counties apart
        let trimmed = name.trim();
        let lowered = trimmed.to_lowercase();
        let name = COUNTY_PREFIXES
            .iter()
            .find(|prefix| lowered.starts_with(*prefix))
            .map(|prefix| trimmed[prefix.len()..].trim().to_string())
            .unwrap_or_else(|| trimmed.to_string());

        let id = CountyId(self.counties.len());
        self.county_by_code.insert(code.clone(), id);
        self.county_by_name
            .entry(name.to_lowercase())
            .or_default()
            .push(id);
        self.counties.push(County {
            name,
            code,
            as_of,
            province,
        });
        Ok(id)
    }

    pub fn add_municipality(
        &mut self,
        name: &str,
        code: &str,
        as_of: NaiveDate,
    ) -> Result<MunicipalityId, LookupError> {
        let code = normalize_terc_code(code, UnitKind::Municipality)?;
        let county = self.county_by_code(&code[..4])?;
        let province = self.counties[county.0].province;

        let id = MunicipalityId(self.municipalities.len());
        self.municipality_by_code.insert(code.clone(), id);
        self.municipality_by_name
            .entry(name.trim().to_lowercase())
            .or_default()
            .push(id);
        self.municipalities.push(Municipality {
            name: name.trim().to_string(),
            code,
            as_of,
            county,
            province,
        });
        Ok(id)
    }

    // ========================================================================
    // ACCESS
    // ========================================================================

    pub fn province(&self, id: ProvinceId) -> &Province {
        &self.provinces[id.0]
    }

    pub fn county(&self, id: CountyId) -> &County {
        &self.counties[id.0]
    }

    pub fn municipality(&self, id: MunicipalityId) -> &Municipality {
        &self.municipalities[id.0]
    }

    /// Provinces ordered by code
    pub fn provinces(&self) -> Vec<&Province> {
        let mut all: Vec<&Province> = self.provinces.iter().collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        all
    }

    pub fn province_count(&self) -> usize {
        self.provinces.len()
    }

    pub fn county_count(&self) -> usize {
        self.counties.len()
    }

    pub fn municipality_count(&self) -> usize {
        self.municipalities.len()
    }

    // ========================================================================
    // LOOKUP BY CODE
    // ========================================================================

    /// Look a unit up by its TERC code; the code length picks the level
    pub fn lookup_by_code(&self, code: &str) -> Result<AdminUnit, LookupError> {
        match code.len() {
            2 => self.province_by_code(code).map(AdminUnit::Province),
            4 => self.county_by_code(code).map(AdminUnit::County),
            7 => self.municipality_by_code(code).map(AdminUnit::Municipality),
            _ => Err(LookupError::BadCode {
                kind: UnitKind::Municipality,
                code: code.to_string(),
            }),
        }
    }

    pub fn province_by_code(&self, code: &str) -> Result<ProvinceId, LookupError> {
        self.province_by_code
            .get(code)
            .copied()
            .ok_or_else(|| LookupError::not_found(UnitKind::Province, code))
    }

    pub fn county_by_code(&self, code: &str) -> Result<CountyId, LookupError> {
        self.county_by_code
            .get(code)
            .copied()
            .ok_or_else(|| LookupError::not_found(UnitKind::County, code))
    }

    pub fn municipality_by_code(&self, code: &str) -> Result<MunicipalityId, LookupError> {
        self.municipality_by_code
            .get(code)
            .copied()
            .ok_or_else(|| LookupError::not_found(UnitKind::Municipality, code))
    }

    // ========================================================================
    // LOOKUP BY NAME
    // ========================================================================

    /// Find a province by name
    ///
    /// Non-permissive lookups require one of the "województwo" prefixes;
    /// permissive ones accept the bare name too.
    pub fn province_by_name(
        &self,
        name: &str,
        permissive: bool,
    ) -> Result<ProvinceId, LookupError> {
        let key = strip_prefix(name, PROVINCE_PREFIXES, permissive).ok_or_else(|| {
            LookupError::MissingPrefix {
                kind: UnitKind::Province,
                name: name.to_string(),
            }
        })?;
        self.province_by_name
            .get(&key)
            .copied()
            .ok_or_else(|| LookupError::not_found(UnitKind::Province, key))
    }

    /// Find a county by name, using the province to pick between namesakes
    pub fn county_by_name(
        &self,
        name: &str,
        permissive: bool,
        province: Option<ProvinceId>,
    ) -> Result<CountyId, LookupError> {
        let key = strip_prefix(name, COUNTY_PREFIXES, permissive).ok_or_else(|| {
            LookupError::MissingPrefix {
                kind: UnitKind::County,
                name: name.to_string(),
            }
        })?;
        let candidates = self
            .county_by_name
            .get(&key)
            .ok_or_else(|| LookupError::not_found(UnitKind::County, key.clone()))?;

        match (candidates.as_slice(), province) {
            ([only], _) => Ok(*only),
            (many, Some(province)) => many
                .iter()
                .copied()
                .find(|id| self.counties[id.0].province == province)
                .ok_or_else(|| LookupError::not_found(UnitKind::County, key)),
            (many, None) => Err(LookupError::Ambiguous {
                kind: UnitKind::County,
                name: key,
                count: many.len(),
            }),
        }
    }

    /// Find a municipality by name, using the county to pick between namesakes
    pub fn municipality_by_name(
        &self,
        name: &str,
        permissive: bool,
        county: Option<CountyId>,
    ) -> Result<MunicipalityId, LookupError> {
        let key = strip_prefix(name, MUNICIPALITY_PREFIXES, permissive).ok_or_else(|| {
            LookupError::MissingPrefix {
                kind: UnitKind::Municipality,
                name: name.to_string(),
            }
        })?;
        let candidates = self
            .municipality_by_name
            .get(&key)
            .ok_or_else(|| LookupError::not_found(UnitKind::Municipality, key.clone()))?;

        if let Some(county) = county {
            return candidates
                .iter()
                .copied()
                .find(|id| self.municipalities[id.0].county == county)
                .ok_or_else(|| LookupError::not_found(UnitKind::Municipality, key));
        }

        // Urban-rural municipalities are listed several times (types 3, 4, 5)
        // under one name; that still names a single place.
        let first = candidates[0];
        let same_place = candidates.iter().all(|id| {
            self.municipalities[id.0].code[..6] == self.municipalities[first.0].code[..6]
        });
        if same_place {
            Ok(first)
        } else {
            Err(LookupError::Ambiguous {
                kind: UnitKind::Municipality,
                name: key,
                count: candidates.len(),
            })
        }
    }

    pub fn try_province_by_name(&self, name: &str, permissive: bool) -> Option<ProvinceId> {
        downgrade(self.province_by_name(name, permissive))
    }

    pub fn try_county_by_name(
        &self,
        name: &str,
        permissive: bool,
        province: Option<ProvinceId>,
    ) -> Option<CountyId> {
        downgrade(self.county_by_name(name, permissive, province))
    }

    pub fn try_municipality_by_name(
        &self,
        name: &str,
        permissive: bool,
        county: Option<CountyId>,
    ) -> Option<MunicipalityId> {
        downgrade(self.municipality_by_name(name, permissive, county))
    }
}

/// Turn a lookup failure into "no usable match"
fn downgrade<T>(result: Result<T, LookupError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            if err.is_noteworthy() {
                tracing::warn!("{}", err);
            }
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
