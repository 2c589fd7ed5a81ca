// 🏗️ Catalog Parsers - TERYT exports (TERC, SIMC, WMRODZ)
//
// GUS publishes the registry catalogs as ';'-separated CSV files with a
// header row. Each catalog gets a row type; the entity catalogs turn rows
// into linked records.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::Path;

/// Date format of the STAN_NA columns
pub const AS_OF_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// TERC - administrative units
// ============================================================================

/// One row of the TERC catalog. The same row shape describes provinces,
/// counties and municipalities; which one is decided by the filled codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TercRow {
    #[serde(rename = "WOJ")]
    pub province: String,

    #[serde(rename = "POW", default)]
    pub county: String,

    #[serde(rename = "GMI", default)]
    pub municipality: String,

    #[serde(rename = "RODZ", default)]
    pub municipality_type: String,

    #[serde(rename = "NAZWA")]
    pub name: String,

    /// Free-text unit description ("miasto na prawach powiatu", ...)
    #[serde(rename = "NAZWA_DOD", default)]
    pub description: String,

    #[serde(rename = "STAN_NA")]
    pub as_of: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TercLevel {
    Province,
    County,
    Municipality,
}

impl TercRow {
    pub fn level(&self) -> TercLevel {
        if !self.municipality_type.is_empty() {
            TercLevel::Municipality
        } else if !self.county.is_empty() {
            TercLevel::County
        } else {
            TercLevel::Province
        }
    }

    /// Composite code of the unit this row describes
    pub fn code(&self) -> String {
        match self.level() {
            TercLevel::Province => self.province.clone(),
            TercLevel::County => format!("{}{}", self.province, self.county),
            TercLevel::Municipality => format!(
                "{}{}{}{}",
                self.province, self.county, self.municipality, self.municipality_type
            ),
        }
    }
}

// ============================================================================
// SIMC - settlements
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimcRow {
    #[serde(rename = "WOJ")]
    pub province: String,

    #[serde(rename = "POW")]
    pub county: String,

    #[serde(rename = "GMI")]
    pub municipality: String,

    #[serde(rename = "RODZ_GMI")]
    pub municipality_type: String,

    /// Settlement kind code (WMRODZ key)
    #[serde(rename = "RM")]
    pub kind: String,

    #[serde(rename = "MZ", default)]
    pub common_name: String,

    #[serde(rename = "NAZWA")]
    pub name: String,

    #[serde(rename = "SYM")]
    pub id: String,

    #[serde(rename = "SYMPOD", default)]
    pub parent_id: String,

    #[serde(rename = "STAN_NA")]
    pub as_of: String,
}

impl SimcRow {
    /// TERC code of the owning municipality
    pub fn terc_code(&self) -> String {
        format!(
            "{}{}{}{}",
            self.province, self.county, self.municipality, self.municipality_type
        )
    }
}

// ============================================================================
// WMRODZ - settlement kinds
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindRow {
    #[serde(rename = "RM")]
    pub kind: String,

    #[serde(rename = "NAZWA_RM")]
    pub name: String,

    #[serde(rename = "STAN_NA", default)]
    pub as_of: String,
}

// ============================================================================
// READERS
// ============================================================================

/// Deserialize every row of a catalog
///
/// `source` only names the catalog in error messages.
pub fn read_rows<T, R>(reader: R, source: &str) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut rdr = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (line_num, result) in rdr.deserialize().enumerate() {
        // +2: 1-indexed plus the header row
        let row: T = result
            .with_context(|| format!("Failed to parse {} line {}", source, line_num + 2))?;
        rows.push(row);
    }

    Ok(rows)
}

/// Load a catalog file, tolerating the UTF-8 BOM GUS exports start with
pub fn load_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to open catalog: {}", path.display()))?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("catalog");

    read_rows(content.as_bytes(), source)
}

pub fn load_terc(path: &Path) -> Result<Vec<TercRow>> {
    load_rows(path)
}

pub fn load_simc(path: &Path) -> Result<Vec<SimcRow>> {
    load_rows(path)
}

pub fn load_kinds(path: &Path) -> Result<Vec<KindRow>> {
    load_rows(path)
}

/// Parse a STAN_NA value
pub fn parse_as_of(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), AS_OF_FORMAT)
        .with_context(|| format!("Invalid STAN_NA date: {:?}", value))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TERC_CSV: &str = "\
WOJ;POW;GMI;RODZ;NAZWA;NAZWA_DOD;STAN_NA
12;;;;MAŁOPOLSKIE;województwo;2023-01-01
12;06;;;krakowski;powiat;2023-01-01
12;06;15;2;Zielonki;gmina wiejska;2023-01-01
12;61;;;Kraków;miasto na prawach powiatu;2023-01-01
";

    const SIMC_CSV: &str = "\
WOJ;POW;GMI;RODZ_GMI;RM;MZ;NAZWA;SYM;SYMPOD;STAN_NA
12;06;15;2;01;1;Bibice;0316031;0316031;2023-01-01
12;06;15;2;03;1;Jaszczury;0316048;0316031;2023-01-01
";

    #[test]
    fn test_read_terc_rows() {
        let rows: Vec<TercRow> = read_rows(TERC_CSV.as_bytes(), "TERC").unwrap();
        assert_eq!(rows.len(), 4);

        assert_eq!(rows[0].level(), TercLevel::Province);
        assert_eq!(rows[0].code(), "12");
        assert_eq!(rows[1].level(), TercLevel::County);
        assert_eq!(rows[1].code(), "1206");
        assert_eq!(rows[2].level(), TercLevel::Municipality);
        assert_eq!(rows[2].code(), "1206152");
        assert_eq!(rows[3].name, "Kraków");
    }

    #[test]
    fn test_read_simc_rows() {
        let rows: Vec<SimcRow> = read_rows(SIMC_CSV.as_bytes(), "SIMC").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].terc_code(), "1206152");
        assert_eq!(rows[1].parent_id, "0316031");
        assert_eq!(rows[1].kind, "03");
    }

    #[test]
    fn test_read_rows_reports_line() {
        let broken = "RM;NAZWA_RM\n01\n";
        let err = read_rows::<KindRow, _>(broken.as_bytes(), "WMRODZ").unwrap_err();
        assert!(err.to_string().contains("WMRODZ line 2"));
    }

    #[test]
    fn test_load_rows_strips_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("WMRODZ.csv");
        fs::write(&path, "\u{feff}RM;NAZWA_RM;STAN_NA\n01;wieś;2013-02-28\n").unwrap();

        let rows = load_kinds(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, "01");
        assert_eq!(rows[0].name, "wieś");
    }

    #[test]
    fn test_parse_as_of() {
        let date = parse_as_of("2023-01-01").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert!(parse_as_of("01.01.2023").is_err());
    }
}
