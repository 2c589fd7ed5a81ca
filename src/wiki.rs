// 📋 Wiki Tables - province list and settlement kinds for the project page

use crate::entities::admin::AdminRegistry;
use crate::entities::settlement::KindTable;
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const PROVINCES_WIKI_FILE: &str = "wojewodztwa.wiki";
pub const KINDS_WIKI_FILE: &str = "wmrodz.wiki";

/// Provinces by code, with empty columns left for progress notes
pub fn provinces_table(registry: &AdminRegistry) -> String {
    let mut out = String::new();
    out.push_str("{| class=\"wikitable\" border=\"1\" cellspacing=\"0\" cellpadding=\"4\"\n");
    out.push_str("! Kod TERYT\n! Nazwa\n! Kompletność\n! Relacja\n! Uwagi\n");
    for province in registry.provinces() {
        let _ = writeln!(out, "|-\n| {}\n| {}\n| \n| \n| ", province.code, province.name);
    }
    out.push_str("|}\n");
    out
}

/// Settlement kinds with the place tag each one maps to
pub fn kinds_table(kinds: &KindTable) -> String {
    let mut out = String::new();
    out.push_str("{| class=\"wikitable\"\n");
    out.push_str("! kod RM || nazwa TERYT || tag OSM || uwagi\n");
    for (code, name, place_type) in kinds.entries() {
        out.push_str("|-\n");
        let _ = match place_type {
            Some(place_type) => writeln!(
                out,
                "| {} || {} || {{{{Tag|place|{}}}}} ||",
                code, name, place_type
            ),
            None => writeln!(out, "| {} || {} || ||", code, name),
        };
    }
    out.push_str("|}\n");
    out
}

/// Write both tables into `dir`
pub fn write_tables(registry: &AdminRegistry, kinds: &KindTable, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let tables = [
        (PROVINCES_WIKI_FILE, provinces_table(registry)),
        (KINDS_WIKI_FILE, kinds_table(kinds)),
    ];
    let mut written = Vec::new();
    for (file, content) in tables {
        let path = dir.join(file);
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_kinds, sample_registry};

    #[test]
    fn test_provinces_table() {
        let table = provinces_table(&sample_registry());

        assert!(table.starts_with("{| class=\"wikitable\""));
        assert!(table.contains("|-\n| 12\n| małopolskie\n| \n| \n| \n"));
        assert!(table.find("| 12\n").unwrap() < table.find("| 24\n").unwrap());
        assert!(table.ends_with("|}\n"));
    }

    #[test]
    fn test_kinds_table() {
        let table = kinds_table(&sample_kinds());

        assert!(table.contains("| 01 || wieś || {{Tag|place|village}} ||\n"));
        assert!(table.contains("| 03 || osada || ||\n"));
        assert!(table.contains("| 96 || miasto || {{Tag|place|city}} ||\n"));
    }

    #[test]
    fn test_write_tables() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_tables(&sample_registry(), &sample_kinds(), &dir.path().join("out")).unwrap();

        assert_eq!(written.len(), 2);
        assert!(dir.path().join("out").join(PROVINCES_WIKI_FILE).exists());
        assert!(dir.path().join("out").join(KINDS_WIKI_FILE).exists());
    }
}
