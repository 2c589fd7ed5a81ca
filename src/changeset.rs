// 📝 Change Emitter - registry tags for matched places, osmChange output
//
// Tags are only written when their value changes, so a place already in
// sync produces no update. An existing is_in is replaced only if we know
// every component it has.

use crate::entities::admin::{AdminRegistry, ProvinceId};
use crate::entities::place::{MapPlace, PlaceCatalog, PlaceId};
use crate::entities::settlement::{SettlementCatalog, SettlementId};
use crate::osm::write_node;
use crate::parser::AS_OF_FORMAT;
use crate::reporting::{Location, Reporter};
use anyhow::{Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const COUNTRY: &str = "Poland";
pub const OSM_CHANGE_VERSION: &str = "0.3";
pub const UPDATED_BY_TAG: &str = "teryt:updated_by";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TagChange {
    Set {
        key: String,
        old: Option<String>,
        new: String,
    },
    Remove {
        key: String,
        old: String,
    },
}

impl TagChange {
    pub fn key(&self) -> &str {
        match self {
            TagChange::Set { key, .. } | TagChange::Remove { key, .. } => key,
        }
    }
}

/// Tag delta for one matched place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceUpdate {
    pub place: PlaceId,
    pub province: ProvinceId,
    pub changes: Vec<TagChange>,
    /// Existing is_in left alone because it says more than we know
    pub kept_is_in: Option<String>,
}

/// Lower-cased components of an is_in value (',' or ';' separated)
fn is_in_components(value: &str) -> BTreeSet<String> {
    value
        .split([',', ';'])
        .map(|part| part.trim().to_lowercase())
        .filter(|part| !part.is_empty())
        .collect()
}

pub struct ChangeEmitter<'a> {
    registry: &'a AdminRegistry,
    generator: &'a str,
}

impl<'a> ChangeEmitter<'a> {
    pub fn new(registry: &'a AdminRegistry, generator: &'a str) -> Self {
        ChangeEmitter {
            registry,
            generator,
        }
    }

    /// is_in value for a settlement: parent chain, then municipality,
    /// county and province full names, then the country
    ///
    /// City counties are left out, except that the capital's county adds
    /// the city name.
    pub fn hierarchy_string(&self, id: SettlementId, settlements: &SettlementCatalog) -> String {
        let settlement = settlements.get(id);
        let county = self.registry.county(settlement.county);

        let mut parts: Vec<String> = settlements
            .ancestors(id)
            .into_iter()
            .map(|ancestor| settlements.get(ancestor).name.clone())
            .collect();
        parts.push(self.registry.municipality(settlement.municipality).full_name());
        if !county.is_city() {
            parts.push(county.full_name());
        } else if county.is_capital() {
            parts.push(county.name.clone());
        }
        parts.push(self.registry.province(settlement.province).full_name());
        parts.push(COUNTRY.to_string());

        let mut seen = HashSet::new();
        seen.insert(settlement.name.to_lowercase());
        parts.retain(|part| seen.insert(part.to_lowercase()));
        parts.join(", ")
    }

    /// Tag delta for a matched place; None when it is not matched
    pub fn compute_update(
        &self,
        id: PlaceId,
        place: &MapPlace,
        settlements: &SettlementCatalog,
    ) -> Option<PlaceUpdate> {
        let settlement_id = place.settlement()?;
        let settlement = settlements.get(settlement_id);
        let county = self.registry.county(settlement.county);
        let province = self.registry.province(settlement.province);

        let mut wanted: Vec<(&str, Option<String>)> = vec![
            ("teryt:simc", Some(settlement.id.clone())),
            (
                "teryt:terc",
                Some(self.registry.municipality(settlement.municipality).code.clone()),
            ),
            ("teryt:rm", Some(settlement.kind.clone())),
            (
                "teryt:stan_na",
                Some(settlement.as_of.format(AS_OF_FORMAT).to_string()),
            ),
            (
                "teryt:sympod",
                settlement.parent().map(|p| settlements.get(p).id.clone()),
            ),
        ];

        let is_in = self.hierarchy_string(settlement_id, settlements);
        let mut kept_is_in = None;
        match place.node.tag("is_in") {
            Some(existing)
                if !is_in_components(existing).is_subset(&is_in_components(&is_in)) =>
            {
                kept_is_in = Some(existing.to_string());
            }
            _ => wanted.push(("is_in", Some(is_in))),
        }

        wanted.push(("is_in:country", Some(COUNTRY.to_string())));
        wanted.push(("is_in:province", Some(province.full_name())));
        wanted.push((
            "is_in:county",
            (!county.is_city()).then(|| county.full_name()),
        ));

        let changes = wanted
            .into_iter()
            .filter_map(|(key, value)| {
                let old = place.node.tag(key).map(str::to_string);
                match (old, value) {
                    (Some(old), Some(new)) if old == new => None,
                    (old, Some(new)) => Some(TagChange::Set {
                        key: key.to_string(),
                        old,
                        new,
                    }),
                    (Some(old), None) => Some(TagChange::Remove {
                        key: key.to_string(),
                        old,
                    }),
                    (None, None) => None,
                }
            })
            .collect();

        Some(PlaceUpdate {
            place: id,
            province: settlement.province,
            changes,
            kept_is_in,
        })
    }

    /// Write the deltas into the nodes; returns the places that changed
    pub fn apply(
        &self,
        accepted: &[PlaceId],
        places: &mut PlaceCatalog,
        settlements: &SettlementCatalog,
        reporter: &mut Reporter,
    ) -> Vec<PlaceUpdate> {
        let mut progress = reporter.progress("Updating tags", accepted.len());
        let mut updated = Vec::new();

        for &id in accepted {
            progress.tick();
            let Some(update) = self.compute_update(id, places.get(id), settlements) else {
                continue;
            };

            if let Some(existing) = &update.kept_is_in {
                let place = places.get(id);
                reporter.output(
                    "warnings",
                    format!(
                        "{}: is_in {:?} not changed, it has components we do not know",
                        place, existing
                    ),
                    Location::of(place, self.registry),
                );
            }
            if update.changes.is_empty() {
                continue;
            }

            let place = places.get_mut(id);
            for change in &update.changes {
                match change {
                    TagChange::Set { key, new, .. } => {
                        place.node.tags.insert(key.clone(), new.clone());
                    }
                    TagChange::Remove { key, .. } => {
                        place.node.tags.remove(key);
                    }
                }
            }
            place.is_in = place.node.tag("is_in").map(str::to_string);
            place.simc_id = place.node.tag("teryt:simc").map(str::to_string);
            place.terc_id = place.node.tag("teryt:terc").map(str::to_string);

            let place = places.get(id);
            let keys: Vec<&str> = update.changes.iter().map(TagChange::key).collect();
            reporter.output(
                "updated",
                format!("{}: {}", place, keys.join(", ")),
                Location::of(place, self.registry),
            );
            updated.push(update);
        }
        progress.finish();

        reporter.output(
            "stats",
            format!("{} of {} matched places updated", updated.len(), accepted.len()),
            Location::none(),
        );
        updated
    }

    /// One `<province>.osc` plus `<province>.comment` per province
    pub fn write_changes(
        &self,
        updates: &[PlaceUpdate],
        places: &PlaceCatalog,
        dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let mut by_province: BTreeMap<&str, Vec<PlaceId>> = BTreeMap::new();
        for update in updates {
            let name = self.registry.province(update.province).name.as_str();
            by_province.entry(name).or_default().push(update.place);
        }

        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

        let mut written = Vec::new();
        for (province, ids) in by_province {
            let path = dir.join(format!("{}.osc", province));
            self.write_osm_change(&path, ids.iter().map(|&id| places.get(id)))
                .with_context(|| format!("Failed to write {}", path.display()))?;

            let comment_path = dir.join(format!("{}.comment", province));
            fs::write(
                &comment_path,
                format!(
                    "TERYT import, województwo {}, prepared by {}\n",
                    province, self.generator
                ),
            )
            .with_context(|| format!("Failed to write {}", comment_path.display()))?;

            tracing::info!(province, places = ids.len(), "change file written");
            written.push(path);
        }
        Ok(written)
    }

    fn write_osm_change<'p>(
        &self,
        path: &Path,
        places: impl Iterator<Item = &'p MapPlace>,
    ) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("osmChange");
        root.push_attribute(("version", OSM_CHANGE_VERSION));
        root.push_attribute(("generator", self.generator));
        writer.write_event(Event::Start(root))?;

        let mut modify = BytesStart::new("modify");
        modify.push_attribute(("version", OSM_CHANGE_VERSION));
        modify.push_attribute(("generator", self.generator));
        writer.write_event(Event::Start(modify))?;

        for place in places {
            write_node(&mut writer, &place.node, &[(UPDATED_BY_TAG, self.generator)])?;
        }

        writer.write_event(Event::End(BytesEnd::new("modify")))?;
        writer.write_event(Event::End(BytesEnd::new("osmChange")))?;
        writer.get_mut().flush()?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{place_node, sample_settlement_rows, sample_world, simc_row, world_with, World};

    const GENERATOR: &str = "teryt-reconcile test";

    fn linked(world: &mut World, simc: &str, extra: &[(&str, &str)]) -> PlaceId {
        let mut node = place_node("100", "Anything", "village", 50.0, 20.0).with_tag("teryt:simc", simc);
        for (key, value) in extra {
            node = node.with_tag(key, value);
        }
        world.insert(node)
    }

    #[test]
    fn test_hierarchy_string() {
        let mut rows = sample_settlement_rows();
        rows.push(simc_row("0388802", "Wawer", "1465011", "95", ""));
        let world = world_with(&rows);
        let emitter = ChangeEmitter::new(&world.registry, GENERATOR);
        let string = |simc: &str| emitter.hierarchy_string(world.settlement(simc), &world.settlements);

        assert_eq!(
            string("0316048"),
            "Bibice, gmina Zielonki, powiat krakowski, województwo małopolskie, Poland"
        );
        assert_eq!(string("0950463"), "gmina Kraków, województwo małopolskie, Poland");
        assert_eq!(
            string("0388802"),
            "gmina Warszawa, Warszawa, województwo mazowieckie, Poland"
        );
        assert_eq!(
            string("0388736"),
            "Warszawa, gmina Warszawa, województwo mazowieckie, Poland"
        );
    }

    #[test]
    fn test_superset_is_in_is_kept() {
        let mut world = sample_world();
        let id = linked(
            &mut world,
            "0316031",
            &[(
                "is_in",
                "gmina Zielonki, powiat krakowski, województwo małopolskie, Poland, Europe",
            )],
        );
        let emitter = ChangeEmitter::new(&world.registry, GENERATOR);

        let update = emitter
            .compute_update(id, world.places.get(id), &world.settlements)
            .unwrap();

        assert!(update.kept_is_in.is_some());
        assert!(update.changes.iter().all(|c| c.key() != "is_in"));

        emitter.apply(&[id], &mut world.places, &world.settlements, &mut world.reporter);
        assert_eq!(world.reporter.count("warnings"), 1);
        assert!(world.places.get(id).node.tag("is_in").unwrap().ends_with("Europe"));
    }

    #[test]
    fn test_subset_is_in_is_replaced() {
        let mut world = sample_world();
        let id = linked(&mut world, "0316031", &[("is_in", "Gmina Zielonki;POLAND")]);
        let emitter = ChangeEmitter::new(&world.registry, GENERATOR);

        let updates = emitter.apply(&[id], &mut world.places, &world.settlements, &mut world.reporter);

        assert_eq!(updates.len(), 1);
        let place = world.places.get(id);
        assert_eq!(
            place.node.tag("is_in"),
            Some("gmina Zielonki, powiat krakowski, województwo małopolskie, Poland")
        );
        assert_eq!(place.is_in.as_deref(), place.node.tag("is_in"));
        assert_eq!(place.node.tag("teryt:terc"), Some("1206152"));
        assert_eq!(place.node.tag("teryt:rm"), Some("01"));
        assert_eq!(place.node.tag("teryt:stan_na"), Some("2023-01-01"));
        assert_eq!(place.node.tag("is_in:country"), Some("Poland"));
        assert_eq!(place.node.tag("is_in:province"), Some("województwo małopolskie"));
        assert_eq!(place.node.tag("is_in:county"), Some("powiat krakowski"));
        assert_eq!(world.reporter.count("warnings"), 0);
    }

    #[test]
    fn test_sympod_and_city_county_removed() {
        let mut world = sample_world();
        let id = linked(
            &mut world,
            "0950463",
            &[("teryt:sympod", "0316031"), ("is_in:county", "powiat Kraków")],
        );
        let emitter = ChangeEmitter::new(&world.registry, GENERATOR);

        let update = emitter
            .compute_update(id, world.places.get(id), &world.settlements)
            .unwrap();

        assert!(update.changes.contains(&TagChange::Remove {
            key: "teryt:sympod".to_string(),
            old: "0316031".to_string(),
        }));
        assert!(update.changes.contains(&TagChange::Remove {
            key: "is_in:county".to_string(),
            old: "powiat Kraków".to_string(),
        }));
    }

    #[test]
    fn test_second_apply_changes_nothing() {
        let mut world = sample_world();
        let child = linked(&mut world, "0316048", &[]);
        let emitter = ChangeEmitter::new(&world.registry, GENERATOR);

        let first = emitter.apply(&[child], &mut world.places, &world.settlements, &mut world.reporter);
        assert_eq!(world.places.get(child).node.tag("teryt:sympod"), Some("0316031"));
        let second = emitter.apply(&[child], &mut world.places, &world.settlements, &mut world.reporter);

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn test_write_changes_per_province() {
        let mut world = sample_world();
        let bibice = world.insert(
            place_node("1", "Bibice", "village", 50.1, 19.9).with_tag("teryt:simc", "0316031"),
        );
        let krakow = world.insert(
            place_node("2", "Kraków", "city", 50.06, 19.94).with_tag("teryt:simc", "0950463"),
        );
        let warszawa = world.insert(
            place_node("3", "Warszawa", "city", 52.23, 21.01).with_tag("teryt:simc", "0918123"),
        );
        let emitter = ChangeEmitter::new(&world.registry, GENERATOR);
        let updates = emitter.apply(
            &[bibice, krakow, warszawa],
            &mut world.places,
            &world.settlements,
            &mut world.reporter,
        );

        let dir = tempfile::tempdir().unwrap();
        let written = emitter
            .write_changes(&updates, &world.places, dir.path())
            .unwrap();

        assert_eq!(written.len(), 2);
        let malopolskie = fs::read_to_string(dir.path().join("małopolskie.osc")).unwrap();
        assert!(malopolskie.contains(r#"<osmChange version="0.3" generator="teryt-reconcile test">"#));
        assert!(malopolskie.contains("<modify"));
        assert!(malopolskie.contains(r#"<node id="1""#));
        assert!(malopolskie.contains(r#"<node id="2""#));
        assert!(!malopolskie.contains(r#"<node id="3""#));
        assert!(malopolskie.contains(r#"<tag k="teryt:updated_by" v="teryt-reconcile test"/>"#));

        let comment = fs::read_to_string(dir.path().join("mazowieckie.comment")).unwrap();
        assert_eq!(
            comment,
            "TERYT import, województwo mazowieckie, prepared by teryt-reconcile test\n"
        );
    }
}
