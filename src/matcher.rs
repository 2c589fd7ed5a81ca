// 🎯 Match Engine - map places ↔ SIMC settlements
//
// Pass 1 matches by name, type and hierarchy alone. Every further pass
// adds a grid built from all matches so far, and keeps only candidates
// whose county (then municipality) already occurs in the record's cell.
// Refinement then drops matches with too few same-unit neighbours.
//
// Within a pass all records are classified against the state at the start
// of the pass, then the matches are applied in id order.

use crate::config::MatchConfig;
use crate::entities::admin::AdminRegistry;
use crate::entities::place::{Hierarchy, MapPlace, PlaceCatalog, PlaceId};
use crate::entities::settlement::{Settlement, SettlementCatalog, SettlementId};
use crate::grid::{Grid, GridSize};
use crate::reporting::{Location, Reporter};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Outcome of classifying one record in one pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Nameless,
    /// No settlement has this name
    NotFound,
    /// Settlements with this name exist, none free and of the right type
    BadType { found: Vec<String> },
    /// Right name and type, but none fits the record's own hierarchy
    HierarchyMismatch { candidates: Vec<SettlementId> },
    /// No candidate's county occurs in the record's grid cell
    NotInCell,
    Ambiguous { candidates: Vec<SettlementId> },
    /// Other map records could be this settlement just as well
    ReverseAmbiguous {
        settlement: SettlementId,
        rivals: Vec<PlaceId>,
    },
    Match(SettlementId),
}

impl Verdict {
    /// Whether the record leaves the pool of unmatched records
    pub fn is_final(&self) -> bool {
        matches!(self, Verdict::Nameless | Verdict::NotFound | Verdict::Match(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassStats {
    pub pass: usize,
    pub grid: Option<GridSize>,
    /// Records in the pool when the pass started
    pub pool: usize,
    pub matched: usize,
    pub not_found: usize,
    pub bad_type: usize,
    pub hierarchy_mismatch: usize,
    pub ambiguous: usize,
    pub conflicts: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchOutcome {
    pub preassigned: Vec<PlaceId>,
    /// Matched by the passes, before refinement
    pub matched: Vec<PlaceId>,
    /// Removed by refinement; their links are severed
    pub discarded: Vec<PlaceId>,
    /// Preassigned plus surviving matches, in id order
    pub accepted: Vec<PlaceId>,
    /// Records still undecided after the last pass
    pub unmatched: usize,
    pub passes: Vec<PassStats>,
}

impl MatchOutcome {
    /// SHA-256 over the sorted accepted (OSM id, SIMC id) pairs
    pub fn fingerprint(&self, places: &PlaceCatalog, settlements: &SettlementCatalog) -> String {
        let mut pairs: Vec<(&str, &str)> = self
            .accepted
            .iter()
            .filter_map(|&id| {
                let place = places.get(id);
                place
                    .settlement()
                    .map(|s| (place.osm_id(), settlements.get(s).id.as_str()))
            })
            .collect();
        pairs.sort_unstable();

        let mut hasher = Sha256::new();
        for (osm_id, simc_id) in pairs {
            hasher.update(format!("{}={}\n", osm_id, simc_id));
        }
        format!("{:x}", hasher.finalize())
    }
}

fn describe_all(ids: &[SettlementId], settlements: &SettlementCatalog, registry: &AdminRegistry) -> String {
    ids.iter()
        .map(|&id| settlements.get(id).describe(registry))
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct MatchEngine<'a> {
    registry: &'a AdminRegistry,
    config: &'a MatchConfig,
}

impl<'a> MatchEngine<'a> {
    pub fn new(registry: &'a AdminRegistry, config: &'a MatchConfig) -> Self {
        MatchEngine { registry, config }
    }

    /// All passes plus refinement
    pub fn run(
        &self,
        places: &mut PlaceCatalog,
        settlements: &mut SettlementCatalog,
        reporter: &mut Reporter,
    ) -> MatchOutcome {
        let preassigned: Vec<PlaceId> = places
            .ids()
            .filter(|&id| places.get(id).is_matched())
            .collect();
        reporter.output(
            "start",
            format!(
                "{} map places already carry a SIMC code",
                preassigned.len()
            ),
            Location::none(),
        );

        let mut pool: BTreeSet<PlaceId> = places
            .ids()
            .filter(|&id| !places.get(id).is_matched())
            .collect();
        let mut reference: BTreeSet<PlaceId> = preassigned.iter().copied().collect();
        let mut matched = Vec::new();
        let mut passes = Vec::new();

        let grids = std::iter::once(None).chain(self.config.match_grids.iter().copied().map(Some));
        for (index, size) in grids.enumerate() {
            let grid = size.map(|size| Grid::build(reference.iter().map(|&id| places.get(id)), size));
            let (stats, newly) =
                self.match_pass(index + 1, &mut pool, grid.as_ref(), places, settlements, reporter);
            reference.extend(newly.iter().copied());
            matched.extend(newly);
            passes.push(stats);
        }

        let discarded = self.refine(&matched, &reference, places, settlements, reporter);
        for &id in &discarded {
            places.unassign(id, settlements);
        }

        let discarded_set: BTreeSet<PlaceId> = discarded.iter().copied().collect();
        let accepted: BTreeSet<PlaceId> = preassigned
            .iter()
            .chain(&matched)
            .copied()
            .filter(|id| !discarded_set.contains(id))
            .collect();

        let settlements_matched = settlements
            .ids()
            .filter(|&id| settlements.get(id).matched_place().is_some())
            .count();
        reporter.output(
            "stats",
            format!(
                "{} of {} map places matched to SIMC, {} of {} settlements found on the map",
                accepted.len(),
                places.len(),
                settlements_matched,
                settlements.len()
            ),
            Location::none(),
        );

        MatchOutcome {
            preassigned,
            matched,
            discarded,
            accepted: accepted.into_iter().collect(),
            unmatched: pool.len(),
            passes,
        }
    }

    /// Classify one unmatched record without changing anything
    pub fn classify(
        &self,
        id: PlaceId,
        places: &PlaceCatalog,
        settlements: &SettlementCatalog,
        grid: Option<&Grid>,
    ) -> Verdict {
        let place = places.get(id);
        let Some(name) = place.name.as_deref() else {
            return Verdict::Nameless;
        };
        let Ok(named) = settlements.by_name(name) else {
            return Verdict::NotFound;
        };

        let typed: Vec<SettlementId> = named
            .iter()
            .copied()
            .filter(|&sid| {
                let settlement = settlements.get(sid);
                place.normalized_type.as_deref() == Some(settlement.place_type.as_str())
                    && settlement.matched_place().is_none()
            })
            .collect();
        if typed.is_empty() {
            let found = named
                .iter()
                .map(|&sid| settlements.get(sid).place_type.clone())
                .collect();
            return Verdict::BadType { found };
        }

        let own = place.hierarchy();
        let mut candidates: Vec<SettlementId> = typed
            .iter()
            .copied()
            .filter(|&sid| own.is_consistent_with(&Hierarchy::of_settlement(settlements.get(sid))))
            .collect();
        if candidates.is_empty() {
            return Verdict::HierarchyMismatch { candidates: typed };
        }

        let cell = grid.map(|grid| grid.cell_for(place));
        if let Some(cell) = cell {
            candidates.retain(|&sid| cell.counties.contains(settlements.get(sid).county));
            if candidates.len() > 1 {
                candidates
                    .retain(|&sid| cell.municipalities.contains(settlements.get(sid).municipality));
            }
            if candidates.is_empty() {
                return Verdict::NotInCell;
            }
        }

        if candidates.len() != 1 {
            return Verdict::Ambiguous { candidates };
        }
        let settlement = candidates[0];

        // Reverse check: would another unmatched record fit the same
        // settlement? A record placed in its municipality outranks namesakes
        // that have none.
        let target = Hierarchy::of_settlement(settlements.get(settlement));
        let rivals: Vec<PlaceId> = places
            .by_name(&settlements.get(settlement).name)
            .iter()
            .copied()
            .filter(|&other| other != id)
            .filter(|&other| {
                let rival = places.get(other);
                let same_cell = match (grid, cell) {
                    (Some(grid), Some(cell)) => {
                        let theirs = grid.cell_for(rival);
                        (theirs.x, theirs.y) == (cell.x, cell.y)
                    }
                    _ => true,
                };
                let outranked =
                    own.municipality.is_some() && rival.hierarchy().municipality.is_none();
                !rival.is_matched()
                    && !outranked
                    && rival.hierarchy().is_consistent_with(&target)
                    && same_cell
            })
            .collect();
        if !rivals.is_empty() {
            return Verdict::ReverseAmbiguous { settlement, rivals };
        }

        Verdict::Match(settlement)
    }

    /// One pass over the pool; returns its stats and the newly matched records
    pub fn match_pass(
        &self,
        pass: usize,
        pool: &mut BTreeSet<PlaceId>,
        grid: Option<&Grid>,
        places: &mut PlaceCatalog,
        settlements: &mut SettlementCatalog,
        reporter: &mut Reporter,
    ) -> (PassStats, Vec<PlaceId>) {
        let label = match grid {
            Some(grid) => format!("Matching {} places, pass {}, grid {}", pool.len(), pass, grid),
            None => format!("Matching {} places, pass {}", pool.len(), pass),
        };
        let mut progress = reporter.progress(&label, pool.len());
        let verdicts: Vec<(PlaceId, Verdict)> = pool
            .iter()
            .map(|&id| {
                progress.tick();
                (id, self.classify(id, places, settlements, grid))
            })
            .collect();
        progress.finish();

        let ambiguous_channel = format!("ambiguous{}", pass);
        let mut stats = PassStats {
            pass,
            grid: grid.map(Grid::size),
            pool: pool.len(),
            ..PassStats::default()
        };
        let mut newly = Vec::new();

        for (id, verdict) in verdicts {
            if verdict.is_final() {
                pool.remove(&id);
            }
            let place = places.get(id);
            let location = Location::of(place, self.registry);

            match verdict {
                Verdict::Nameless => {
                    reporter.output("errors", format!("{}: place without a name", place), location);
                }
                Verdict::NotFound => {
                    stats.not_found += 1;
                    reporter.output("not_found", format!("{}: not found in SIMC", place), location);
                }
                Verdict::BadType { found } => {
                    stats.bad_type += 1;
                    reporter.output(
                        "bad_type",
                        format!(
                            "{}: no SIMC record of the right type ({:?}, found: {:?})",
                            place,
                            place.place_type.as_deref().unwrap_or(""),
                            found
                        ),
                        location,
                    );
                }
                Verdict::HierarchyMismatch { candidates } => {
                    stats.hierarchy_mismatch += 1;
                    reporter.output(
                        "hierarchy_mismatch",
                        format!(
                            "{}: no SIMC record within its location tags: {}",
                            place,
                            describe_all(&candidates, settlements, self.registry)
                        ),
                        location,
                    );
                }
                Verdict::NotInCell => {
                    stats.not_found += 1;
                    let cell = grid.map(|g| g.cell_for(place).to_string()).unwrap_or_default();
                    reporter.output(
                        &format!("not_found{}", pass),
                        format!("{}: no SIMC record fitting cell {}", place, cell),
                        location,
                    );
                }
                Verdict::Ambiguous { candidates } => {
                    stats.ambiguous += 1;
                    reporter.output(
                        &ambiguous_channel,
                        format!(
                            "{} matches several SIMC records: {}",
                            place,
                            describe_all(&candidates, settlements, self.registry)
                        ),
                        location,
                    );
                }
                Verdict::ReverseAmbiguous { settlement, rivals } => {
                    stats.ambiguous += 1;
                    let rivals = rivals
                        .iter()
                        .map(|&r| places.get(r).to_string())
                        .collect::<Vec<_>>()
                        .join("; ");
                    reporter.output(
                        &ambiguous_channel,
                        format!(
                            "{} matches several map places: {}",
                            settlements.get(settlement).describe(self.registry),
                            rivals
                        ),
                        location,
                    );
                }
                Verdict::Match(settlement) => {
                    let description = settlements.get(settlement).describe(self.registry);
                    let label = place.to_string();
                    match places.assign(id, settlement, settlements) {
                        Ok(()) => {
                            stats.matched += 1;
                            newly.push(id);
                            let place = places.get(id);
                            reporter.output(
                                "match",
                                format!("{} is {}", label, description),
                                Location::of(place, self.registry),
                            );
                        }
                        Err(err) => {
                            // Claimed earlier in this pass; the first claim stays
                            stats.conflicts += 1;
                            pool.insert(id);
                            reporter.output(
                                &ambiguous_channel,
                                format!("{}: {}", label, err),
                                Location::of(places.get(id), self.registry),
                            );
                        }
                    }
                }
            }
        }

        reporter.output(
            "stats",
            format!(
                "Pass {}: matched {} of {} map places",
                pass, stats.matched, stats.pool
            ),
            Location::none(),
        );
        (stats, newly)
    }

    /// Suspect: too few neighbours in the same county, or in the same
    /// province for settlements named like their county seat
    fn is_suspect(&self, place: &MapPlace, settlement: &Settlement, grid: &Grid) -> bool {
        let cell = grid.cell_for(place);
        let min = self.config.min_neighbours;
        if settlement.name == self.registry.county(settlement.county).name {
            cell.provinces.count(settlement.province) < min
        } else {
            cell.counties.count(settlement.county) < min
        }
    }

    /// Matches failing the neighbour rule on every refinement grid
    ///
    /// Each grid covers all `reference` records; each round only re-checks
    /// the previous round's suspects.
    pub fn refine(
        &self,
        matched: &[PlaceId],
        reference: &BTreeSet<PlaceId>,
        places: &PlaceCatalog,
        settlements: &SettlementCatalog,
        reporter: &mut Reporter,
    ) -> Vec<PlaceId> {
        let rounds = &self.config.refine_grids;
        if rounds.is_empty() {
            return Vec::new();
        }

        let mut suspects = matched.to_vec();
        for (round, &size) in rounds.iter().enumerate() {
            let grid = Grid::build(reference.iter().map(|&id| places.get(id)), size);
            let channel = if round + 1 == rounds.len() {
                "really_bad_match"
            } else {
                "bad_match"
            };

            let mut progress = reporter.progress(
                &format!("Looking for mismatches, round {}", round + 1),
                suspects.len(),
            );
            suspects.retain(|&id| {
                progress.tick();
                let place = places.get(id);
                let Some(settlement) = place.settlement() else {
                    return false;
                };
                let suspect = self.is_suspect(place, settlements.get(settlement), &grid);
                if suspect {
                    reporter.output(
                        channel,
                        format!("Probably mismatched: {} (cell {})", place, grid.cell_for(place)),
                        Location::of(place, self.registry),
                    );
                }
                suspect
            });
            progress.finish();

            reporter.output(
                "info",
                format!(
                    "Refinement round {} on grid {}: {} suspects",
                    round + 1,
                    size,
                    suspects.len()
                ),
                Location::none(),
            );
        }
        suspects
    }
}

// ============================================================================
// TESTS
// ============================================================================
