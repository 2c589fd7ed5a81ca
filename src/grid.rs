// 🧭 Spatial Grid - which units already-matched places occupy, per cell
//
// The grid covers the bounding box of its members, stretched by 1% so the
// extreme points still fall inside. Every cell counts its members per
// Province / County / Municipality id.

use crate::entities::admin::{CountyId, MunicipalityId, ProvinceId};
use crate::entities::place::{Hierarchy, MapPlace};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Box stretch factor along both axes
const BOX_MARGIN: f64 = 1.01;

/// Anything with a position and an administrative hierarchy
pub trait GridMember {
    /// (lat, lon)
    fn position(&self) -> (f64, f64);
    fn hierarchy(&self) -> &Hierarchy;
}

impl GridMember for MapPlace {
    fn position(&self) -> (f64, f64) {
        (self.lat(), self.lon())
    }

    fn hierarchy(&self) -> &Hierarchy {
        MapPlace::hierarchy(self)
    }
}

// ============================================================================
// COUNTERS AND CELLS
// ============================================================================

/// How many members reference each unit. Keys are ids, so two units with
/// the same name are counted apart.
#[derive(Debug, Clone)]
pub struct LocationCounter<K> {
    counts: HashMap<K, usize>,
}

impl<K> Default for LocationCounter<K> {
    fn default() -> Self {
        LocationCounter {
            counts: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + Hash> LocationCounter<K> {
    pub fn add(&mut self, key: K) {
        *self.counts.entry(key).or_insert(0) += 1;
    }

    pub fn count(&self, key: K) -> usize {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    pub fn contains(&self, key: K) -> bool {
        self.counts.contains_key(&key)
    }

    /// Number of distinct units
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub x: usize,
    pub y: usize,
    pub provinces: LocationCounter<ProvinceId>,
    pub counties: LocationCounter<CountyId>,
    pub municipalities: LocationCounter<MunicipalityId>,
}

impl Cell {
    fn new(x: usize, y: usize) -> Self {
        Cell {
            x,
            y,
            ..Cell::default()
        }
    }

    fn add(&mut self, hierarchy: &Hierarchy) {
        if let Some(province) = hierarchy.province {
            self.provinces.add(province);
        }
        if let Some(county) = hierarchy.county {
            self.counties.add(county);
        }
        if let Some(municipality) = hierarchy.municipality {
            self.municipalities.add(municipality);
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} ({} provinces, {} counties, {} municipalities)",
            self.x,
            self.y,
            self.provinces.len(),
            self.counties.len(),
            self.municipalities.len()
        )
    }
}

// ============================================================================
// GRID
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub width: usize,
    pub height: usize,
}

impl GridSize {
    pub const fn new(width: usize, height: usize) -> Self {
        GridSize { width, height }
    }
}

impl fmt::Display for GridSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl BoundingBox {
    /// Tightest box around the points, None when there are none
    pub fn around(points: impl IntoIterator<Item = (f64, f64)>) -> Option<Self> {
        points.into_iter().fold(None, |acc, (lat, lon)| {
            Some(match acc {
                None => BoundingBox {
                    left: lon,
                    bottom: lat,
                    right: lon,
                    top: lat,
                },
                Some(b) => BoundingBox {
                    left: b.left.min(lon),
                    bottom: b.bottom.min(lat),
                    right: b.right.max(lon),
                    top: b.top.max(lat),
                },
            })
        })
    }
}

/// Cell size along one axis; a flat axis gets unit cells
fn axis_ratio(span: f64, cells: usize) -> f64 {
    let ratio = span * BOX_MARGIN / cells as f64;
    if ratio.is_finite() && ratio > 0.0 {
        ratio
    } else {
        1.0
    }
}

/// Cell index along one axis, clamped to the grid
fn axis_index(offset: f64, ratio: f64, cells: usize) -> usize {
    let index = (offset / ratio).floor();
    if !index.is_finite() || index <= 0.0 {
        0
    } else {
        (index as usize).min(cells - 1)
    }
}

#[derive(Debug, Clone)]
pub struct Grid {
    size: GridSize,
    bbox: BoundingBox,
    lon_ratio: f64,
    lat_ratio: f64,
    /// Row-major, `y * width + x`
    cells: Vec<Cell>,
    members: usize,
}

impl Grid {
    /// Build a grid over a snapshot of members
    pub fn build<'a, T, I>(members: I, size: GridSize) -> Grid
    where
        T: GridMember + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let size = GridSize::new(size.width.max(1), size.height.max(1));
        let members: Vec<&T> = members.into_iter().collect();

        let bbox = BoundingBox::around(members.iter().map(|m| m.position())).unwrap_or_default();
        let lon_ratio = axis_ratio(bbox.right - bbox.left, size.width);
        let lat_ratio = axis_ratio(bbox.top - bbox.bottom, size.height);

        let mut cells = Vec::with_capacity(size.width * size.height);
        for y in 0..size.height {
            for x in 0..size.width {
                cells.push(Cell::new(x, y));
            }
        }

        let mut grid = Grid {
            size,
            bbox,
            lon_ratio,
            lat_ratio,
            cells,
            members: members.len(),
        };
        for member in &members {
            let (lat, lon) = member.position();
            let (x, y) = grid.cell_coords(lat, lon);
            grid.cells[y * size.width + x].add(member.hierarchy());
        }

        tracing::debug!(
            grid = %grid,
            members = grid.members,
            lon_ratio,
            lat_ratio,
            "grid built"
        );
        grid
    }

    /// Cell coordinates of a point; points outside the box go to the
    /// nearest edge cell
    pub fn cell_coords(&self, lat: f64, lon: f64) -> (usize, usize) {
        (
            axis_index(lon - self.bbox.left, self.lon_ratio, self.size.width),
            axis_index(lat - self.bbox.bottom, self.lat_ratio, self.size.height),
        )
    }

    /// Whether a point lies inside the stretched box the cells cover
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let right = self.bbox.left + self.lon_ratio * self.size.width as f64;
        let top = self.bbox.bottom + self.lat_ratio * self.size.height as f64;
        (self.bbox.left..right).contains(&lon) && (self.bbox.bottom..top).contains(&lat)
    }

    pub fn cell_at(&self, x: usize, y: usize) -> Option<&Cell> {
        if x < self.size.width && y < self.size.height {
            self.cells.get(y * self.size.width + x)
        } else {
            None
        }
    }

    pub fn cell_at_position(&self, lat: f64, lon: f64) -> &Cell {
        let (x, y) = self.cell_coords(lat, lon);
        &self.cells[y * self.size.width + x]
    }

    pub fn cell_for<T: GridMember + ?Sized>(&self, member: &T) -> &Cell {
        let (lat, lon) = member.position();
        self.cell_at_position(lat, lon)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    pub fn member_count(&self) -> usize {
        self.members
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.4}, {:.4}, {:.4}, {:.4})",
            self.size, self.bbox.left, self.bbox.bottom, self.bbox.right, self.bbox.top
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::admin::AdminRegistry;
    use crate::test_support::{as_of, sample_registry};

    struct Point {
        lat: f64,
        lon: f64,
        hierarchy: Hierarchy,
    }

    impl GridMember for Point {
        fn position(&self) -> (f64, f64) {
            (self.lat, self.lon)
        }

        fn hierarchy(&self) -> &Hierarchy {
            &self.hierarchy
        }
    }

    fn in_municipality(registry: &AdminRegistry, code: &str, lat: f64, lon: f64) -> Point {
        let id = registry.municipality_by_code(code).unwrap();
        Point {
            lat,
            lon,
            hierarchy: Hierarchy::of_municipality(registry, id),
        }
    }

    #[test]
    fn test_every_member_in_exactly_one_cell() {
        let registry = sample_registry();
        let points: Vec<Point> = (0..50)
            .map(|i| {
                let code = if i % 2 == 0 { "1206152" } else { "2402042" };
                in_municipality(&registry, code, 49.0 + i as f64 * 0.05, 18.0 + (i % 7) as f64 * 0.3)
            })
            .collect();

        let grid = Grid::build(&points, GridSize::new(7, 5));

        let total: usize = grid.cells().iter().map(|c| c.municipalities.total()).sum();
        assert_eq!(total, points.len());
        for point in &points {
            assert!(grid.contains(point.lat, point.lon));
            let cell = grid.cell_for(point);
            assert!(cell
                .municipalities
                .contains(point.hierarchy.municipality.unwrap()));
            assert_eq!(grid.cell_at(cell.x, cell.y).unwrap().x, cell.x);
        }
    }

    #[test]
    fn test_counts_by_identity() {
        let mut registry = AdminRegistry::new();
        registry.add_province("MAŁOPOLSKIE", "12", as_of());
        registry.add_county("powiat krakowski", "1206", as_of()).unwrap();
        registry.add_county("powiat wielicki", "1219", as_of()).unwrap();
        registry.add_municipality("Nowa Wieś", "1206012", as_of()).unwrap();
        registry.add_municipality("Nowa Wieś", "1219012", as_of()).unwrap();

        let points = vec![
            in_municipality(&registry, "1206012", 50.0, 20.0),
            in_municipality(&registry, "1206012", 50.0, 20.0),
            in_municipality(&registry, "1219012", 50.0, 20.0),
        ];
        let grid = Grid::build(&points, GridSize::new(3, 3));
        let cell = grid.cell_for(&points[0]);

        assert_eq!(cell.municipalities.len(), 2);
        assert_eq!(
            cell.municipalities
                .count(points[0].hierarchy.municipality.unwrap()),
            2
        );
        assert_eq!(cell.counties.len(), 2);
        assert_eq!(cell.provinces.count(points[0].hierarchy.province.unwrap()), 3);
    }

    #[test]
    fn test_outside_points_clamp_to_edge() {
        let registry = sample_registry();
        let points = vec![
            in_municipality(&registry, "1206152", 50.0, 19.0),
            in_municipality(&registry, "2402042", 51.0, 20.0),
        ];
        let grid = Grid::build(&points, GridSize::new(10, 10));

        assert!(!grid.contains(40.0, 10.0));
        assert_eq!(grid.cell_coords(40.0, 10.0), (0, 0));
        assert_eq!(grid.cell_coords(60.0, 30.0), (9, 9));
        assert_eq!(grid.cell_coords(50.0, 30.0), (9, 0));
        assert_eq!(grid.cell_coords(f64::NAN, 19.0), (0, 0));
        assert!(grid.cell_at(10, 0).is_none());
    }

    #[test]
    fn test_degenerate_grids() {
        let registry = sample_registry();

        let empty: Vec<Point> = Vec::new();
        let grid = Grid::build(&empty, GridSize::new(4, 4));
        assert_eq!(grid.member_count(), 0);
        assert!(grid.cell_at_position(50.0, 20.0).counties.is_empty());

        // All members on one spot: nothing divides by zero
        let points = vec![
            in_municipality(&registry, "1206152", 50.0, 20.0),
            in_municipality(&registry, "1206152", 50.0, 20.0),
        ];
        let grid = Grid::build(&points, GridSize::new(31, 31));
        assert_eq!(grid.cell_coords(50.0, 20.0), (0, 0));
        assert_eq!(grid.cell_for(&points[0]).counties.total(), 2);
    }

    #[test]
    fn test_display() {
        let cell = Cell::new(3, 4);
        assert_eq!(cell.to_string(), "3x4 (0 provinces, 0 counties, 0 municipalities)");
        assert_eq!(GridSize::new(31, 31).to_string(), "31x31");
    }
}
