//! Prepared index over protected zones.
//!
//! [`ZoneIndex`] buckets zone bounding boxes into a uniform grid over the
//! layer's extent so a query only tests zones sharing a cell with it. The
//! index is immutable; [`ZoneIndexHandle`] swaps in a rebuilt index when the
//! zone layer changes while in-flight jobs keep the snapshot they started
//! with.

use std::sync::{Arc, RwLock};

use landwatch_geo::{BBox, Geometry, Polygon};
use landwatch_state::{ProtectedZone, StorageResult, ZoneRepository};
use tracing::info;

const MAX_GRID_SIDE: usize = 64;

#[derive(Debug)]
struct IndexedZone {
    zone: ProtectedZone,
    geometry: Geometry,
    bbox: BBox,
}

#[derive(Debug)]
struct Grid {
    extent: BBox,
    side: usize,
    cells: Vec<Vec<usize>>,
}

impl Grid {
    fn axis_cell(&self, v: f64, min: f64, span: f64) -> usize {
        if span <= 0.0 {
            return 0;
        }
        let cell = ((v - min) / span * self.side as f64).floor();
        (cell.max(0.0) as usize).min(self.side - 1)
    }

    /// Inclusive cell ranges covered by `bbox`, `None` when outside the extent.
    fn cell_range(&self, bbox: &BBox) -> Option<(usize, usize, usize, usize)> {
        if !self.extent.intersects(bbox) {
            return None;
        }
        let (w, h) = (self.extent.width(), self.extent.height());
        Some((
            self.axis_cell(bbox.min_x, self.extent.min_x, w),
            self.axis_cell(bbox.max_x, self.extent.min_x, w),
            self.axis_cell(bbox.min_y, self.extent.min_y, h),
            self.axis_cell(bbox.max_y, self.extent.min_y, h),
        ))
    }
}

/// Read-only spatial index over a zone snapshot.
#[derive(Debug, Default)]
pub struct ZoneIndex {
    zones: Vec<IndexedZone>,
    grid: Option<Grid>,
}

impl ZoneIndex {
    /// Build an index; zones keep the order they are given in.
    pub fn build(zones: Vec<ProtectedZone>) -> Self {
        let zones: Vec<IndexedZone> = zones
            .into_iter()
            .filter_map(|zone| {
                let bbox = zone.geometry.bbox()?;
                let geometry = Geometry::MultiPolygon(zone.geometry.clone());
                Some(IndexedZone {
                    zone,
                    geometry,
                    bbox,
                })
            })
            .collect();

        let Some(extent) = zones.iter().map(|z| z.bbox).reduce(|a, b| a.union(&b)) else {
            return Self::default();
        };
        let side = ((zones.len() as f64).sqrt().ceil() as usize).clamp(1, MAX_GRID_SIDE);
        let mut grid = Grid {
            extent,
            side,
            cells: vec![Vec::new(); side * side],
        };
        for (i, z) in zones.iter().enumerate() {
            if let Some((c0, c1, r0, r1)) = grid.cell_range(&z.bbox) {
                for r in r0..=r1 {
                    for c in c0..=c1 {
                        grid.cells[r * side + c].push(i);
                    }
                }
            }
        }

        Self {
            zones,
            grid: Some(grid),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    fn candidates(&self, bbox: &BBox) -> Vec<usize> {
        let Some(grid) = &self.grid else {
            return Vec::new();
        };
        let Some((c0, c1, r0, r1)) = grid.cell_range(bbox) else {
            return Vec::new();
        };
        let mut out: Vec<usize> = (r0..=r1)
            .flat_map(|r| (c0..=c1).map(move |c| r * grid.side + c))
            .flat_map(|cell| grid.cells[cell].iter().copied())
            .filter(|&i| self.zones[i].bbox.intersects(bbox))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Zones intersecting `geometry` (boundary-inclusive), in index order.
    pub fn intersecting(&self, geometry: &Geometry) -> Vec<&ProtectedZone> {
        let Some(bbox) = geometry.bbox() else {
            return Vec::new();
        };
        self.candidates(&bbox)
            .into_iter()
            .map(|i| &self.zones[i])
            .filter(|z| z.geometry.intersects(geometry))
            .map(|z| &z.zone)
            .collect()
    }

    pub fn intersecting_polygon(&self, polygon: &Polygon) -> Vec<&ProtectedZone> {
        self.candidates(&polygon.bbox())
            .into_iter()
            .map(|i| &self.zones[i])
            .filter(|z| z.geometry.intersects_polygon(polygon))
            .map(|z| &z.zone)
            .collect()
    }
}

/// Shared, swappable zone index.
#[derive(Debug, Default)]
pub struct ZoneIndexHandle {
    current: RwLock<Arc<ZoneIndex>>,
}

impl ZoneIndexHandle {
    pub fn new(index: ZoneIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// The index as of now. Later swaps do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<ZoneIndex> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn replace(&self, index: ZoneIndex) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(index);
    }

    /// Rebuild from the repository and swap it in. Returns the zone count.
    pub async fn refresh(&self, repo: &dyn ZoneRepository) -> StorageResult<usize> {
        let zones = repo.list_active_zones().await?;
        let index = ZoneIndex::build(zones);
        let count = index.len();
        self.replace(index);
        info!(zones = count, "zone index rebuilt");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landwatch_state::fakes::MemoryZoneRepository;

    fn zone(id: &str, zone_type: &str, bbox: [f64; 4]) -> ProtectedZone {
        ProtectedZone::new(id, id, zone_type, Polygon::rectangle(&BBox::from(bbox)))
    }

    fn square(bbox: [f64; 4]) -> Polygon {
        Polygon::rectangle(&BBox::from(bbox))
    }

    #[test]
    fn test_query_returns_zones_in_build_order() {
        let index = ZoneIndex::build(vec![
            zone("b", "WATER_BODY", [0.0, 0.0, 10.0, 10.0]),
            zone("a", "FOREST", [5.0, 5.0, 6.0, 6.0]),
            zone("c", "FOREST", [50.0, 50.0, 60.0, 60.0]),
        ]);
        let hits: Vec<&str> = index
            .intersecting_polygon(&square([5.5, 5.5, 7.0, 7.0]))
            .iter()
            .map(|z| z.id.as_str())
            .collect();
        assert_eq!(hits, vec!["b", "a"]);
    }

    #[test]
    fn test_touching_counts() {
        let index = ZoneIndex::build(vec![zone("z", "FOREST", [0.0, 0.0, 1.0, 1.0])]);
        assert_eq!(index.intersecting_polygon(&square([1.0, 0.0, 2.0, 1.0])).len(), 1);
        assert!(index.intersecting_polygon(&square([1.1, 0.0, 2.0, 1.0])).is_empty());
    }

    #[test]
    fn test_many_zones_match_brute_force() {
        let zones: Vec<ProtectedZone> = (0..100)
            .map(|i| {
                let x = (i % 10) as f64 * 3.0;
                let y = (i / 10) as f64 * 3.0;
                zone(&format!("z{i}"), "FOREST", [x, y, x + 2.0, y + 2.0])
            })
            .collect();
        let index = ZoneIndex::build(zones.clone());
        let query = square([4.5, 4.5, 10.0, 7.5]);
        let expected: Vec<String> = zones
            .iter()
            .filter(|z| Geometry::MultiPolygon(z.geometry.clone()).intersects_polygon(&query))
            .map(|z| z.id.clone())
            .collect();
        let got: Vec<String> = index
            .intersecting_polygon(&query)
            .iter()
            .map(|z| z.id.clone())
            .collect();
        assert_eq!(got, expected);
        assert!(!got.is_empty());
    }

    #[test]
    fn test_empty_index() {
        let index = ZoneIndex::empty();
        assert!(index.intersecting_polygon(&square([0.0, 0.0, 1.0, 1.0])).is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_survives_refresh() {
        let repo = MemoryZoneRepository::new(vec![zone("old", "FOREST", [0.0, 0.0, 1.0, 1.0])]);
        let handle = ZoneIndexHandle::default();
        assert_eq!(handle.refresh(&repo).await.unwrap(), 1);
        let before = handle.snapshot();

        repo.replace(vec![]);
        assert_eq!(handle.refresh(&repo).await.unwrap(), 0);

        assert_eq!(before.len(), 1);
        assert!(handle.snapshot().is_empty());
    }
}
