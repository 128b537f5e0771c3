use crate::math::{is_finite, point_in_range, Point3d};
use crate::SegmentId;
use itertools::iproduct;
use smallvec::SmallVec;
use std::collections::HashMap;

type Cell = [i64; 3];

/// Finds segments by one of their end points in constant time.
///
/// Points are bucketed into cubic cells as wide as the tolerance,
/// so every match lies in the query point's cell or one of its neighbours.
#[derive(Clone, Debug)]
pub(crate) struct PointIndex {
    tolerance: f64,
    cells: HashMap<Cell, SmallVec<[(Point3d, SegmentId); 4]>>,
}

impl PointIndex {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            cells: HashMap::new(),
        }
    }

    fn cell(&self, point: Point3d) -> Cell {
        [point.x, point.y, point.z].map(|c| (c / self.tolerance).floor() as i64)
    }

    /// Adds a point. Non-finite points are never indexed.
    pub fn insert(&mut self, point: Point3d, id: SegmentId) {
        if is_finite(point) {
            let cell = self.cell(point);
            self.cells.entry(cell).or_default().push((point, id));
        }
    }

    /// The segments whose point lies within the tolerance of `point`,
    /// in insertion order within each cell.
    pub fn find(&self, point: Point3d) -> SmallVec<[SegmentId; 4]> {
        let mut found = SmallVec::new();
        if !is_finite(point) {
            return found;
        }
        let [x, y, z] = self.cell(point);
        for (dx, dy, dz) in iproduct!(-1..=1, -1..=1, -1..=1) {
            let Some(entries) = self.cells.get(&[x + dx, y + dy, z + dz]) else {
                continue;
            };
            found.extend(
                entries
                    .iter()
                    .filter(|(p, _)| point_in_range(*p, point, self.tolerance))
                    .map(|(_, id)| *id),
            );
        }
        found.sort();
        found
    }
}
