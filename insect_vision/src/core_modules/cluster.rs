// THEORY:
// The `cluster` module holds the data containers produced by the clustering engine.
// Like the blob containers of a frame-level detector, these are "dumb" summaries:
// a `Cluster` is one candidate insect in mask space, described by its integer mass
// center, how many locations fed it, and the axis-aligned box around them.
//
// The engine's output is a `ClusterSet`: a fixed array of `Option<Cluster>` slots
// plus a count. An empty slot is `None`, never a zeroed cluster, so a genuine cluster
// at mask coordinate (0, 0) is never mistaken for an unused entry. A zero-padded
// array view is still offered for diagnostic displays that expect it.

use crate::core_modules::location_extractor::Location;
use serde::{Deserialize, Serialize};

/// Fixed number of final clusters a detection cycle can report.
pub const MAX_CLUSTERS: usize = 5;

/// An axis-aligned box in mask space. Invariant: `min <= max` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_row: u16,
    pub max_row: u16,
    pub min_col: u16,
    pub max_col: u16,
}

impl BoundingBox {
    /// Builds a box, ordering each axis so the invariant always holds.
    pub fn new(min_row: u16, max_row: u16, min_col: u16, max_col: u16) -> Self {
        Self {
            min_row: min_row.min(max_row),
            max_row: min_row.max(max_row),
            min_col: min_col.min(max_col),
            max_col: min_col.max(max_col),
        }
    }

    pub fn from_point(point: Location) -> Self {
        Self {
            min_row: point.row,
            max_row: point.row,
            min_col: point.col,
            max_col: point.col,
        }
    }

    /// The smallest box containing both `self` and `point`.
    pub fn include(self, point: Location) -> Self {
        Self {
            min_row: self.min_row.min(point.row),
            max_row: self.max_row.max(point.row),
            min_col: self.min_col.min(point.col),
            max_col: self.max_col.max(point.col),
        }
    }

    /// The smallest box containing both boxes.
    pub fn union(self, other: BoundingBox) -> Self {
        Self {
            min_row: self.min_row.min(other.min_row),
            max_row: self.max_row.max(other.max_row),
            min_col: self.min_col.min(other.min_col),
            max_col: self.max_col.max(other.max_col),
        }
    }

    pub fn height_span(&self) -> u16 {
        self.max_row - self.min_row
    }

    pub fn width_span(&self) -> u16 {
        self.max_col - self.min_col
    }
}

/// One group of locations in mask space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// Dense index assigned when the cluster was formed; not stable across phases.
    pub index: usize,
    /// Integer (truncating) average position. For merged clusters this is the
    /// unweighted average of the merged centers, not a per-pixel average.
    pub mass_center: Location,
    /// Number of locations that ended up in this cluster.
    pub member_count: usize,
    pub bounding_box: BoundingBox,
}

impl Cluster {
    /// A cluster made of a single location.
    pub fn from_point(index: usize, point: Location) -> Self {
        Self {
            index,
            mass_center: point,
            member_count: 1,
            bounding_box: BoundingBox::from_point(point),
        }
    }
}

/// A bounded, ordered set of clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterSet {
    slots: [Option<Cluster>; MAX_CLUSTERS],
    len: usize,
}

impl ClusterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `cluster`, handing it back when every slot is taken.
    pub fn push(&mut self, cluster: Cluster) -> Result<(), Cluster> {
        if self.len == MAX_CLUSTERS {
            return Err(cluster);
        }
        self.slots[self.len] = Some(cluster);
        self.len += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == MAX_CLUSTERS
    }

    pub fn get(&self, index: usize) -> Option<&Cluster> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.slots.iter().flatten()
    }

    pub fn slots(&self) -> &[Option<Cluster>; MAX_CLUSTERS] {
        &self.slots
    }

    /// Zero-padded `[row, col]` centers and `[min_row, max_row, min_col, max_col]`
    /// boxes, with unused slots all zero.
    pub fn to_sentinel_arrays(&self) -> ([[i32; 2]; MAX_CLUSTERS], [[i32; 4]; MAX_CLUSTERS]) {
        let mut centers = [[0i32; 2]; MAX_CLUSTERS];
        let mut boxes = [[0i32; 4]; MAX_CLUSTERS];
        for (i, cluster) in self.iter().enumerate() {
            centers[i] = [cluster.mass_center.row as i32, cluster.mass_center.col as i32];
            let b = cluster.bounding_box;
            boxes[i] = [
                b.min_row as i32,
                b.max_row as i32,
                b.min_col as i32,
                b.max_col as i32,
            ];
        }
        (centers, boxes)
    }
}

impl<'a> IntoIterator for &'a ClusterSet {
    type Item = &'a Cluster;
    type IntoIter = std::iter::Flatten<std::slice::Iter<'a, Option<Cluster>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_constructor_orders_axes() {
        let b = BoundingBox::new(9, 2, 20, 10);
        assert_eq!((b.min_row, b.max_row, b.min_col, b.max_col), (2, 9, 10, 20));
        assert_eq!((b.height_span(), b.width_span()), (7, 10));
    }

    #[test]
    fn union_covers_both_boxes() {
        let a = BoundingBox::new(0, 4, 10, 12);
        let b = BoundingBox::new(3, 8, 2, 11);
        assert_eq!(a.union(b), BoundingBox::new(0, 8, 2, 12));
    }

    #[test]
    fn set_rejects_sixth_cluster() {
        let mut set = ClusterSet::new();
        for i in 0..MAX_CLUSTERS {
            set.push(Cluster::from_point(i, Location::new(i as u16, 0))).unwrap();
        }
        assert!(set.is_full());
        assert!(set.push(Cluster::from_point(5, Location::new(9, 9))).is_err());
        assert_eq!(set.iter().count(), MAX_CLUSTERS);
    }

    #[test]
    fn origin_cluster_is_not_an_empty_slot() {
        let mut set = ClusterSet::new();
        set.push(Cluster::from_point(0, Location::new(0, 0))).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.get(0).is_some());
        assert!(set.get(1).is_none());
        let (centers, boxes) = set.to_sentinel_arrays();
        assert_eq!(centers, [[0; 2]; MAX_CLUSTERS]);
        assert_eq!(boxes, [[0; 4]; MAX_CLUSTERS]);
    }
}
