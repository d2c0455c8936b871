// THEORY:
// The `cluster_engine` groups the candidate locations of one frame into at most
// `MAX_CLUSTERS` insect candidates. It is a stateless utility: every call starts from
// the location list alone and keeps nothing for the next frame.
//
// The algorithm runs in three phases:
// 1.  **Proximity Labeling (Phase A)**: Every location gets its own label `1..=N`.
//     Then, for every ordered pair `(i, j)` with `i != j`, if the two locations are
//     closer than `dist` on both axes, `j` takes `i`'s *current* label. This is one
//     left-to-right sweep, not a connected-components pass: points linked only
//     through a chain can keep different labels, and the result depends on scan
//     order. `LabelingMode::Transitive` swaps in a union-find closure for callers
//     that want true connected components.
// 2.  **First Merge (Phase B)**: Labels are remapped to dense indices in first-seen
//     order, and each cluster gets an integer mass center and a bounding box. Then,
//     in index order, each unmerged cluster absorbs every later unmerged cluster
//     whose mass center is closer than `clus_var` on both axes.
// 3.  **Second Merge (Phase C)**: The Phase B groups are merged again, this time when
//     the Manhattan distance between mass centers is below `clus_var2`.
//
// Both merges combine clusters the same way: the new mass center is the unweighted
// integer average of the absorbed centers (a two-pixel speck counts as much as a
// two-hundred-pixel body) and the new box is the union of the absorbed boxes. A merge
// pass stores at most `MAX_CLUSTERS` groups; any further groups are counted and
// dropped.

use crate::core_modules::cluster::{BoundingBox, Cluster, ClusterSet, MAX_CLUSTERS};
use crate::core_modules::location_extractor::Location;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_DIST: u16 = 8;
pub const DEFAULT_CLUS_VAR: u16 = 50;
pub const DEFAULT_CLUS_VAR2: u16 = 75;

/// How Phase A propagates labels between nearby locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelingMode {
    /// One ordered sweep over all pairs; order-dependent, not transitive.
    #[default]
    SinglePass,
    /// Union-find closure: every chain of nearby locations shares one label.
    Transitive,
}

/// Distance thresholds for the three phases, all in mask pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Phase A: per-axis distance below which two locations share a label.
    pub dist: u16,
    /// Phase B: per-axis mass-center distance below which clusters merge.
    pub clus_var: u16,
    /// Phase C: Manhattan mass-center distance below which groups merge.
    pub clus_var2: u16,
    #[serde(default)]
    pub labeling: LabelingMode,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            dist: DEFAULT_DIST,
            clus_var: DEFAULT_CLUS_VAR,
            clus_var2: DEFAULT_CLUS_VAR2,
            labeling: LabelingMode::SinglePass,
        }
    }
}

/// Everything one clustering run produced, intermediate stages included.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusterOutcome {
    /// Number of distinct clusters after Phase A labeling.
    pub initial_count: usize,
    /// Phase B groups (the "grouped clusters").
    pub grouped: ClusterSet,
    /// Phase B groups that did not fit in `grouped`.
    pub dropped_groups: usize,
    /// Phase C output (the "final clusters").
    pub clusters: ClusterSet,
}

/// Runs all three phases over `locations`.
pub fn detect_clusters(locations: &[Location], params: &ClusterParams) -> ClusterOutcome {
    if locations.is_empty() {
        return ClusterOutcome::default();
    }

    // --- Phase A: proximity labeling ---
    let labels = match params.labeling {
        LabelingMode::SinglePass => label_single_pass(locations, params.dist),
        LabelingMode::Transitive => label_transitive(locations, params.dist),
    };

    // --- Phase B: dense remap, mass centers, first merge ---
    let initial = build_initial_clusters(locations, &labels);
    let clus_var = params.clus_var as u32;
    let (grouped, dropped_groups) = merge_pass(&initial, |seed, other| {
        axis_distance(seed.mass_center.row, other.mass_center.row) < clus_var
            && axis_distance(seed.mass_center.col, other.mass_center.col) < clus_var
    });
    if dropped_groups > 0 {
        warn!(
            kept = grouped.len(),
            dropped = dropped_groups,
            "more cluster groups than capacity, extras dropped"
        );
    }

    // --- Phase C: second merge by Manhattan distance ---
    let grouped_slice: Vec<Cluster> = grouped.iter().copied().collect();
    let clus_var2 = params.clus_var2 as u32;
    let (clusters, _) = merge_pass(&grouped_slice, |seed, other| {
        axis_distance(seed.mass_center.row, other.mass_center.row)
            + axis_distance(seed.mass_center.col, other.mass_center.col)
            < clus_var2
    });

    debug!(
        locations = locations.len(),
        initial = initial.len(),
        grouped = grouped.len(),
        final_clusters = clusters.len(),
        "clustering complete"
    );

    ClusterOutcome {
        initial_count: initial.len(),
        grouped,
        dropped_groups,
        clusters,
    }
}

#[inline]
fn axis_distance(a: u16, b: u16) -> u32 {
    (a as i32 - b as i32).unsigned_abs()
}

#[inline]
fn within(a: &Location, b: &Location, dist: u32) -> bool {
    axis_distance(a.row, b.row) < dist && axis_distance(a.col, b.col) < dist
}

/// Phase A exactly as the detector has always run it: one ordered sweep.
fn label_single_pass(locations: &[Location], dist: u16) -> Vec<usize> {
    let dist = dist as u32;
    let mut labels: Vec<usize> = (1..=locations.len()).collect();
    for i in 0..locations.len() {
        for j in 0..locations.len() {
            if i != j && within(&locations[i], &locations[j], dist) {
                labels[j] = labels[i];
            }
        }
    }
    labels
}

/// Phase A as a union-find closure over the same proximity relation.
fn label_transitive(locations: &[Location], dist: u16) -> Vec<usize> {
    let dist = dist as u32;
    let mut parents: Vec<usize> = (0..locations.len()).collect();
    for i in 0..locations.len() {
        for j in (i + 1)..locations.len() {
            if within(&locations[i], &locations[j], dist) {
                union_labels(&mut parents, i, j);
            }
        }
    }
    (0..locations.len())
        .map(|i| find_root(&mut parents, i) + 1)
        .collect()
}

fn find_root(parents: &mut [usize], label: usize) -> usize {
    let mut current = label;
    while current != parents[current] {
        // Path halving.
        parents[current] = parents[parents[current]];
        current = parents[current];
    }
    current
}

fn union_labels(parents: &mut [usize], a: usize, b: usize) {
    let root_a = find_root(parents, a);
    let root_b = find_root(parents, b);
    if root_a < root_b {
        parents[root_b] = root_a;
    } else if root_b < root_a {
        parents[root_a] = root_b;
    }
}

/// Remaps labels to dense indices in first-seen order and aggregates each cluster.
fn build_initial_clusters(locations: &[Location], labels: &[usize]) -> Vec<Cluster> {
    // Labels are always in 1..=N.
    let mut dense_of_label: Vec<Option<usize>> = vec![None; locations.len() + 1];
    let mut sums: Vec<(u64, u64, usize, BoundingBox)> = Vec::new();

    for (location, &label) in locations.iter().zip(labels) {
        let dense = match dense_of_label[label] {
            Some(dense) => dense,
            None => {
                let dense = sums.len();
                dense_of_label[label] = Some(dense);
                sums.push((0, 0, 0, BoundingBox::from_point(*location)));
                dense
            }
        };
        let entry = &mut sums[dense];
        entry.0 += location.row as u64;
        entry.1 += location.col as u64;
        entry.2 += 1;
        entry.3 = entry.3.include(*location);
    }

    sums.into_iter()
        .enumerate()
        .map(|(index, (sum_row, sum_col, count, bounding_box))| Cluster {
            index,
            mass_center: Location::new(
                (sum_row / count as u64) as u16,
                (sum_col / count as u64) as u16,
            ),
            member_count: count,
            bounding_box,
        })
        .collect()
}

/// Greedy seed-and-absorb merge shared by Phase B and Phase C.
///
/// Returns the merged groups (at most `MAX_CLUSTERS`) and how many further groups
/// were formed but did not fit.
fn merge_pass(
    clusters: &[Cluster],
    is_close: impl Fn(&Cluster, &Cluster) -> bool,
) -> (ClusterSet, usize) {
    let mut used = vec![false; clusters.len()];
    let mut merged = ClusterSet::new();
    let mut dropped = 0;
    let mut members: Vec<usize> = Vec::with_capacity(clusters.len());

    for seed in 0..clusters.len() {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        members.clear();
        members.push(seed);
        for other in (seed + 1)..clusters.len() {
            if !used[other] && is_close(&clusters[seed], &clusters[other]) {
                used[other] = true;
                members.push(other);
            }
        }

        let group = combine(merged.len(), clusters, &members);
        if merged.push(group).is_err() {
            dropped += 1;
        }
    }

    debug_assert!(merged.len() <= MAX_CLUSTERS);
    (merged, dropped)
}

/// Unweighted center average plus box union of `clusters[members]`.
fn combine(index: usize, clusters: &[Cluster], members: &[usize]) -> Cluster {
    let first = clusters[members[0]];
    let mut sum_row = 0u64;
    let mut sum_col = 0u64;
    let mut member_count = 0;
    let mut bounding_box = first.bounding_box;
    for &member in members {
        let cluster = &clusters[member];
        sum_row += cluster.mass_center.row as u64;
        sum_col += cluster.mass_center.col as u64;
        member_count += cluster.member_count;
        bounding_box = bounding_box.union(cluster.bounding_box);
    }
    let k = members.len() as u64;
    Cluster {
        index,
        mass_center: Location::new((sum_row / k) as u16, (sum_col / k) as u16),
        member_count,
        bounding_box,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(top: u16, left: u16, side: u16) -> Vec<Location> {
        let mut points = Vec::new();
        for row in top..top + side {
            for col in left..left + side {
                points.push(Location::new(row, col));
            }
        }
        points
    }

    #[test]
    fn no_locations_no_clusters() {
        let outcome = detect_clusters(&[], &ClusterParams::default());
        assert!(outcome.clusters.is_empty());
        assert_eq!(outcome.initial_count, 0);
    }

    #[test]
    fn single_point_is_its_own_cluster() {
        let point = Location::new(12, 30);
        let outcome = detect_clusters(&[point], &ClusterParams::default());
        let cluster = outcome.clusters.get(0).expect("one cluster");
        assert_eq!(outcome.clusters.len(), 1);
        assert_eq!(cluster.mass_center, point);
        assert_eq!(cluster.bounding_box, BoundingBox::from_point(point));
        assert_eq!(cluster.member_count, 1);
    }

    #[test]
    fn single_pass_is_not_transitive() {
        // Chain (0,0)-(0,2)-(0,4)-(0,6) with dist 3, scanned out of order.
        let points = [
            Location::new(0, 4),
            Location::new(0, 6),
            Location::new(0, 0),
            Location::new(0, 2),
        ];
        let labels = label_single_pass(&points, 3);
        // (0,6) took label 1 from (0,4) before (0,4) was relabeled to 3.
        assert_eq!(labels, vec![3, 1, 3, 3]);

        let closed = label_transitive(&points, 3);
        assert!(closed.iter().all(|&label| label == closed[0]));
    }

    #[test]
    fn transitive_labeling_joins_chains() {
        let points = [
            Location::new(0, 0),
            Location::new(0, 20),
            Location::new(0, 2),
            Location::new(0, 4),
        ];
        let labels = label_transitive(&points, 3);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[1]);
    }

    #[test]
    fn dense_remap_keeps_first_seen_order() {
        let points = [
            Location::new(10, 10),
            Location::new(90, 90),
            Location::new(11, 11),
        ];
        let clusters = build_initial_clusters(&points, &[3, 2, 3]);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].mass_center, Location::new(10, 10));
        assert_eq!(clusters[0].member_count, 2);
        assert_eq!(clusters[0].bounding_box, BoundingBox::new(10, 11, 10, 11));
        assert_eq!(clusters[1].mass_center, Location::new(90, 90));
    }

    #[test]
    fn first_merge_uses_unweighted_center_average() {
        // A 3x3 blob and a lone point 20 apart: separate after Phase A, merged in B.
        let mut points = square(0, 0, 3);
        points.push(Location::new(21, 21));
        let outcome = detect_clusters(&points, &ClusterParams::default());
        assert_eq!(outcome.initial_count, 2);
        assert_eq!(outcome.grouped.len(), 1);
        let merged = outcome.clusters.get(0).expect("merged");
        // Centers (1,1) and (21,21) average to (11,11) regardless of member counts.
        assert_eq!(merged.mass_center, Location::new(11, 11));
        assert_eq!(merged.member_count, 10);
        assert_eq!(merged.bounding_box, BoundingBox::new(0, 21, 0, 21));
    }

    #[test]
    fn second_merge_uses_manhattan_distance() {
        // Centers 60 apart on rows and 10 on cols: not merged in B (60 >= 50) but
        // merged in C (60 + 10 < 75).
        let points = [Location::new(0, 0), Location::new(60, 10)];
        let outcome = detect_clusters(&points, &ClusterParams::default());
        assert_eq!(outcome.grouped.len(), 2);
        assert_eq!(outcome.clusters.len(), 1);
        let merged = outcome.clusters.get(0).unwrap();
        assert_eq!(merged.mass_center, Location::new(30, 5));
        assert_eq!(merged.bounding_box, BoundingBox::new(0, 60, 0, 10));
    }

    #[test]
    fn groups_beyond_capacity_are_dropped() {
        let points: Vec<Location> = (0..7).map(|i| Location::new(i * 100, i * 100)).collect();
        let outcome = detect_clusters(&points, &ClusterParams::default());
        assert_eq!(outcome.initial_count, 7);
        assert_eq!(outcome.grouped.len(), MAX_CLUSTERS);
        assert_eq!(outcome.dropped_groups, 2);
        assert_eq!(outcome.clusters.len(), MAX_CLUSTERS);
        let rows: Vec<u16> = outcome.clusters.iter().map(|c| c.mass_center.row).collect();
        assert_eq!(rows, vec![0, 100, 200, 300, 400]);
    }

    #[test]
    fn clustering_is_deterministic() {
        let mut points = square(5, 5, 4);
        points.extend(square(40, 70, 5));
        points.extend(square(200, 10, 3));
        let params = ClusterParams::default();
        assert_eq!(detect_clusters(&points, &params), detect_clusters(&points, &params));
    }
}
