//! Density-based clustering and largest-cluster selection.
//!
//! A point is a *core point* when at least `min_points` other points lie
//! within `eps` of it (inclusive). Core points within `eps` of each other
//! belong to the same cluster. A non-core point within `eps` of a core
//! point is a *border point* and joins the cluster of its lowest-index
//! core neighbour; it does not link clusters together. Everything else is
//! noise ([`NOISE`]).
//!
//! Cluster membership depends only on the input ordering, never on the
//! kd-tree layout. Labels are numbered by the lowest-index core point of
//! each cluster, but callers should only rely on membership and size.

use std::collections::VecDeque;

use rayon::prelude::*;
use tracing::debug;

use crate::error::{CleanError, CleanResult};
use crate::filter::{FilterOutcome, PointFilter, outcome_from_mask};
use crate::spatial::SpatialIndex;
use crate::types::PointSet;

/// Label given to points that belong to no cluster.
pub const NOISE: i32 = -1;

/// Per-point cluster labels parallel to a point set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterLabeling {
    labels: Vec<i32>,
    cluster_count: usize,
}

impl ClusterLabeling {
    #[inline]
    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    /// Number of non-noise clusters.
    #[inline]
    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// Number of points labelled noise.
    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == NOISE).count()
    }

    /// Point count per cluster label.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0usize; self.cluster_count];
        for &label in &self.labels {
            if label >= 0 {
                sizes[label as usize] += 1;
            }
        }
        sizes
    }

    /// The label with the most points and its size; ties go to the lowest label.
    pub fn largest(&self) -> Option<(i32, usize)> {
        self.sizes()
            .into_iter()
            .enumerate()
            .fold(None, |best, (label, size)| match best {
                Some((_, best_size)) if best_size >= size => best,
                _ => Some((label as i32, size)),
            })
    }

    /// Keep-mask selecting the members of `label`.
    pub fn mask(&self, label: i32) -> Vec<bool> {
        self.labels.iter().map(|&l| l == label).collect()
    }
}

/// DBSCAN-style labeler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityClusterer {
    eps: f64,
    min_points: usize,
}

impl DensityClusterer {
    /// Create a clusterer. Requires a finite `eps > 0` and `min_points >= 1`.
    pub fn new(eps: f64, min_points: usize) -> CleanResult<Self> {
        if !(eps.is_finite() && eps > 0.0) {
            return Err(CleanError::invalid_parameter(
                "eps",
                eps,
                "must be a finite value > 0",
            ));
        }
        if min_points < 1 {
            return Err(CleanError::invalid_parameter(
                "min_points",
                min_points,
                "must be >= 1",
            ));
        }
        Ok(Self { eps, min_points })
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    pub fn min_points(&self) -> usize {
        self.min_points
    }

    /// Label every point in `points`.
    pub fn label(&self, points: &PointSet) -> ClusterLabeling {
        let index = SpatialIndex::build(points.coords());
        self.label_indexed(&index)
    }

    /// Label every point of a prebuilt index.
    pub fn label_indexed(&self, index: &SpatialIndex) -> ClusterLabeling {
        let n = index.len();
        let is_core: Vec<bool> = (0..n)
            .into_par_iter()
            .map(|i| index.within_excluding(i, self.eps).len() >= self.min_points)
            .collect();

        let mut labels = vec![NOISE; n];
        let mut next_label: i32 = 0;
        let mut queue = VecDeque::new();

        // Core points: connected components in index order
        for seed in 0..n {
            if !is_core[seed] || labels[seed] != NOISE {
                continue;
            }
            labels[seed] = next_label;
            queue.push_back(seed);
            while let Some(p) = queue.pop_front() {
                for neighbor in index.within_excluding(p, self.eps) {
                    let q = neighbor.index;
                    if is_core[q] && labels[q] == NOISE {
                        labels[q] = next_label;
                        queue.push_back(q);
                    }
                }
            }
            next_label += 1;
        }

        // Border points: join the lowest-index core neighbour
        let border: Vec<(usize, i32)> = (0..n)
            .into_par_iter()
            .filter(|&i| !is_core[i])
            .filter_map(|i| {
                index
                    .within_excluding(i, self.eps)
                    .iter()
                    .filter(|nb| is_core[nb.index])
                    .map(|nb| nb.index)
                    .min()
                    .map(|core| (i, labels[core]))
            })
            .collect();
        for (i, label) in border {
            labels[i] = label;
        }

        ClusterLabeling {
            labels,
            cluster_count: next_label as usize,
        }
    }
}

/// Keeps only the largest density cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LargestClusterFilter {
    clusterer: DensityClusterer,
}

impl LargestClusterFilter {
    pub fn new(eps: f64, min_points: usize) -> CleanResult<Self> {
        Ok(Self {
            clusterer: DensityClusterer::new(eps, min_points)?,
        })
    }

    pub fn clusterer(&self) -> &DensityClusterer {
        &self.clusterer
    }
}

impl PointFilter for LargestClusterFilter {
    fn name(&self) -> &'static str {
        "largest cluster"
    }

    fn apply(&self, points: &PointSet) -> FilterOutcome {
        let labeling = self.clusterer.label(points);
        let Some((label, size)) = labeling.largest() else {
            return FilterOutcome::NoOp("no clusters detected".to_string());
        };

        debug!(
            target: "splat_clean::step",
            eps = self.clusterer.eps,
            min_points = self.clusterer.min_points,
            clusters = labeling.cluster_count(),
            noise = labeling.noise_count(),
            largest = size,
            "Density clustering finished"
        );

        // A cluster always has a member, so the reject branch is unreachable
        outcome_from_mask(points, &labeling.mask(label), || {
            "largest cluster is empty".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn block(origin: Point3<f64>, nx: usize, ny: usize, nz: usize, spacing: f64) -> Vec<Point3<f64>> {
        let mut points = Vec::with_capacity(nx * ny * nz);
        for i in 0..nx {
            for j in 0..ny {
                for k in 0..nz {
                    points.push(Point3::new(
                        origin.x + i as f64 * spacing,
                        origin.y + j as f64 * spacing,
                        origin.z + k as f64 * spacing,
                    ));
                }
            }
        }
        points
    }

    fn two_blobs_with_noise() -> PointSet {
        let mut coords = block(Point3::origin(), 10, 10, 10, 0.1);
        coords.extend(block(Point3::new(10.0, 0.0, 0.0), 5, 5, 8, 0.1));
        for i in 0..50 {
            coords.push(Point3::new(
                -40.0 + (i % 10) as f64 * 8.0,
                20.0 + (i / 10) as f64 * 8.0,
                -15.0,
            ));
        }
        PointSet::from_coordinates(coords)
    }

    #[test]
    fn test_labels_two_blobs() {
        let set = two_blobs_with_noise();
        let labeling = DensityClusterer::new(0.25, 5).unwrap().label(&set);

        assert_eq!(labeling.cluster_count(), 2);
        assert_eq!(labeling.noise_count(), 50);
        let mut sizes = labeling.sizes();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![200, 1000]);
    }

    #[test]
    fn test_largest_cluster_keeps_big_blob() {
        let set = two_blobs_with_noise();
        let filter = LargestClusterFilter::new(0.25, 5).unwrap();
        match filter.apply(&set) {
            FilterOutcome::Applied(kept) => {
                assert_eq!(kept.len(), 1000);
                assert_eq!(kept.indices(), (0..1000).collect::<Vec<_>>().as_slice());
            }
            other => panic!("expected applied, got {other:?}"),
        }
    }

    #[test]
    fn test_all_noise_is_noop() {
        let set = PointSet::from_coordinates(block(Point3::origin(), 4, 4, 1, 5.0));
        let filter = LargestClusterFilter::new(1.0, 3).unwrap();
        assert_eq!(
            filter.apply(&set),
            FilterOutcome::NoOp("no clusters detected".to_string())
        );
    }

    #[test]
    fn test_border_point_does_not_bridge() {
        // Two core chains joined only through a non-core point
        let coords = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
            Point3::new(0.2, 0.0, 0.0),
            Point3::new(0.3, 0.0, 0.0),
            Point3::new(0.75, 0.0, 0.0), // border, 0.45 from both chains
            Point3::new(1.2, 0.0, 0.0),
            Point3::new(1.3, 0.0, 0.0),
            Point3::new(1.4, 0.0, 0.0),
            Point3::new(1.5, 0.0, 0.0),
        ];
        let set = PointSet::from_coordinates(coords);
        let labeling = DensityClusterer::new(0.5, 3).unwrap().label(&set);

        assert_eq!(labeling.cluster_count(), 2);
        let labels = labeling.labels();
        assert_ne!(labels[0], labels[8]);
        // Lowest-index core neighbour of the border point is point 3
        assert_eq!(labels[4], labels[3]);
        assert_eq!(labeling.noise_count(), 0);
    }

    #[test]
    fn test_largest_tie_prefers_lowest_label() {
        let labeling = ClusterLabeling {
            labels: vec![0, 1, 1, 0, NOISE],
            cluster_count: 2,
        };
        assert_eq!(labeling.largest(), Some((0, 2)));

        let empty = ClusterLabeling {
            labels: vec![NOISE; 3],
            cluster_count: 0,
        };
        assert_eq!(empty.largest(), None);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(DensityClusterer::new(0.0, 5).is_err());
        assert!(DensityClusterer::new(1.0, 0).is_err());
        assert!(LargestClusterFilter::new(f64::INFINITY, 5).is_err());
    }
}
