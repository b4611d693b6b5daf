//! Radius and statistical outlier removal.
//!
//! Both filters count neighbours *other* than the point being tested.
//!
//! # Radius outlier removal
//!
//! A point survives when at least `nb_points` other points lie strictly
//! within `radius` of it.
//!
//! # Statistical outlier removal
//!
//! For each point:
//! 1. Find its `nb_neighbors` nearest neighbours (fewer when the cloud is small)
//! 2. Compute the mean distance to those neighbours
//! 3. Compute the global mean and population standard deviation of the means
//! 4. Keep points whose mean distance is `<= global_mean + std_ratio * std_dev`

use rayon::prelude::*;
use tracing::debug;

use crate::error::{CleanError, CleanResult};
use crate::filter::{FilterOutcome, PointFilter, outcome_from_mask};
use crate::spatial::SpatialIndex;
use crate::types::PointSet;

/// Drops points with too few neighbours inside a fixed radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusOutlierFilter {
    nb_points: usize,
    radius: f64,
}

impl RadiusOutlierFilter {
    /// Create the filter. Requires `nb_points >= 1` and a finite `radius > 0`.
    pub fn new(nb_points: usize, radius: f64) -> CleanResult<Self> {
        if nb_points < 1 {
            return Err(CleanError::invalid_parameter(
                "nb_points",
                nb_points,
                "must be >= 1",
            ));
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(CleanError::invalid_parameter(
                "radius",
                radius,
                "must be a finite value > 0",
            ));
        }
        Ok(Self { nb_points, radius })
    }

    pub fn nb_points(&self) -> usize {
        self.nb_points
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Per-point keep mask against a prebuilt index.
    pub fn keep_mask(&self, index: &SpatialIndex) -> Vec<bool> {
        (0..index.len())
            .into_par_iter()
            .map(|i| index.count_strictly_within_excluding(i, self.radius) >= self.nb_points)
            .collect()
    }
}

impl PointFilter for RadiusOutlierFilter {
    fn name(&self) -> &'static str {
        "radius outlier removal"
    }

    fn apply(&self, points: &PointSet) -> FilterOutcome {
        if points.is_empty() {
            return FilterOutcome::NoOp("empty input".to_string());
        }
        let index = SpatialIndex::build(points.coords());
        let keep = self.keep_mask(&index);

        debug!(
            target: "splat_clean::step",
            nb_points = self.nb_points,
            radius = self.radius,
            kept = keep.iter().filter(|k| **k).count(),
            total = points.len(),
            "Radius outlier mask computed"
        );

        outcome_from_mask(points, &keep, || {
            format!(
                "radius outlier removal (nb_points={}, radius={}) would remove every point; \
                 increase radius or reduce nb_points",
                self.nb_points, self.radius
            )
        })
    }
}

/// Drops points whose mean neighbour distance is far above the cloud's average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticalOutlierFilter {
    nb_neighbors: usize,
    std_ratio: f64,
}

impl StatisticalOutlierFilter {
    /// Create the filter. Requires `nb_neighbors >= 2` and a finite `std_ratio > 0`.
    pub fn new(nb_neighbors: usize, std_ratio: f64) -> CleanResult<Self> {
        if nb_neighbors < 2 {
            return Err(CleanError::invalid_parameter(
                "nb_neighbors",
                nb_neighbors,
                "must be >= 2",
            ));
        }
        if !(std_ratio.is_finite() && std_ratio > 0.0) {
            return Err(CleanError::invalid_parameter(
                "std_ratio",
                std_ratio,
                "must be a finite value > 0",
            ));
        }
        Ok(Self {
            nb_neighbors,
            std_ratio,
        })
    }

    pub fn nb_neighbors(&self) -> usize {
        self.nb_neighbors
    }

    pub fn std_ratio(&self) -> f64 {
        self.std_ratio
    }

    /// Mean distance from each point to its nearest neighbours.
    pub fn mean_distances(&self, index: &SpatialIndex) -> Vec<f64> {
        (0..index.len())
            .into_par_iter()
            .map(|i| {
                let neighbors = index.k_nearest_excluding(i, self.nb_neighbors);
                if neighbors.is_empty() {
                    return 0.0;
                }
                let sum: f64 = neighbors.iter().map(|n| n.distance()).sum();
                sum / neighbors.len() as f64
            })
            .collect()
    }
}

/// Global mean, population standard deviation and the keep threshold.
pub(crate) fn distance_threshold(mean_distances: &[f64], std_ratio: f64) -> (f64, f64, f64) {
    let n = mean_distances.len() as f64;
    let global_mean = mean_distances.iter().sum::<f64>() / n;
    let variance = mean_distances
        .iter()
        .map(|d| (d - global_mean).powi(2))
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();
    (global_mean, std_dev, std_ratio.mul_add(std_dev, global_mean))
}

impl PointFilter for StatisticalOutlierFilter {
    fn name(&self) -> &'static str {
        "statistical outlier removal"
    }

    fn apply(&self, points: &PointSet) -> FilterOutcome {
        if points.len() < 2 {
            return FilterOutcome::NoOp("fewer than two points".to_string());
        }
        let index = SpatialIndex::build(points.coords());
        let mean_distances = self.mean_distances(&index);
        let (global_mean, std_dev, threshold) =
            distance_threshold(&mean_distances, self.std_ratio);

        debug!(
            target: "splat_clean::step",
            nb_neighbors = self.nb_neighbors,
            std_ratio = self.std_ratio,
            global_mean = format!("{:.6}", global_mean),
            std_dev = format!("{:.6}", std_dev),
            threshold = format!("{:.6}", threshold),
            "Statistical outlier threshold computed"
        );

        let keep: Vec<bool> = mean_distances.iter().map(|&d| d <= threshold).collect();
        outcome_from_mask(points, &keep, || {
            format!(
                "statistical outlier removal (nb_neighbors={}, std_ratio={}) would remove every point; \
                 increase std_ratio",
                self.nb_neighbors, self.std_ratio
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn grid(n: usize, spacing: f64) -> Vec<Point3<f64>> {
        let mut points = Vec::with_capacity(n * n * n);
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    points.push(Point3::new(
                        i as f64 * spacing,
                        j as f64 * spacing,
                        k as f64 * spacing,
                    ));
                }
            }
        }
        points
    }

    #[test]
    fn test_radius_removes_isolated_points() {
        // 100-point tight cluster (5 x 5 x 4, spacing 0.01)
        let mut coords: Vec<Point3<f64>> = grid(5, 0.01)
            .into_iter()
            .filter(|p| p.z < 0.035)
            .collect();
        assert_eq!(coords.len(), 100);

        let isolated = [
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(-10.0, 0.0, 0.0),
            Point3::new(0.0, 10.0, 0.0),
            Point3::new(0.0, -10.0, 0.0),
            Point3::new(0.0, 0.0, 10.0),
        ];
        coords.extend(isolated);
        let set = PointSet::from_coordinates(coords);

        let filter = RadiusOutlierFilter::new(3, 0.05).unwrap();
        match filter.apply(&set) {
            FilterOutcome::Applied(kept) => {
                assert_eq!(kept.len(), 100);
                assert_eq!(kept.indices(), (0..100).collect::<Vec<_>>().as_slice());
            }
            other => panic!("expected applied, got {other:?}"),
        }
    }

    #[test]
    fn test_radius_rejects_when_everything_goes() {
        let set = PointSet::from_coordinates(grid(3, 1.0));
        let filter = RadiusOutlierFilter::new(5, 0.1).unwrap();
        match filter.apply(&set) {
            FilterOutcome::Rejected(reason) => assert!(reason.contains("increase radius")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_radius_counts_strictly_inside() {
        // Two points exactly `radius` apart are not neighbours
        let set = PointSet::from_coordinates(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 0.0, 0.0),
        ]);
        let filter = RadiusOutlierFilter::new(2, 1.0).unwrap();
        match filter.apply(&set) {
            FilterOutcome::Applied(kept) => assert_eq!(kept.indices(), &[2]),
            other => panic!("expected applied, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(RadiusOutlierFilter::new(0, 1.0).is_err());
        assert!(RadiusOutlierFilter::new(3, 0.0).is_err());
        assert!(RadiusOutlierFilter::new(3, f64::NAN).is_err());
        assert!(StatisticalOutlierFilter::new(1, 1.0).is_err());
        assert!(StatisticalOutlierFilter::new(8, -1.0).is_err());
    }

    #[test]
    fn test_statistical_removes_injected_points() {
        let mut coords = grid(10, 1.0);
        let injected = [
            Point3::new(60.0, 60.0, 60.0),
            Point3::new(-50.0, 4.0, 4.0),
            Point3::new(4.0, -55.0, 30.0),
        ];
        coords.extend(injected);
        let set = PointSet::from_coordinates(coords);

        let filter = StatisticalOutlierFilter::new(8, 2.0).unwrap();
        match filter.apply(&set) {
            FilterOutcome::Applied(kept) => {
                assert_eq!(kept.len(), 1000);
                assert!(kept.indices().iter().all(|&i| i < 1000));
            }
            other => panic!("expected applied, got {other:?}"),
        }
    }

    #[test]
    fn test_statistical_uniform_cloud_is_noop() {
        // Every point on a regular line has the same neighbourhood except the ends,
        // which stay within one standard deviation
        let coords: Vec<Point3<f64>> = (0..5).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        let set = PointSet::from_coordinates(coords);
        let filter = StatisticalOutlierFilter::new(2, 3.0).unwrap();
        assert_eq!(filter.apply(&set).label(), "no-op");
    }

    #[test]
    fn test_distance_threshold_population_std() {
        let (mean, std, threshold) = distance_threshold(&[1.0, 3.0], 2.0);
        assert!((mean - 2.0).abs() < 1e-12);
        assert!((std - 1.0).abs() < 1e-12);
        assert!((threshold - 4.0).abs() < 1e-12);
    }
}
