//! Parameter suggestions from the nearest-neighbour spacing of a cloud.
//!
//! The advisor samples points without replacement, measures the distance
//! from each sampled point to its nearest other point, and scales the
//! median of those distances into a radius, an eps and a min-points value.
//! It never changes a configuration itself; [`ParameterSuggestion::apply_to`]
//! returns a new one.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::info;

use crate::config::CleanConfig;
use crate::error::{CleanError, CleanResult};
use crate::spatial::SpatialIndex;
use crate::types::PointSet;

const MIN_SUGGESTION: f64 = 1e-6;

/// Sampling parameters for [`ParameterAdvisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvisorParams {
    /// Upper bound on the number of sampled points.
    pub sample_size: usize,
    /// Neighbours fetched per sampled point (at least 2 are always used).
    pub k: usize,
    /// Fixed seed for reproducible sampling; `None` seeds from the thread RNG.
    pub seed: Option<u64>,
}

impl Default for AdvisorParams {
    fn default() -> Self {
        Self {
            sample_size: 20_000,
            k: 8,
            seed: None,
        }
    }
}

impl AdvisorParams {
    /// Use a fixed seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Suggested filter parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSuggestion {
    /// Median nearest-neighbour distance over the sample.
    pub median_distance: f64,
    /// Number of points that contributed a distance.
    pub sampled: usize,
    /// Radius outlier radius, `2.5 x median`.
    pub radius: f64,
    /// Cluster eps, `2.0 x median`.
    pub eps: f64,
    /// Cluster min points, `max(8, k)`.
    pub min_points: usize,
}

impl ParameterSuggestion {
    /// A copy of `config` with radius, eps and min-points replaced.
    ///
    /// Enable flags are left alone.
    pub fn apply_to(&self, config: &CleanConfig) -> CleanConfig {
        let mut out = config.clone();
        out.radius_outlier.radius = self.radius;
        out.largest_cluster.eps = self.eps;
        out.largest_cluster.min_points = self.min_points;
        out
    }
}

impl std::fmt::Display for ParameterSuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "median NN distance {:.6} over {} samples: radius={:.6}, eps={:.6}, min_points={}",
            self.median_distance, self.sampled, self.radius, self.eps, self.min_points
        )
    }
}

/// Suggests radius, eps and min-points for a point set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParameterAdvisor {
    params: AdvisorParams,
}

impl ParameterAdvisor {
    /// Create an advisor. Requires `sample_size >= 1` and `k >= 1`.
    pub fn new(params: AdvisorParams) -> CleanResult<Self> {
        if params.sample_size == 0 {
            return Err(CleanError::invalid_parameter(
                "sample_size",
                params.sample_size,
                "must be >= 1",
            ));
        }
        if params.k == 0 {
            return Err(CleanError::invalid_parameter("k", params.k, "must be >= 1"));
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &AdvisorParams {
        &self.params
    }

    /// Analyze `points` and return suggestions.
    ///
    /// Fails with `InsufficientPoints` when no non-zero spacing can be
    /// measured, e.g. for fewer than two points or all-duplicate clouds.
    pub fn suggest(&self, points: &PointSet) -> CleanResult<ParameterSuggestion> {
        let n = points.len();
        if n < 2 {
            return Err(CleanError::insufficient_points(format!(
                "need at least 2 points, have {n}"
            )));
        }

        let amount = self.params.sample_size.min(n);
        let mut rng = match self.params.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        let sample = rand::seq::index::sample(&mut rng, n, amount).into_vec();

        let index = SpatialIndex::build(points.coords());
        let k = self.params.k.max(2);
        let mut distances: Vec<f64> = sample
            .par_iter()
            .filter_map(|&i| {
                let query = index.point(i);
                index.k_nearest(&query, k).get(1).map(|n| n.distance())
            })
            .filter(|d| d.is_finite() && *d > 0.0)
            .collect();

        let Some(median_distance) = median(&mut distances) else {
            return Err(CleanError::insufficient_points(
                "no non-zero nearest-neighbour distances in the sample",
            ));
        };

        let suggestion = ParameterSuggestion {
            median_distance,
            sampled: distances.len(),
            radius: (2.5 * median_distance).max(MIN_SUGGESTION),
            eps: (2.0 * median_distance).max(MIN_SUGGESTION),
            min_points: self.params.k.max(8),
        };

        info!(
            target: "splat_clean::step",
            median_distance = format!("{:.6}", suggestion.median_distance),
            sampled = suggestion.sampled,
            radius = format!("{:.6}", suggestion.radius),
            eps = format!("{:.6}", suggestion.eps),
            min_points = suggestion.min_points,
            "Parameter suggestion"
        );

        Ok(suggestion)
    }
}

/// Median with the two middle values averaged for even lengths.
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
