//! Nearest-neighbour index over a fixed coordinate array.
//!
//! [`SpatialIndex`] is built once per filter step from the step's input
//! coordinates and is never updated in place. Neighbour indices it returns
//! are positions into that coordinate array, not original row indices.
//!
//! # Self-exclusion
//!
//! Every query that starts from a point already in the index has an
//! `_excluding` variant that drops that point from the result. Outlier and
//! cluster filters count *other* points, so they always use those variants.
//! Matching on position rather than on distance keeps exact duplicates
//! of the query point in the result.
//!
//! # Boundary semantics
//!
//! - [`SpatialIndex::within`] is inclusive: `d² <= r²`.
//! - [`SpatialIndex::count_strictly_within_excluding`] is exclusive: `d² < r²`.

use std::num::NonZeroUsize;

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::Point3;

/// A neighbour returned by a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the neighbour in the indexed coordinate array.
    pub index: usize,
    /// Squared Euclidean distance to the query.
    pub distance_sq: f64,
}

impl Neighbor {
    #[inline]
    pub fn distance(&self) -> f64 {
        self.distance_sq.sqrt()
    }
}

/// Immutable 3-D kd-tree with k-nearest and radius queries.
pub struct SpatialIndex {
    points: Vec<[f64; 3]>,
    tree: Option<ImmutableKdTree<f64, 3>>,
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("points", &self.points.len())
            .finish()
    }
}

impl SpatialIndex {
    /// Build an index over the given coordinates.
    pub fn build(coords: &[Point3<f64>]) -> Self {
        let points: Vec<[f64; 3]> = coords.iter().map(|p| [p.x, p.y, p.z]).collect();
        Self::from_arrays(points)
    }

    /// Build an index over coordinates already in array form.
    pub fn from_arrays(points: Vec<[f64; 3]>) -> Self {
        let tree = if points.is_empty() {
            None
        } else {
            Some(ImmutableKdTree::new_from_slice(&points))
        };
        Self { points, tree }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The indexed point at `index` as an array.
    #[inline]
    pub fn point(&self, index: usize) -> [f64; 3] {
        self.points[index]
    }

    /// Up to `k` nearest points to `query`, ascending by distance.
    ///
    /// If `query` is itself an indexed point it is included (at distance 0).
    pub fn k_nearest(&self, query: &[f64; 3], k: usize) -> Vec<Neighbor> {
        let (Some(tree), Some(k)) = (&self.tree, NonZeroUsize::new(k)) else {
            return Vec::new();
        };
        let mut found: Vec<Neighbor> = tree
            .nearest_n::<SquaredEuclidean>(query, k)
            .into_iter()
            .map(|nn| Neighbor {
                index: nn.item as usize,
                distance_sq: nn.distance,
            })
            .collect();
        sort_neighbors(&mut found);
        found
    }

    /// Up to `k` nearest neighbours of the indexed point `index`, excluding itself.
    ///
    /// Returns fewer than `k` entries when the index holds `k` points or less.
    pub fn k_nearest_excluding(&self, index: usize, k: usize) -> Vec<Neighbor> {
        if k == 0 {
            return Vec::new();
        }
        let query = self.points[index];
        let mut found = self.k_nearest(&query, k + 1);
        match found.iter().position(|n| n.index == index) {
            Some(pos) => {
                found.remove(pos);
            }
            // Self lost a tie against more than k duplicates.
            None => found.truncate(k),
        }
        found
    }

    /// All points with `d² <= radius²` from `query`, ascending by distance.
    pub fn within(&self, query: &[f64; 3], radius: f64) -> Vec<Neighbor> {
        let Some(tree) = &self.tree else {
            return Vec::new();
        };
        if radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }
        let r2 = radius * radius;
        // The tree's own boundary test is not relied on; widen and filter exactly.
        let widened = r2 * (1.0 + 1e-9) + f64::MIN_POSITIVE;
        let mut found: Vec<Neighbor> = tree
            .within::<SquaredEuclidean>(query, widened)
            .into_iter()
            .map(|nn| {
                let index = nn.item as usize;
                Neighbor {
                    index,
                    distance_sq: squared_distance(&self.points[index], query),
                }
            })
            .filter(|n| n.distance_sq <= r2)
            .collect();
        sort_neighbors(&mut found);
        found
    }

    /// Neighbours of the indexed point `index` with `d² <= radius²`, excluding itself.
    pub fn within_excluding(&self, index: usize, radius: f64) -> Vec<Neighbor> {
        let query = self.points[index];
        let mut found = self.within(&query, radius);
        found.retain(|n| n.index != index);
        found
    }

    /// Number of other points with `d² < radius²` from the indexed point `index`.
    pub fn count_strictly_within_excluding(&self, index: usize, radius: f64) -> usize {
        let r2 = radius * radius;
        self.within_excluding(index, radius)
            .iter()
            .filter(|n| n.distance_sq < r2)
            .count()
    }
}

#[inline]
fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

/// Ascending distance, ties by index, so results never depend on tree layout.
fn sort_neighbors(found: &mut [Neighbor]) {
    found.sort_by(|a, b| {
        a.distance_sq
            .total_cmp(&b.distance_sq)
            .then(a.index.cmp(&b.index))
    });
}
