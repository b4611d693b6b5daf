//! Core point set types.

use nalgebra::Point3;

use crate::error::{CleanError, CleanResult};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    /// Create a box from two corners.
    #[inline]
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Bounding box of a set of points, `None` when empty.
    pub fn from_points(points: &[Point3<f64>]) -> Option<Self> {
        let first = points.first()?;
        let mut min = *first;
        let mut max = *first;

        for p in &points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }

        Some(Self { min, max })
    }

    /// Inclusive containment test on every axis.
    #[inline]
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|a| self.min[a] <= p[a] && p[a] <= self.max[a])
    }

    /// Edge lengths along x, y and z.
    pub fn extent(&self) -> [f64; 3] {
        [
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        ]
    }
}

impl std::fmt::Display for Aabb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "min=({:.4}, {:.4}, {:.4}) max=({:.4}, {:.4}, {:.4})",
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z
        )
    }
}

/// Coordinates paired with the original row index of each point.
///
/// `indices` is strictly increasing and has the same length as `coords`;
/// `indices[i]` names the source attribute row that `coords[i]` came from.
/// Filters never mutate a `PointSet`, they build a new one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointSet {
    coords: Vec<Point3<f64>>,
    indices: Vec<usize>,
}

impl PointSet {
    /// Build a point set with an explicit index mapping.
    ///
    /// Fails when the lengths differ or the indices are not strictly increasing.
    pub fn new(coords: Vec<Point3<f64>>, indices: Vec<usize>) -> CleanResult<Self> {
        if coords.len() != indices.len() {
            return Err(CleanError::invalid_parameter(
                "indices",
                indices.len(),
                "must have one index per coordinate",
            ));
        }
        if let Some(pos) = indices.windows(2).position(|w| w[0] >= w[1]) {
            return Err(CleanError::invalid_parameter(
                "indices",
                indices[pos + 1],
                "must be strictly increasing",
            ));
        }
        Ok(Self { coords, indices })
    }

    /// Build a point set with the identity mapping `0..N`.
    pub fn from_coordinates(coords: Vec<Point3<f64>>) -> Self {
        let indices = (0..coords.len()).collect();
        Self { coords, indices }
    }

    /// Caller guarantees the index invariant.
    pub(crate) fn from_parts_unchecked(coords: Vec<Point3<f64>>, indices: Vec<usize>) -> Self {
        debug_assert_eq!(coords.len(), indices.len());
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        Self { coords, indices }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    #[inline]
    pub fn coords(&self) -> &[Point3<f64>] {
        &self.coords
    }

    /// Original row indices, strictly increasing.
    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Bounding box of the coordinates.
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(&self.coords)
    }

    /// Keep the points whose mask entry is `true`.
    pub fn retain_mask(&self, keep: &[bool]) -> Self {
        debug_assert_eq!(keep.len(), self.len());
        let mut coords = Vec::new();
        let mut indices = Vec::new();
        for ((p, &idx), _) in self
            .coords
            .iter()
            .zip(&self.indices)
            .zip(keep)
            .filter(|(_, k)| **k)
        {
            coords.push(*p);
            indices.push(idx);
        }
        Self { coords, indices }
    }

    /// Apply a transform to every coordinate, leaving the mapping untouched.
    pub fn map_coords(&self, f: impl Fn(&Point3<f64>) -> Point3<f64>) -> Self {
        Self {
            coords: self.coords.iter().map(f).collect(),
            indices: self.indices.clone(),
        }
    }
}
