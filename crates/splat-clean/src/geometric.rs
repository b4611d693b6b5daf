//! Axis-aligned crop and voxel-grid downsampling.

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::error::{CleanError, CleanResult};
use crate::filter::{FilterOutcome, PointFilter, outcome_from_mask};
use crate::types::{Aabb, PointSet};

const AXES: [&str; 3] = ["x", "y", "z"];

/// Keeps points inside an axis-aligned box, bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AabbCropFilter {
    bounds: Aabb,
}

impl AabbCropFilter {
    /// Create the filter. Every axis must satisfy `min < max`.
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> CleanResult<Self> {
        for (axis, name) in AXES.iter().enumerate() {
            if !(min[axis].is_finite() && max[axis].is_finite() && min[axis] < max[axis]) {
                return Err(CleanError::invalid_crop_bounds(*name, min[axis], max[axis]));
            }
        }
        Ok(Self {
            bounds: Aabb::new(min, max),
        })
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }
}

impl PointFilter for AabbCropFilter {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn apply(&self, points: &PointSet) -> FilterOutcome {
        let keep: Vec<bool> = points
            .coords()
            .iter()
            .map(|p| self.bounds.contains(p))
            .collect();
        outcome_from_mask(points, &keep, || {
            format!("crop box {} contains no points; widen the bounds", self.bounds)
        })
    }
}

/// Collapses every occupied grid cell to the centroid of its points.
///
/// Each representative takes the smallest original index among its cell's
/// members, so the output indices stay strictly increasing. They no longer
/// identify a single source row, which is why this filter breaks the mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelDownsampleFilter {
    voxel_size: f64,
}

impl VoxelDownsampleFilter {
    /// Create the filter. Requires a finite `voxel_size > 0`.
    pub fn new(voxel_size: f64) -> CleanResult<Self> {
        if !(voxel_size.is_finite() && voxel_size > 0.0) {
            return Err(CleanError::invalid_parameter(
                "voxel_size",
                voxel_size,
                "must be a finite value > 0",
            ));
        }
        Ok(Self { voxel_size })
    }

    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }
}

impl PointFilter for VoxelDownsampleFilter {
    fn name(&self) -> &'static str {
        "voxel downsample"
    }

    fn breaks_mapping(&self) -> bool {
        true
    }

    fn apply(&self, points: &PointSet) -> FilterOutcome {
        let Some(bounds) = points.bounds() else {
            return FilterOutcome::NoOp("empty input".to_string());
        };
        let min_bound = bounds.min;

        // Cells in order of their first member; slot = position in `cells`
        let mut slots: HashMap<(i64, i64, i64), usize> = HashMap::new();
        let mut cells: Vec<(Vector3<f64>, usize, usize)> = Vec::new();

        for (p, &idx) in points.coords().iter().zip(points.indices()) {
            let ix = ((p.x - min_bound.x) / self.voxel_size).floor() as i64;
            let iy = ((p.y - min_bound.y) / self.voxel_size).floor() as i64;
            let iz = ((p.z - min_bound.z) / self.voxel_size).floor() as i64;

            let slot = *slots.entry((ix, iy, iz)).or_insert_with(|| {
                cells.push((Vector3::zeros(), 0, idx));
                cells.len() - 1
            });
            let cell = &mut cells[slot];
            cell.0 += p.coords;
            cell.1 += 1;
        }

        let mut coords = Vec::with_capacity(cells.len());
        let mut indices = Vec::with_capacity(cells.len());
        for (sum, count, first_index) in cells {
            coords.push(Point3::from(sum / count as f64));
            indices.push(first_index);
        }

        debug!(
            target: "splat_clean::step",
            voxel_size = self.voxel_size,
            before = points.len(),
            after = coords.len(),
            "Voxel downsample finished"
        );

        if coords.is_empty() {
            return FilterOutcome::Rejected(format!(
                "voxel downsample (voxel_size={}) produced no points",
                self.voxel_size
            ));
        }
        FilterOutcome::Applied(PointSet::from_parts_unchecked(coords, indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn cube_corners(scale: f64) -> PointSet {
        let mut coords = Vec::new();
        for &x in &[0.0, scale] {
            for &y in &[0.0, scale] {
                for &z in &[0.0, scale] {
                    coords.push(Point3::new(x, y, z));
                }
            }
        }
        PointSet::from_coordinates(coords)
    }

    #[test]
    fn test_crop_inclusive_bounds() {
        let set = cube_corners(1.0);
        let filter =
            AabbCropFilter::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 0.5)).unwrap();
        match filter.apply(&set) {
            FilterOutcome::Applied(kept) => {
                assert_eq!(kept.len(), 4);
                assert!(kept.coords().iter().all(|p| p.z == 0.0));
            }
            other => panic!("expected applied, got {other:?}"),
        }
    }

    #[test]
    fn test_crop_to_own_bounds_is_noop() {
        let set = cube_corners(2.5);
        let bounds = set.bounds().unwrap();
        let filter = AabbCropFilter::new(bounds.min, bounds.max).unwrap();
        assert_eq!(filter.apply(&set).label(), "no-op");
    }

    #[test]
    fn test_crop_rejects_empty_box() {
        let set = cube_corners(1.0);
        let filter =
            AabbCropFilter::new(Point3::new(5.0, 5.0, 5.0), Point3::new(6.0, 6.0, 6.0)).unwrap();
        assert_eq!(filter.apply(&set).label(), "rejected");
    }

    #[test]
    fn test_crop_invalid_bounds() {
        let err = AabbCropFilter::new(Point3::new(0.0, 2.0, 0.0), Point3::new(1.0, 2.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, CleanError::InvalidCropBounds { axis: "y", .. }));
    }

    #[test]
    fn test_voxel_centroids_and_indices() {
        let set = PointSet::new(
            vec![
                Point3::new(0.1, 0.1, 0.1),
                Point3::new(4.5, 4.5, 4.5),
                Point3::new(0.3, 0.3, 0.3),
                Point3::new(4.9, 4.9, 4.9),
            ],
            vec![2, 3, 7, 9],
        )
        .unwrap();
        let filter = VoxelDownsampleFilter::new(1.0).unwrap();
        assert!(filter.breaks_mapping());

        match filter.apply(&set) {
            FilterOutcome::Applied(out) => {
                assert_eq!(out.len(), 2);
                assert_eq!(out.indices(), &[2, 3]);
                assert!(approx_eq(out.coords()[0].x, 0.2));
                assert!(approx_eq(out.coords()[1].y, 4.7));
            }
            other => panic!("expected applied, got {other:?}"),
        }
    }

    #[test]
    fn test_voxel_invalid_size() {
        assert!(VoxelDownsampleFilter::new(0.0).is_err());
        assert!(VoxelDownsampleFilter::new(-0.5).is_err());
    }
}
