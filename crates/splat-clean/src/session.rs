//! Working state for interactive cleaning.
//!
//! A [`Session`] keeps three snapshots apart: the `original` cloud as
//! loaded, the `current` cloud being edited, and the last `cleaned`
//! result. Orientation changes and manual cluster isolation act on
//! `current`; cleaning always starts from `current` and never mutates it.
//!
//! A [`SessionProfile`] carries the user's standing preferences: a default
//! orientation and an optional cluster isolation run right after loading.
//! The session only reads it; persisting it is up to the caller.

use crate::advisor::{AdvisorParams, ParameterAdvisor, ParameterSuggestion};
use crate::cluster::LargestClusterFilter;
use crate::config::CleanConfig;
use crate::error::CleanResult;
use crate::filter::{FilterOutcome, PointFilter};
use crate::io::PlyCloud;
use crate::pipeline::{CleanOutput, Pipeline};
use crate::progress::ProgressCallback;
use crate::tracing_ext::log_cloud_stats;
use crate::types::{Aabb, PointSet};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Viewing orientation applied to the working coordinates.
///
/// Both transforms are their own inverse. Row indices are never touched,
/// so attribute-preserving export is unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    #[serde(rename = "none")]
    None,
    /// Rotate 180 degrees about X: `(x, -y, -z)`.
    #[serde(rename = "flip_x_180")]
    FlipX180,
    /// Swap the Y and Z axes: `(x, z, y)`.
    #[serde(rename = "swap_yz")]
    SwapYZ,
}

impl Orientation {
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        match self {
            Orientation::None => *p,
            Orientation::FlipX180 => Point3::new(p.x, -p.y, -p.z),
            Orientation::SwapYZ => Point3::new(p.x, p.z, p.y),
        }
    }

    fn transform(&self, points: &PointSet) -> PointSet {
        match self {
            Orientation::None => points.clone(),
            _ => points.map_coords(|p| self.apply(p)),
        }
    }
}

/// Cluster isolation parameters run automatically after loading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoCluster {
    pub eps: f64,
    pub min_points: usize,
}

/// Standing preferences applied when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionProfile {
    /// Orientation to switch to when `auto_apply_orientation` is set.
    pub orientation: Orientation,
    pub auto_apply_orientation: bool,
    /// Keep only the largest cluster right after loading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_cluster: Option<AutoCluster>,
}

impl SessionProfile {
    /// The orientation to use on load and reset, if the profile sets one.
    pub fn default_orientation(&self) -> Option<Orientation> {
        self.auto_apply_orientation.then_some(self.orientation)
    }
}

/// Original, working and cleaned snapshots of one cloud.
#[derive(Debug, Clone)]
pub struct Session {
    original: PointSet,
    current: PointSet,
    cleaned: Option<CleanOutput>,
    orientation: Orientation,
    profile: SessionProfile,
}

impl Session {
    /// Start a session and apply the profile.
    ///
    /// The profile orientation is applied first, then the automatic cluster
    /// isolation. Fails only if the profile's cluster parameters are invalid.
    pub fn new(original: PointSet, profile: SessionProfile) -> CleanResult<Self> {
        let mut session = Self {
            current: original.clone(),
            original,
            cleaned: None,
            orientation: Orientation::None,
            profile,
        };

        if let Some(orientation) = profile.default_orientation() {
            info!(target: "splat_clean::step", ?orientation, "Applying profile orientation");
            session.set_orientation(orientation);
        }
        if let Some(auto) = profile.auto_cluster {
            info!(
                target: "splat_clean::step",
                eps = auto.eps,
                min_points = auto.min_points,
                "Automatic cluster isolation"
            );
            session.keep_largest_cluster(auto.eps, auto.min_points)?;
        }
        Ok(session)
    }

    /// Start a session from a loaded PLY.
    pub fn from_cloud(cloud: &PlyCloud, profile: SessionProfile) -> CleanResult<Self> {
        Self::new(cloud.point_set(), profile)
    }

    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    /// Replace the profile. Takes effect on the next [`Session::reset`].
    pub fn set_profile(&mut self, profile: SessionProfile) {
        self.profile = profile;
    }

    pub fn original(&self) -> &PointSet {
        &self.original
    }

    pub fn current(&self) -> &PointSet {
        &self.current
    }

    /// Result of the last [`Session::clean`], if any.
    pub fn cleaned(&self) -> Option<&CleanOutput> {
        self.cleaned.as_ref()
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Switch orientation, undoing the previous one first.
    pub fn set_orientation(&mut self, orientation: Orientation) {
        if orientation == self.orientation {
            return;
        }
        let upright = self.orientation.transform(&self.current);
        self.current = orientation.transform(&upright);
        self.orientation = orientation;
    }

    /// Bounds of the working set, used to pre-fill crop boxes.
    pub fn current_bounds(&self) -> Option<Aabb> {
        self.current.bounds()
    }

    /// Keep only the largest density cluster of the working set.
    ///
    /// Returns the number of points removed; zero when no cluster was
    /// found or every point already belongs to it.
    pub fn keep_largest_cluster(&mut self, eps: f64, min_points: usize) -> CleanResult<usize> {
        let filter = LargestClusterFilter::new(eps, min_points)?;
        let before = self.current.len();
        match filter.apply(&self.current) {
            FilterOutcome::Applied(points) => {
                self.current = points;
                log_cloud_stats(&self.current, "largest cluster");
                Ok(before - self.current.len())
            }
            FilterOutcome::NoOp(reason) | FilterOutcome::Rejected(reason) => {
                info!(target: "splat_clean::step", reason = reason.as_str(), "Cluster isolation made no change");
                Ok(0)
            }
        }
    }

    /// Restore the original cloud and drop the cleaned result.
    ///
    /// The profile orientation is used if it auto-applies, otherwise the
    /// current one is kept. Automatic cluster isolation only runs on load.
    pub fn reset(&mut self) {
        if let Some(orientation) = self.profile.default_orientation() {
            self.orientation = orientation;
        }
        self.current = self.orientation.transform(&self.original);
        self.cleaned = None;
    }

    /// Run the pipeline from the working set and keep the result.
    pub fn clean(
        &mut self,
        config: &CleanConfig,
        progress: Option<&ProgressCallback>,
    ) -> &CleanOutput {
        let output = Pipeline::new(config.clone()).run_with_progress(&self.current, progress);
        self.cleaned.insert(output)
    }

    /// Suggest filter parameters from the working set.
    pub fn suggest_parameters(&self, params: &AdvisorParams) -> CleanResult<ParameterSuggestion> {
        ParameterAdvisor::new(*params)?.suggest(&self.current)
    }
}
