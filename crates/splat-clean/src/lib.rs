//! Index-preserving point cloud cleaning for 3D Gaussian Splatting assets.
//!
//! This crate removes outliers, isolates the dominant cluster and crops
//! splat point clouds while keeping a 1:1 mapping from every surviving
//! point to its original PLY row, so the cleaned cloud can be written back
//! with all of its spherical-harmonics, opacity, scale and rotation
//! attributes intact.
//!
//! # Features
//!
//! - **Filters**: radius outliers, statistical outliers, largest density
//!   cluster, axis-aligned crop, voxel downsampling
//! - **Pipeline**: fixed step order, rollback when a step would empty the
//!   cloud, a `mapping_valid` flag that resampling clears for good
//! - **Advisor**: radius/eps/min-points suggestions from sampled
//!   nearest-neighbour spacing
//! - **I/O**: ASCII and binary PLY, attribute-preserving and preview export
//! - **Config**: TOML/JSON pipeline configuration and named JSON presets
//!
//! # Coordinate System
//!
//! Coordinates are used exactly as stored in the file; no unit is assumed.
//! Radius, eps and voxel size are in the same unit as the coordinates.
//!
//! # Quick Start
//!
//! ```no_run
//! use splat_clean::{CleanConfig, Pipeline, PlyCloud, save_gs_preserving};
//!
//! let cloud = PlyCloud::load("scene.ply")?;
//!
//! let mut config = CleanConfig::default();
//! config.statistical_outlier.enabled = true;
//! config.largest_cluster.enabled = true;
//!
//! let output = Pipeline::new(config).run(&cloud.point_set());
//! println!("{output}");
//!
//! save_gs_preserving(&cloud, &output, "scene_clean.ply")?;
//! # Ok::<(), splat_clean::CleanError>(())
//! ```
//!
//! ## Suggesting parameters
//!
//! ```no_run
//! use splat_clean::{AdvisorParams, CleanConfig, ParameterAdvisor, PlyCloud};
//!
//! let cloud = PlyCloud::load("scene.ply")?;
//! let advisor = ParameterAdvisor::new(AdvisorParams::default().with_seed(7))?;
//! let suggestion = advisor.suggest(&cloud.point_set())?;
//! let config = suggestion.apply_to(&CleanConfig::default());
//! # let _ = config;
//! # Ok::<(), splat_clean::CleanError>(())
//! ```
//!
//! # Logging
//!
//! Every step emits `tracing` events; see [`tracing_ext`] for the targets.

mod error;
mod filter;
mod types;

pub mod advisor;
pub mod cluster;
pub mod config;
pub mod geometric;
pub mod io;
pub mod outlier;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod spatial;
pub mod tracing_ext;

// Re-export core types at crate root
pub use error::{CleanError, CleanResult, ErrorCode, RecoverySuggestion};
pub use filter::{FilterOutcome, PointFilter};
pub use types::{Aabb, PointSet};

pub use advisor::{AdvisorParams, ParameterAdvisor, ParameterSuggestion};
pub use cluster::{ClusterLabeling, DensityClusterer, LargestClusterFilter, NOISE};
pub use config::{
    CleanConfig, CropConfig, LargestClusterConfig, Preset, PresetStore, RadiusOutlierConfig,
    StatisticalOutlierConfig, VoxelConfig,
};
pub use geometric::{AabbCropFilter, VoxelDownsampleFilter};
pub use io::{AttributeTable, PlyCloud, save_gs_preserving, save_preview};
pub use outlier::{RadiusOutlierFilter, StatisticalOutlierFilter};
pub use pipeline::{
    CleanHandle, CleanOutput, Pipeline, PipelineEvent, StepKind, StepOutcome, StepRecord,
    spawn_clean,
};
pub use progress::{Progress, ProgressCallback, ProgressTracker};
pub use session::{AutoCluster, Orientation, Session, SessionProfile};
pub use spatial::{Neighbor, SpatialIndex};
