//! The cleaning pipeline.
//!
//! A run threads one [`PointSet`] through the enabled filters in a fixed
//! order: voxel downsample, radius outliers, statistical outliers, largest
//! cluster, crop. Every step either replaces the state, leaves it alone
//! (no-op), rolls back (rejected: the filter would empty the set) or is
//! skipped (bad parameters, or voxel downsampling in 3DGS mode). None of
//! these stop the run.
//!
//! The output carries a `mapping_valid` flag. It starts `true` and turns
//! `false` for good once a resampling step is applied; attribute-preserving
//! export must then refuse.
//!
//! # Example
//!
//! ```
//! use nalgebra::Point3;
//! use splat_clean::{CleanConfig, Pipeline, PointSet};
//!
//! let points = PointSet::from_coordinates(
//!     (0..10).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect(),
//! );
//!
//! let mut config = CleanConfig::default();
//! config.crop.enabled = true;
//! config.crop.min = [-1.0, -1.0, -1.0];
//! config.crop.max = [4.5, 1.0, 1.0];
//!
//! let output = Pipeline::new(config).run(&points);
//! assert_eq!(output.kept_indices(), &[0, 1, 2, 3, 4]);
//! assert!(output.mapping_valid);
//! ```
//!
//! For runs off the calling thread see [`spawn_clean`].

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, unbounded};
use nalgebra::Point3;
use tracing::{info, warn};

use crate::cluster::LargestClusterFilter;
use crate::config::CleanConfig;
use crate::error::{CleanError, CleanResult};
use crate::filter::{FilterOutcome, PointFilter};
use crate::geometric::{AabbCropFilter, VoxelDownsampleFilter};
use crate::outlier::{RadiusOutlierFilter, StatisticalOutlierFilter};
use crate::progress::{
    Progress, ProgressCallback, ProgressTracker, SharedProgressTracker, shared_tracker,
};
use crate::tracing_ext::{OperationTimer, log_cloud_stats, log_step_record};
use crate::types::{Aabb, PointSet};

/// The pipeline steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Voxel,
    RadiusOutlier,
    StatisticalOutlier,
    LargestCluster,
    Crop,
}

impl StepKind {
    /// Fixed policy order.
    pub const ORDER: [StepKind; 5] = [
        StepKind::Voxel,
        StepKind::RadiusOutlier,
        StepKind::StatisticalOutlier,
        StepKind::LargestCluster,
        StepKind::Crop,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Voxel => "voxel downsample",
            StepKind::RadiusOutlier => "radius outlier removal",
            StepKind::StatisticalOutlier => "statistical outlier removal",
            StepKind::LargestCluster => "largest cluster",
            StepKind::Crop => "crop",
        }
    }

    fn enabled_in(&self, config: &CleanConfig) -> bool {
        match self {
            StepKind::Voxel => config.voxel.enabled,
            StepKind::RadiusOutlier => config.radius_outlier.enabled,
            StepKind::StatisticalOutlier => config.statistical_outlier.enabled,
            StepKind::LargestCluster => config.largest_cluster.enabled,
            StepKind::Crop => config.crop.enabled,
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The state was replaced by the filter's output.
    Applied,
    /// The filter would have emptied the set; the state was kept.
    Rejected(String),
    /// The filter had nothing to do.
    NoOp(String),
    /// The step did not run.
    Skipped(String),
}

impl StepOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, StepOutcome::Applied)
    }
}

/// Log entry for one processed step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub kind: StepKind,
    pub outcome: StepOutcome,
    /// Point count entering the step.
    pub before: usize,
    /// Point count leaving the step.
    pub after: usize,
    pub bounds_before: Option<Aabb>,
    pub bounds_after: Option<Aabb>,
}

impl std::fmt::Display for StepRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.outcome {
            StepOutcome::Applied => write!(
                f,
                "[{}] {} -> {} points",
                self.kind, self.before, self.after
            ),
            StepOutcome::Rejected(reason) => write!(f, "[{}] rejected: {}", self.kind, reason),
            StepOutcome::NoOp(reason) => write!(f, "[{}] no change: {}", self.kind, reason),
            StepOutcome::Skipped(reason) => write!(f, "[{}] skipped: {}", self.kind, reason),
        }
    }
}

/// Result of a cleaning run.
#[derive(Debug, Clone)]
pub struct CleanOutput {
    /// Final coordinates with their original row indices.
    pub points: PointSet,
    /// Whether `points` still maps 1:1 onto source rows.
    pub mapping_valid: bool,
    /// One record per processed step, in order.
    pub log: Vec<StepRecord>,
    /// Point count before the first step.
    pub initial_count: usize,
    /// Number of steps whose output replaced the state.
    pub steps_applied: usize,
    /// The run stopped early on request.
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl CleanOutput {
    /// Surviving original row indices, strictly increasing.
    pub fn kept_indices(&self) -> &[usize] {
        self.points.indices()
    }

    pub fn final_count(&self) -> usize {
        self.points.len()
    }

    /// Points removed by the run. Zero when a resampling step grew the set.
    pub fn removed_count(&self) -> usize {
        self.initial_count.saturating_sub(self.final_count())
    }

    pub fn removed_percent(&self) -> f64 {
        self.removed_count() as f64 / self.initial_count.max(1) as f64 * 100.0
    }

    /// Kept indices for attribute-preserving export.
    ///
    /// Fails with `MappingInvalidated` after a resampling step.
    pub fn require_mapping(&self) -> CleanResult<&[usize]> {
        if self.mapping_valid {
            Ok(self.kept_indices())
        } else {
            Err(CleanError::MappingInvalidated)
        }
    }

    /// Fails with `Cancelled` when the run stopped before its last step.
    pub fn require_complete(&self) -> CleanResult<()> {
        if self.cancelled {
            Err(CleanError::Cancelled {
                steps_processed: self.log.len(),
            })
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Display for CleanOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Initial: {} points", self.initial_count)?;
        writeln!(f, "Final:   {} points", self.final_count())?;
        write!(
            f,
            "Removed: {} ({:.2}%)",
            self.removed_count(),
            self.removed_percent()
        )
    }
}

/// A configured cleaning pipeline.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: CleanConfig,
}

impl Pipeline {
    pub fn new(config: CleanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CleanConfig {
        &self.config
    }

    /// Enabled steps in run order. Each one produces exactly one log record.
    pub fn planned_steps(&self) -> Vec<StepKind> {
        StepKind::ORDER
            .into_iter()
            .filter(|kind| kind.enabled_in(&self.config))
            .collect()
    }

    /// Construct the filter for a step, or explain why the step is skipped.
    fn build_filter(&self, kind: StepKind) -> Result<Box<dyn PointFilter>, String> {
        let c = &self.config;
        let filter: CleanResult<Box<dyn PointFilter>> = match kind {
            StepKind::Voxel => {
                if c.gs_mode {
                    return Err(
                        "3DGS mode is on: voxel downsample disabled to preserve 1:1 mapping"
                            .to_string(),
                    );
                }
                VoxelDownsampleFilter::new(c.voxel.voxel_size)
                    .map(|f| Box::new(f) as Box<dyn PointFilter>)
            }
            StepKind::RadiusOutlier => {
                RadiusOutlierFilter::new(c.radius_outlier.nb_points, c.radius_outlier.radius)
                    .map(|f| Box::new(f) as Box<dyn PointFilter>)
            }
            StepKind::StatisticalOutlier => StatisticalOutlierFilter::new(
                c.statistical_outlier.nb_neighbors,
                c.statistical_outlier.std_ratio,
            )
            .map(|f| Box::new(f) as Box<dyn PointFilter>),
            StepKind::LargestCluster => {
                LargestClusterFilter::new(c.largest_cluster.eps, c.largest_cluster.min_points)
                    .map(|f| Box::new(f) as Box<dyn PointFilter>)
            }
            StepKind::Crop => AabbCropFilter::new(
                Point3::from(c.crop.min),
                Point3::from(c.crop.max),
            )
            .map(|f| Box::new(f) as Box<dyn PointFilter>),
        };
        filter.map_err(|e| e.to_string())
    }

    /// Run every enabled step over `points`.
    pub fn run(&self, points: &PointSet) -> CleanOutput {
        self.run_with_progress(points, None)
    }

    /// Run with a progress callback. Returning `false` from the callback
    /// stops the run before the next step.
    pub fn run_with_progress(
        &self,
        points: &PointSet,
        callback: Option<&ProgressCallback>,
    ) -> CleanOutput {
        let tracker = ProgressTracker::new(self.planned_steps().len() as u64);
        self.run_observed(points, &tracker, callback, |_| {})
    }

    /// Run against an external tracker, reporting each step record to `on_step`.
    ///
    /// Cancellation through `tracker` is checked before every step.
    pub fn run_observed(
        &self,
        points: &PointSet,
        tracker: &ProgressTracker,
        callback: Option<&ProgressCallback>,
        mut on_step: impl FnMut(&StepRecord),
    ) -> CleanOutput {
        let timer = OperationTimer::with_context("clean", points.len());
        let steps = self.planned_steps();

        info!(
            target: "splat_clean::step",
            points = points.len(),
            steps = steps.len(),
            gs_mode = self.config.gs_mode,
            "Starting clean"
        );
        log_cloud_stats(points, "before clean");

        let mut current = points.clone();
        let mut mapping_valid = true;
        let mut log = Vec::with_capacity(steps.len());
        let mut steps_applied = 0;
        let mut cancelled = false;

        for kind in steps {
            if tracker.is_cancelled() {
                warn!(
                    target: "splat_clean::step",
                    processed = log.len(),
                    "Clean cancelled"
                );
                cancelled = true;
                break;
            }

            let before = current.len();
            let bounds_before = current.bounds();

            let outcome = match self.build_filter(kind) {
                Err(reason) => StepOutcome::Skipped(reason),
                Ok(filter) => match filter.apply(&current) {
                    FilterOutcome::Applied(next) => {
                        if filter.breaks_mapping() {
                            mapping_valid = false;
                        }
                        current = next;
                        steps_applied += 1;
                        StepOutcome::Applied
                    }
                    FilterOutcome::NoOp(reason) => StepOutcome::NoOp(reason),
                    FilterOutcome::Rejected(reason) => StepOutcome::Rejected(reason),
                },
            };

            let record = StepRecord {
                kind,
                outcome,
                before,
                after: current.len(),
                bounds_before,
                bounds_after: current.bounds(),
            };
            log_step_record(&record);
            on_step(&record);

            tracker.increment();
            let message = record.to_string();
            log.push(record);
            tracker.maybe_callback(callback, message);
        }

        log_cloud_stats(&current, "after clean");
        let output = CleanOutput {
            initial_count: points.len(),
            points: current,
            mapping_valid,
            log,
            steps_applied,
            cancelled,
            elapsed: tracker.elapsed(),
        };

        info!(
            target: "splat_clean::step",
            initial = output.initial_count,
            final_count = output.final_count(),
            removed = output.removed_count(),
            mapping_valid = output.mapping_valid,
            elapsed_ms = format!("{:.2}", timer.elapsed_ms()),
            "Clean finished"
        );
        output
    }
}

/// Notifications from a background run.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Started { points: usize, steps: usize },
    Step(StepRecord),
    Progress(Progress),
    Finished {
        final_count: usize,
        mapping_valid: bool,
        cancelled: bool,
    },
}

/// Handle to a pipeline running on its own thread.
pub struct CleanHandle {
    events: Receiver<PipelineEvent>,
    tracker: SharedProgressTracker,
    thread: JoinHandle<CleanOutput>,
}

impl CleanHandle {
    /// Event stream. It disconnects once the run has finished.
    pub fn events(&self) -> &Receiver<PipelineEvent> {
        &self.events
    }

    /// Ask the run to stop before its next step.
    pub fn cancel(&self) {
        self.tracker.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run and take its output.
    pub fn join(self) -> CleanOutput {
        match self.thread.join() {
            Ok(output) => output,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Run the pipeline on a dedicated thread.
pub fn spawn_clean(points: PointSet, config: CleanConfig) -> CleanHandle {
    let pipeline = Pipeline::new(config);
    let total = pipeline.planned_steps().len();
    let tracker = shared_tracker(total as u64);
    let (tx, rx) = unbounded();

    let worker_tracker = tracker.clone();
    let thread = std::thread::spawn(move || {
        // Receivers may be dropped at any time; send failures are ignored
        let _ = tx.send(PipelineEvent::Started {
            points: points.len(),
            steps: total,
        });

        let progress_tx = tx.clone();
        let callback: ProgressCallback = Box::new(move |progress: &Progress| {
            let _ = progress_tx.send(PipelineEvent::Progress(progress.clone()));
            true
        });

        let output = pipeline.run_observed(&points, &worker_tracker, Some(&callback), |record| {
            let _ = tx.send(PipelineEvent::Step(record.clone()));
        });

        let _ = tx.send(PipelineEvent::Finished {
            final_count: output.final_count(),
            mapping_valid: output.mapping_valid,
            cancelled: output.cancelled,
        });
        output
    });

    CleanHandle {
        events: rx,
        tracker,
        thread,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn line(n: usize) -> PointSet {
        PointSet::from_coordinates((0..n).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect())
    }

    fn crop(config: &mut CleanConfig, min: [f64; 3], max: [f64; 3]) {
        config.crop.enabled = true;
        config.crop.min = min;
        config.crop.max = max;
    }

    #[test]
    fn test_no_steps_is_identity() {
        let set = line(5);
        let output = Pipeline::default().run(&set);
        assert_eq!(output.points, set);
        assert!(output.log.is_empty());
        assert!(output.mapping_valid);
        assert_eq!(output.removed_count(), 0);
    }

    #[test]
    fn test_rejected_step_rolls_back() {
        let set = line(10);
        let mut config = CleanConfig::default();
        crop(&mut config, [100.0, 100.0, 100.0], [101.0, 101.0, 101.0]);

        let output = Pipeline::new(config).run(&set);
        assert_eq!(output.points, set);
        assert!(matches!(output.log[0].outcome, StepOutcome::Rejected(_)));
        assert_eq!(output.steps_applied, 0);
    }

    #[test]
    fn test_invalid_crop_is_skipped_not_rejected() {
        let set = line(10);
        let mut config = CleanConfig::default();
        crop(&mut config, [5.0, -1.0, -1.0], [1.0, 1.0, 1.0]);

        let output = Pipeline::new(config).run(&set);
        assert_eq!(output.points, set);
        match &output.log[0].outcome {
            StepOutcome::Skipped(reason) => assert!(reason.contains("crop bounds")),
            other => panic!("expected skipped, got {other:?}"),
        }
    }

    #[test]
    fn test_gs_mode_skips_voxel() {
        let set = line(10);
        let mut config = CleanConfig::default();
        config.voxel.enabled = true;
        config.voxel.voxel_size = 3.0;

        let output = Pipeline::new(config.clone()).run(&set);
        assert!(output.mapping_valid);
        assert_eq!(output.final_count(), 10);
        assert!(matches!(output.log[0].outcome, StepOutcome::Skipped(_)));

        config.gs_mode = false;
        let output = Pipeline::new(config).run(&set);
        assert!(!output.mapping_valid);
        assert_eq!(output.final_count(), 4);
        assert!(output.require_mapping().is_err());
    }

    #[test]
    fn test_mapping_stays_invalid_after_voxel() {
        let set = line(20);
        let mut config = CleanConfig::default();
        config.gs_mode = false;
        config.voxel.enabled = true;
        config.voxel.voxel_size = 2.0;
        crop(&mut config, [-1.0, -1.0, -1.0], [9.0, 1.0, 1.0]);

        let output = Pipeline::new(config).run(&set);
        assert_eq!(output.log.len(), 2);
        assert!(output.log.iter().all(|r| r.outcome.is_applied()));
        assert!(!output.mapping_valid);
        assert!(matches!(
            output.require_mapping(),
            Err(CleanError::MappingInvalidated)
        ));
    }

    #[test]
    fn test_step_order_is_fixed() {
        let mut config = CleanConfig::default();
        config.gs_mode = false;
        config.crop.enabled = true;
        config.largest_cluster.enabled = true;
        config.voxel.enabled = true;
        config.radius_outlier.enabled = true;
        let kinds = Pipeline::new(config).planned_steps();
        assert_eq!(
            kinds,
            vec![
                StepKind::Voxel,
                StepKind::RadiusOutlier,
                StepKind::LargestCluster,
                StepKind::Crop
            ]
        );
    }

    #[test]
    fn test_progress_counts_every_step() {
        let set = line(10);
        let mut config = CleanConfig::default();
        config.voxel.enabled = true; // skipped in gs mode
        config.radius_outlier.enabled = true;
        config.radius_outlier.nb_points = 50; // rejected
        crop(&mut config, [-1.0, -1.0, -1.0], [4.0, 1.0, 1.0]);

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let callback: ProgressCallback = Box::new(move |p| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            assert_eq!(p.total, 3);
            true
        });

        let output = Pipeline::new(config).run_with_progress(&set, Some(&callback));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(output.log.len(), 3);
        assert_eq!(output.kept_indices(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_callback_cancels_between_steps() {
        let set = line(10);
        let mut config = CleanConfig::default();
        config.radius_outlier.enabled = true;
        config.radius_outlier.nb_points = 1;
        config.radius_outlier.radius = 1.5;
        crop(&mut config, [-1.0, -1.0, -1.0], [4.0, 1.0, 1.0]);

        let callback: ProgressCallback = Box::new(|_| false);
        let output = Pipeline::new(config).run_with_progress(&set, Some(&callback));
        assert!(output.cancelled);
        assert_eq!(output.log.len(), 1);
        assert_eq!(output.final_count(), 10);
        assert!(matches!(
            output.require_complete(),
            Err(CleanError::Cancelled { steps_processed: 1 })
        ));
    }

    #[test]
    fn test_summary_display() {
        let set = line(8);
        let mut config = CleanConfig::default();
        crop(&mut config, [-1.0, -1.0, -1.0], [1.5, 1.0, 1.0]);
        let output = Pipeline::new(config).run(&set);
        let summary = output.to_string();
        assert!(summary.contains("Initial: 8 points"));
        assert!(summary.contains("Final:   2 points"));
        assert!(summary.contains("Removed: 6 (75.00%)"));
    }

    #[test]
    fn test_spawn_clean_delivers_events() {
        let set = line(10);
        let mut config = CleanConfig::default();
        crop(&mut config, [-1.0, -1.0, -1.0], [2.0, 1.0, 1.0]);

        let handle = spawn_clean(set, config);
        let events: Vec<PipelineEvent> = handle.events().iter().collect();
        let output = handle.join();

        assert_eq!(output.kept_indices(), &[0, 1, 2]);
        assert!(matches!(events.first(), Some(PipelineEvent::Started { steps: 1, .. })));
        assert!(events.iter().any(|e| matches!(e, PipelineEvent::Step(_))));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::Finished {
                final_count: 3,
                mapping_valid: true,
                cancelled: false
            })
        ));
    }

    #[test]
    fn test_spawn_clean_cancel_before_start() {
        let set = line(10);
        let mut config = CleanConfig::default();
        crop(&mut config, [-1.0, -1.0, -1.0], [2.0, 1.0, 1.0]);

        let tracker = shared_tracker(1);
        tracker.cancel();
        let output = Pipeline::new(config).run_observed(&set, &tracker, None, |_| {});
        assert!(output.cancelled);
        assert!(output.log.is_empty());
        assert_eq!(output.points, set);
    }
}
