//! Tracing extensions for point cloud cleaning.
//!
//! This module provides structured logging and performance tracing.
//! It integrates with the `tracing` ecosystem to provide:
//!
//! - **Performance spans**: Track step timing
//! - **Structured fields**: Log point counts, bounds, timing
//! - **Step events**: One event per pipeline step outcome
//!
//! # Usage
//!
//! Enable tracing by initializing a subscriber in your application:
//!
//! ```rust,ignore
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env())
//!     .init();
//!
//! // Set RUST_LOG=splat_clean=debug for detailed output
//! ```
//!
//! # Targets
//!
//! - `splat_clean::timing`: operation durations
//! - `splat_clean::cloud_state`: point counts and bounds
//! - `splat_clean::step`: pipeline step outcomes and filter details
//! - `splat_clean::io`: file loads and saves

use std::time::Instant;
use tracing::{Span, debug, info, trace, warn};

use crate::pipeline::{StepOutcome, StepRecord};
use crate::types::PointSet;

/// A performance timer that logs duration on drop.
///
/// # Example
///
/// ```rust,ignore
/// use splat_clean::tracing_ext::OperationTimer;
///
/// fn expensive_operation() {
///     let _timer = OperationTimer::new("expensive_operation");
///     // ... do work ...
/// } // Timer logs duration when dropped
/// ```
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTimer {
    /// Create a new operation timer.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::info_span!("clean_operation", operation = name);
        debug!(target: "splat_clean::timing", operation = name, "Starting operation");
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Create a timer that also records the input point count.
    pub fn with_context(name: &'static str, point_count: usize) -> Self {
        let span = tracing::info_span!("clean_operation", operation = name, points = point_count);
        debug!(
            target: "splat_clean::timing",
            operation = name,
            points = point_count,
            "Starting operation"
        );
        Self {
            name,
            start: Instant::now(),
            span,
        }
    }

    /// Get the elapsed time.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Get the span for this timer.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        info!(
            target: "splat_clean::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", elapsed_ms),
            "Operation completed"
        );
    }
}

/// Log the point count and bounds of a point set at debug level.
pub fn log_cloud_stats(points: &PointSet, context: &str) {
    match points.bounds() {
        Some(bounds) => {
            let [dx, dy, dz] = bounds.extent();
            debug!(
                target: "splat_clean::cloud_state",
                context = context,
                points = points.len(),
                bounds = %bounds,
                dimensions = format!("{:.4} x {:.4} x {:.4}", dx, dy, dz),
                "Cloud state"
            );
        }
        None => debug!(
            target: "splat_clean::cloud_state",
            context = context,
            points = 0,
            "Cloud state (empty)"
        ),
    }
}

/// Log one pipeline step outcome.
///
/// Applied steps and no-ops log at info, rejections and skips at warn.
pub fn log_step_record(record: &StepRecord) {
    let step = record.kind.label();
    match &record.outcome {
        StepOutcome::Applied => info!(
            target: "splat_clean::step",
            step = step,
            before = record.before,
            after = record.after,
            removed = record.before.saturating_sub(record.after),
            "Step applied"
        ),
        StepOutcome::NoOp(reason) => info!(
            target: "splat_clean::step",
            step = step,
            points = record.before,
            reason = reason.as_str(),
            "Step made no change"
        ),
        StepOutcome::Rejected(reason) => warn!(
            target: "splat_clean::step",
            step = step,
            points = record.before,
            reason = reason.as_str(),
            "Step rejected, state rolled back"
        ),
        StepOutcome::Skipped(reason) => warn!(
            target: "splat_clean::step",
            step = step,
            reason = reason.as_str(),
            "Step skipped"
        ),
    }
    if let Some(bounds) = &record.bounds_after {
        trace!(target: "splat_clean::cloud_state", step = step, bounds = %bounds, "Bounds after step");
    }
}

/// Log a file I/O operation.
pub fn log_io_operation(operation: &str, path: &std::path::Path, rows: usize, success: bool) {
    if success {
        info!(
            target: "splat_clean::io",
            operation = operation,
            path = path.display().to_string(),
            rows = rows,
            "I/O operation completed"
        );
    } else {
        warn!(
            target: "splat_clean::io",
            operation = operation,
            path = path.display().to_string(),
            "I/O operation failed"
        );
    }
}

/// Log a performance-critical section.
///
/// Returns a guard that logs when dropped.
#[must_use]
pub fn log_perf_section(name: &'static str) -> impl Drop {
    struct PerfGuard {
        name: &'static str,
        start: Instant,
    }
    impl Drop for PerfGuard {
        fn drop(&mut self) {
            let elapsed = self.start.elapsed();
            trace!(
                target: "splat_clean::timing",
                section = self.name,
                elapsed_us = elapsed.as_micros(),
                "Performance section completed"
            );
        }
    }
    PerfGuard {
        name,
        start: Instant::now(),
    }
}
