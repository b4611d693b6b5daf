//! Progress reporting and cooperative cancellation for cleaning runs.
//!
//! This module provides infrastructure for:
//! - Progress callbacks as pipeline steps complete
//! - Cancellation via the callback's return value or a shared tracker
//!
//! Progress is counted in pipeline steps. Applied, rejected, no-op and
//! skipped steps all advance the counter. Cancellation is only observed
//! between steps; a step that has started always finishes.
//!
//! # Example
//!
//! ```
//! use splat_clean::progress::{Progress, ProgressCallback};
//!
//! let callback: ProgressCallback = Box::new(|progress: &Progress| {
//!     println!("{}% complete: {}", progress.percent(), progress.message);
//!     true // Continue processing (return false to cancel)
//! });
//! # let _ = callback;
//! ```

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Progress information passed to callbacks.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Steps processed so far.
    pub current: u64,

    /// Total number of steps planned for the run.
    pub total: u64,

    /// Human-readable message describing the last step.
    pub message: String,

    /// Elapsed time since the run started.
    pub elapsed: Duration,

    /// Estimated time remaining (if available).
    pub estimated_remaining: Option<Duration>,
}

impl Progress {
    /// Create a new progress report.
    pub fn new(current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            elapsed: Duration::ZERO,
            estimated_remaining: None,
        }
    }

    /// Get progress as a fraction (0.0 to 1.0).
    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64) / (self.total as f64)
        }
    }

    /// Get progress as a percentage (0 to 100).
    #[inline]
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }

    /// Check if the run is complete.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

/// Callback function for progress reporting.
///
/// Returns `true` to continue, `false` to request cancellation.
pub type ProgressCallback = Box<dyn Fn(&Progress) -> bool + Send + Sync>;

/// A thread-safe progress tracker.
///
/// The pipeline advances it while another thread may read it or request
/// cancellation through a shared handle.
#[derive(Debug)]
pub struct ProgressTracker {
    current: AtomicU64,
    total: u64,
    cancelled: AtomicBool,
    start_time: Instant,
    last_callback_time: Mutex<Option<Instant>>,
    callback_interval: Duration,
}

impl ProgressTracker {
    /// Create a new progress tracker. Every report reaches the callback.
    pub fn new(total: u64) -> Self {
        Self::with_interval(total, Duration::ZERO)
    }

    /// Create a tracker that calls back at most once per `interval`.
    pub fn with_interval(total: u64, interval: Duration) -> Self {
        Self {
            current: AtomicU64::new(0),
            total,
            cancelled: AtomicBool::new(false),
            start_time: Instant::now(),
            last_callback_time: Mutex::new(None),
            callback_interval: interval,
        }
    }

    /// Increment progress by one.
    #[inline]
    pub fn increment(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current progress value.
    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    /// Get the total count.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Check if cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Request cancellation. Takes effect before the next step.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Get progress as a fraction (0.0 to 1.0).
    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current() as f64) / (self.total as f64)
        }
    }

    /// Get elapsed time.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Estimate remaining time based on current progress.
    pub fn estimated_remaining(&self) -> Option<Duration> {
        let current = self.current();
        if current == 0 {
            return None;
        }

        let elapsed = self.elapsed();
        let rate = current as f64 / elapsed.as_secs_f64();

        if rate > 0.0 {
            let remaining = self.total.saturating_sub(current) as f64 / rate;
            Some(Duration::from_secs_f64(remaining))
        } else {
            None
        }
    }

    /// Create a Progress snapshot.
    pub fn snapshot(&self, message: impl Into<String>) -> Progress {
        Progress {
            current: self.current(),
            total: self.total,
            message: message.into(),
            elapsed: self.elapsed(),
            estimated_remaining: self.estimated_remaining(),
        }
    }

    /// Call the callback unless one was made within the callback interval.
    ///
    /// Returns `false` if cancellation has been requested, either earlier
    /// or by this callback.
    pub fn maybe_callback(
        &self,
        callback: Option<&ProgressCallback>,
        message: impl Into<String>,
    ) -> bool {
        if self.is_cancelled() {
            return false;
        }

        let Some(callback) = callback else {
            return true;
        };

        let now = Instant::now();
        {
            let mut last = self
                .last_callback_time
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(previous) = *last
                && now.duration_since(previous) < self.callback_interval
            {
                return true;
            }
            *last = Some(now);
        }

        let progress = self.snapshot(message);
        let should_continue = callback(&progress);

        if !should_continue {
            self.cancel();
        }

        should_continue
    }
}

/// Arc-wrapped progress tracker for sharing across threads.
pub type SharedProgressTracker = Arc<ProgressTracker>;

/// Create a shared progress tracker.
pub fn shared_tracker(total: u64) -> SharedProgressTracker {
    Arc::new(ProgressTracker::new(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_progress_fraction() {
        let p = Progress::new(2, 4, "test");
        assert!((p.fraction() - 0.5).abs() < 1e-10);
        assert_eq!(p.percent(), 50);
    }

    #[test]
    fn test_progress_complete() {
        assert!(!Progress::new(2, 5, "incomplete").is_complete());
        assert!(Progress::new(5, 5, "complete").is_complete());
    }

    #[test]
    fn test_progress_zero_total() {
        let p = Progress::new(0, 0, "empty");
        assert!((p.fraction() - 0.0).abs() < 1e-10);
        assert_eq!(p.percent(), 0);
    }

    #[test]
    fn test_progress_tracker() {
        let tracker = ProgressTracker::new(5);
        assert_eq!(tracker.current(), 0);
        assert_eq!(tracker.total(), 5);
        assert!(!tracker.is_cancelled());

        tracker.increment();
        tracker.increment();
        assert_eq!(tracker.current(), 2);
        assert!((tracker.fraction() - 0.4).abs() < 1e-10);

        let snap = tracker.snapshot("radius outlier removal");
        assert_eq!(snap.current, 2);
        assert_eq!(snap.message, "radius outlier removal");
    }

    #[test]
    fn test_shared_tracker_cancel() {
        let tracker = shared_tracker(3);
        let other = tracker.clone();
        other.cancel();
        assert!(tracker.is_cancelled());
        assert!(!tracker.maybe_callback(None, "after cancel"));
    }

    #[test]
    fn test_callback_requests_cancellation() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let callback: ProgressCallback = Box::new(move |p| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            p.current < 2
        });

        let tracker = ProgressTracker::new(5);
        let mut processed = 0;
        for _ in 0..5 {
            tracker.increment();
            processed += 1;
            if !tracker.maybe_callback(Some(&callback), "step") {
                break;
            }
        }

        assert_eq!(processed, 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(tracker.is_cancelled());
    }

    #[test]
    fn test_callback_interval_throttles() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let callback: ProgressCallback = Box::new(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            true
        });

        let tracker = ProgressTracker::with_interval(10, Duration::from_secs(3600));
        for _ in 0..10 {
            tracker.increment();
            assert!(tracker.maybe_callback(Some(&callback), "step"));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
