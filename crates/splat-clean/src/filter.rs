//! The filter contract shared by every pipeline step.

use crate::types::PointSet;

/// Result of running one filter over a point set.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// A new, smaller (or resampled) point set.
    Applied(PointSet),
    /// Nothing to do; the input stands as it was.
    NoOp(String),
    /// Applying the filter would empty the set; the caller keeps its input.
    Rejected(String),
}

impl FilterOutcome {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            FilterOutcome::Applied(_) => "applied",
            FilterOutcome::NoOp(_) => "no-op",
            FilterOutcome::Rejected(_) => "rejected",
        }
    }
}

/// A geometric filter over a [`PointSet`].
///
/// Filters never mutate their input. Parameter checks happen when the
/// filter is constructed, so `apply` itself cannot fail.
pub trait PointFilter: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the output loses the 1:1 correspondence to source rows.
    fn breaks_mapping(&self) -> bool {
        false
    }

    /// Run the filter.
    fn apply(&self, points: &PointSet) -> FilterOutcome;
}

/// Turn a keep-mask into an outcome: reject when nothing survives,
/// report a no-op when everything does.
pub(crate) fn outcome_from_mask(
    points: &PointSet,
    keep: &[bool],
    reject_reason: impl FnOnce() -> String,
) -> FilterOutcome {
    let kept = keep.iter().filter(|k| **k).count();
    if kept == 0 {
        FilterOutcome::Rejected(reject_reason())
    } else if kept == points.len() {
        FilterOutcome::NoOp("no points removed".to_string())
    } else {
        FilterOutcome::Applied(points.retain_mask(keep))
    }
}
