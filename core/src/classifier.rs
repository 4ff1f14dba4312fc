//! # Growth Classifier
//!
//! Pure decision logic: compares the baseline and post-settle samples of an
//! attempt and turns the larger relative increase (CPU or memory) into a
//! [`Verdict`].

use sitewatch_common::model::{ProbeAttempt, ResourceSample, Verdict};

/// Floor applied to a baseline before dividing by it, in percentage points.
///
/// Keeps a near-idle host from turning a tiny absolute increase into an
/// enormous relative one.
pub const GROWTH_EPSILON: f64 = 1.0;

/// Relative resource increase between two samples, in percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Growth {
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl Growth {
    pub fn between(baseline: &ResourceSample, post: &ResourceSample) -> Self {
        Self {
            cpu_percent: relative_growth(baseline.cpu_percent, post.cpu_percent),
            memory_percent: relative_growth(baseline.memory_percent, post.memory_percent),
        }
    }

    /// The larger of the two deltas, never negative.
    pub fn peak(&self) -> f64 {
        self.cpu_percent.max(self.memory_percent).max(0.0)
    }
}

fn relative_growth(before: f64, after: f64) -> f64 {
    (after - before) / before.max(GROWTH_EPSILON) * 100.0
}

pub fn classify(
    attempt: &ProbeAttempt,
    baseline: &ResourceSample,
    post: &ResourceSample,
    threshold_percent: f64,
) -> Verdict {
    if !attempt.success {
        return Verdict::Unreachable;
    }

    if Growth::between(baseline, post).peak() > threshold_percent {
        Verdict::ReachableHighGrowth
    } else {
        Verdict::ReachableLowGrowth
    }
}

/// Verdict for runs with classification disabled: reachability only.
pub fn reachability_only(attempt: &ProbeAttempt) -> Verdict {
    if attempt.success {
        Verdict::ReachableLowGrowth
    } else {
        Verdict::Unreachable
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
