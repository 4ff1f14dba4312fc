use chrono::{DateTime, Utc};
use serde::Serialize;

/// Point-in-time host resource reading.
///
/// Both figures are percentages of host capacity. Samples are never shared
/// between probe attempts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub taken_at: DateTime<Utc>,
}

impl ResourceSample {
    pub fn new(cpu_percent: f64, memory_percent: f64) -> Self {
        Self {
            cpu_percent,
            memory_percent,
            taken_at: Utc::now(),
        }
    }

    /// Best-effort stand-in used when nothing could be measured.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl Default for ResourceSample {
    fn default() -> Self {
        Self::zero()
    }
}
