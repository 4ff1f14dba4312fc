//! # Domain Models
//!
//! * [`target`]: the sites being probed and their persisted marks.
//! * [`verdict`]: the terminal classification of a target.
//! * [`sample`]: point-in-time resource readings.
//! * [`attempt`]: the outcome of a single bounded probe.
//! * [`report`]: per-target records and the aggregated run report.

pub mod attempt;
pub mod report;
pub mod sample;
pub mod target;
pub mod verdict;

pub use attempt::{ProbeAttempt, ProbeErrorKind};
pub use report::{RunReport, VerdictRecord};
pub use sample::ResourceSample;
pub use target::Target;
pub use verdict::Verdict;
