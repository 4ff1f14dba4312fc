//! # Sitewatch Common
//!
//! Types shared by every crate in the workspace.
//!
//! * **[`model`]**: targets, verdicts, resource samples, probe attempts and run reports.
//! * **[`config`]**: the immutable per-run configuration and its validation.
//! * **[`error`]**: the run-level error taxonomy.
//! * **[`log`]**: logging macros layered on top of `tracing`.

pub mod config;
pub mod error;
pub mod log;
pub mod model;
