//! # Error Taxonomy
//!
//! Per-target failures never show up here: they are folded into
//! [`ProbeAttempt`](crate::model::attempt::ProbeAttempt) and the resulting
//! verdict. Only run-level structural failures are errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::report::RunReport;

/// Invalid run configuration, detected before any probing starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    ZeroWorkers,

    #[error("growth threshold must be a positive finite percentage, got {0}")]
    InvalidThreshold(f64),

    #[error("{name} ceiling must be within (0, 100], got {value}")]
    InvalidCeiling { name: &'static str, value: f64 },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("{0} must be at least 1")]
    ZeroCount(&'static str),
}

/// Failure to read or persist the target list.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read target list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write target list {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: invalid mark '{value}'")]
    InvalidMark { line: usize, value: String },

    #[error("target '{0}' is not in the list")]
    UnknownTarget(String),

    #[error("target store unavailable: {0}")]
    Unavailable(String),
}

/// Run-level failure surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum RunError {
    /// The run finished but some verdicts never reached the store.
    #[error("{count} verdicts could not be persisted")]
    Unpersisted { count: usize, report: Box<RunReport> },
}

impl RunError {
    /// The report of the run, which finished despite the error.
    pub fn report(&self) -> &RunReport {
        match self {
            Self::Unpersisted { report, .. } => report,
        }
    }
}
