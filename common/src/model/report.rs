//! # Run Results
//!
//! [`VerdictRecord`] is the machine-readable per-target output streamed while a
//! run progresses. [`RunReport`] aggregates those records for the summary.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::attempt::{ProbeAttempt, ProbeErrorKind};
use crate::model::sample::ResourceSample;
use crate::model::verdict::Verdict;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerdictRecord {
    pub target: String,
    pub verdict: Verdict,
    pub mark: u8,
    pub final_url: Option<String>,
    pub status: Option<u16>,
    pub redirect_host: Option<String>,
    pub error_kind: Option<ProbeErrorKind>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub baseline: ResourceSample,
    pub post: ResourceSample,
    pub cpu_growth_percent: f64,
    pub memory_growth_percent: f64,
    pub checked_at: DateTime<Utc>,
}

impl VerdictRecord {
    pub fn new(
        attempt: &ProbeAttempt,
        verdict: Verdict,
        baseline: ResourceSample,
        post: ResourceSample,
        cpu_growth_percent: f64,
        memory_growth_percent: f64,
    ) -> Self {
        Self {
            target: attempt.target.clone(),
            verdict,
            mark: verdict.mark(),
            final_url: attempt.final_url.clone(),
            status: attempt.status,
            redirect_host: attempt.redirect_host.clone(),
            error_kind: attempt.error_kind,
            error: attempt.error.clone(),
            elapsed_ms: u64::try_from(attempt.elapsed.as_millis()).unwrap_or(u64::MAX),
            baseline,
            post,
            cpu_growth_percent,
            memory_growth_percent,
            checked_at: attempt.started_at,
        }
    }
}

/// Aggregated outcome of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Records handed to the run.
    pub loaded: usize,
    /// Records skipped because an earlier run already marked them.
    pub skipped_marked: usize,
    /// Records dropped because their normalized URL was already queued.
    pub duplicates: usize,
    /// Targets queued for this run after marks, duplicates and the limit.
    pub eligible: usize,
    pub dispatched: usize,
    /// Targets that produced a verdict.
    pub completed: usize,
    /// Targets dispatched but given up on because the run was interrupted.
    pub abandoned: usize,
    pub unreachable: usize,
    pub low_growth: usize,
    pub high_growth: usize,
    /// Failure (and recovery) kinds seen across all verdicts.
    pub errors: BTreeMap<ProbeErrorKind, usize>,
    pub throttle_events: u64,
    pub elapsed: Duration,
    pub total_probe_time: Duration,
    pub max_probe_time: Duration,
    pub cancelled: bool,
    pub aborted: bool,
    pub unpersisted: usize,
}

impl RunReport {
    pub fn record(&mut self, record: &VerdictRecord, probe_time: Duration) {
        self.completed += 1;
        match record.verdict {
            Verdict::Unreachable => self.unreachable += 1,
            Verdict::ReachableLowGrowth => self.low_growth += 1,
            Verdict::ReachableHighGrowth => self.high_growth += 1,
        }
        if let Some(kind) = record.error_kind {
            *self.errors.entry(kind).or_default() += 1;
        }
        self.total_probe_time += probe_time;
        self.max_probe_time = self.max_probe_time.max(probe_time);
    }

    pub fn count(&self, verdict: Verdict) -> usize {
        match verdict {
            Verdict::Unreachable => self.unreachable,
            Verdict::ReachableLowGrowth => self.low_growth,
            Verdict::ReachableHighGrowth => self.high_growth,
        }
    }

    pub fn verdicts(&self) -> usize {
        self.unreachable + self.low_growth + self.high_growth
    }

    pub fn reachable(&self) -> usize {
        self.low_growth + self.high_growth
    }

    /// Share of completed targets that were reachable, as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.completed == 0 {
            return 0.0;
        }
        self.reachable() as f64 / self.completed as f64 * 100.0
    }

    pub fn mean_probe_time(&self) -> Duration {
        match u32::try_from(self.completed) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.total_probe_time / n,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.cancelled || self.aborted
    }
}
