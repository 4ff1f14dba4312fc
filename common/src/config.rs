//! # Run Configuration
//!
//! [`RunConfig`] is read once before a run starts and never mutated while it is
//! in progress. Every consumer receives it behind an `Arc` or by reference.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_WORKERS: usize = 20;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(30);
pub const DEFAULT_CEILING_PERCENT: f64 = 80.0;
pub const DEFAULT_GROWTH_THRESHOLD_PERCENT: f64 = 50.0;
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_GOVERNOR_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_THROTTLE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_ABORT_AFTER_TICKS: u32 = 3;
pub const DEFAULT_FLUSH_EVERY: usize = 25;
pub const DEFAULT_PERSIST_RETRIES: u32 = 3;
pub const DEFAULT_PERSIST_RETRY_DELAY: Duration = Duration::from_secs(1);

/// What happens when the host stays above its resource ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CeilingPolicy {
    /// Warn and throttle, never abort.
    #[default]
    Soft,
    /// Abort the run after a streak of critical samples.
    Hard,
}

/// Which resource counters the sampler reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleScope {
    /// Whole-host CPU and memory utilization.
    #[default]
    Host,
    /// This process only, normalized to host capacity.
    Process,
}

impl FromStr for CeilingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "soft" => Ok(Self::Soft),
            "hard" => Ok(Self::Hard),
            _ => Err(format!("invalid ceiling policy '{s}' (expected soft or hard)")),
        }
    }
}

impl FromStr for SampleScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" => Ok(Self::Host),
            "process" => Ok(Self::Process),
            _ => Err(format!("invalid sample scope '{s}' (expected host or process)")),
        }
    }
}

impl fmt::Display for CeilingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Soft => f.write_str("soft"),
            Self::Hard => f.write_str("hard"),
        }
    }
}

impl fmt::Display for SampleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Process => f.write_str("process"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Upper bound on the number of unmarked targets taken into the run.
    pub limit: Option<usize>,
    /// Per-request timeout (connect + response headers).
    pub request_timeout: Duration,
    /// Hard wall-clock cap on a whole probe attempt.
    pub max_duration: Duration,
    pub workers: usize,
    pub cpu_ceiling_percent: f64,
    pub memory_ceiling_percent: f64,
    pub growth_threshold_percent: f64,
    /// Wait between a successful connection and the post sample.
    pub settle_delay: Duration,
    pub governor_interval: Duration,
    /// Base dispatch delay while the governor reports a throttled host.
    pub throttle_delay: Duration,
    pub ceiling_policy: CeilingPolicy,
    /// Consecutive critical governor ticks before a hard policy aborts.
    pub abort_after_ticks: u32,
    pub sample_scope: SampleScope,
    /// When false, reachable targets are never classified by resource growth.
    pub classify: bool,
    /// Flush buffered marks after this many verdicts.
    pub flush_every: usize,
    pub persist_retries: u32,
    pub persist_retry_delay: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            limit: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_duration: DEFAULT_MAX_DURATION,
            workers: DEFAULT_WORKERS,
            cpu_ceiling_percent: DEFAULT_CEILING_PERCENT,
            memory_ceiling_percent: DEFAULT_CEILING_PERCENT,
            growth_threshold_percent: DEFAULT_GROWTH_THRESHOLD_PERCENT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            governor_interval: DEFAULT_GOVERNOR_INTERVAL,
            throttle_delay: DEFAULT_THROTTLE_DELAY,
            ceiling_policy: CeilingPolicy::default(),
            abort_after_ticks: DEFAULT_ABORT_AFTER_TICKS,
            sample_scope: SampleScope::default(),
            classify: true,
            flush_every: DEFAULT_FLUSH_EVERY,
            persist_retries: DEFAULT_PERSIST_RETRIES,
            persist_retry_delay: DEFAULT_PERSIST_RETRY_DELAY,
        }
    }
}

impl RunConfig {
    /// Rejects configurations that cannot produce a meaningful run.
    ///
    /// Called before any probing starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }

        let threshold = self.growth_threshold_percent;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(threshold));
        }

        check_ceiling("cpu", self.cpu_ceiling_percent)?;
        check_ceiling("memory", self.memory_ceiling_percent)?;

        for (name, value) in [
            ("request timeout", self.request_timeout),
            ("max duration", self.max_duration),
            ("governor interval", self.governor_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }

        if self.flush_every == 0 {
            return Err(ConfigError::ZeroCount("flush interval"));
        }
        if self.abort_after_ticks == 0 {
            return Err(ConfigError::ZeroCount("abort streak"));
        }
        if self.limit == Some(0) {
            return Err(ConfigError::ZeroCount("target limit"));
        }

        Ok(())
    }
}

fn check_ceiling(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value <= 100.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidCeiling { name, value })
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
