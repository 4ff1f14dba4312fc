//! # Settings File
//!
//! `sitewatch.toml` holds the defaults for every run. Each section and field
//! is optional; missing values fall back to the built-in defaults, and
//! command-line flags override whatever the file says.
//!
//! ```toml
//! [probe]
//! timeout_secs = 10
//! max_duration_secs = 30
//!
//! [pool]
//! workers = 20
//!
//! [governor]
//! cpu_limit = 80
//! memory_limit = 80
//! policy = "soft"
//!
//! [classifier]
//! threshold = 50
//! settle_secs = 5
//!
//! [output]
//! dir = "results"
//! log_dir = "logs"
//! log_to_file = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;
use sitewatch_common::config::{self as defaults, CeilingPolicy, RunConfig, SampleScope};

pub const DEFAULT_SETTINGS_FILE: &str = "sitewatch.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub probe: ProbeSettings,
    pub pool: PoolSettings,
    pub governor: GovernorSettings,
    pub classifier: ClassifierSettings,
    pub persist: PersistSettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeSettings {
    pub timeout_secs: f64,
    pub max_duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    pub workers: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GovernorSettings {
    pub cpu_limit: f64,
    pub memory_limit: f64,
    pub interval_secs: f64,
    pub throttle_delay_secs: f64,
    pub policy: CeilingPolicy,
    pub abort_after: u32,
    pub scope: SampleScope,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierSettings {
    pub threshold: f64,
    pub settle_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PersistSettings {
    pub flush_every: usize,
    pub retries: u32,
    pub retry_delay_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub high_growth_file: String,
    /// Every scan or check also writes a timestamped log file here.
    pub log_dir: PathBuf,
    pub log_to_file: bool,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::DEFAULT_REQUEST_TIMEOUT.as_secs_f64(),
            max_duration_secs: defaults::DEFAULT_MAX_DURATION.as_secs_f64(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            workers: defaults::DEFAULT_WORKERS,
            limit: None,
        }
    }
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            cpu_limit: defaults::DEFAULT_CEILING_PERCENT,
            memory_limit: defaults::DEFAULT_CEILING_PERCENT,
            interval_secs: defaults::DEFAULT_GOVERNOR_INTERVAL.as_secs_f64(),
            throttle_delay_secs: defaults::DEFAULT_THROTTLE_DELAY.as_secs_f64(),
            policy: CeilingPolicy::default(),
            abort_after: defaults::DEFAULT_ABORT_AFTER_TICKS,
            scope: SampleScope::default(),
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            threshold: defaults::DEFAULT_GROWTH_THRESHOLD_PERCENT,
            settle_secs: defaults::DEFAULT_SETTLE_DELAY.as_secs_f64(),
        }
    }
}

impl Default for PersistSettings {
    fn default() -> Self {
        Self {
            flush_every: defaults::DEFAULT_FLUSH_EVERY,
            retries: defaults::DEFAULT_PERSIST_RETRIES,
            retry_delay_secs: defaults::DEFAULT_PERSIST_RETRY_DELAY.as_secs_f64(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("results"),
            high_growth_file: "mining_sites.txt".to_string(),
            log_dir: PathBuf::from("logs"),
            log_to_file: true,
        }
    }
}

impl OutputSettings {
    /// Where the run log goes, or `None` when file logging is off.
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_to_file.then_some(self.log_dir.as_path())
    }
}

impl Settings {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid settings file")
    }

    /// Reads `explicit` when given (it must exist), otherwise `sitewatch.toml`
    /// in the working directory when present, otherwise the defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_SETTINGS_FILE);
                if !fallback.is_file() {
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let text = fs::read_to_string(&path)
            .with_context(|| format!("cannot read settings file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Builds the immutable run configuration. `classify` is false for
    /// connectivity-only runs.
    pub fn run_config(&self, classify: bool) -> anyhow::Result<RunConfig> {
        let config = RunConfig {
            limit: self.pool.limit,
            request_timeout: secs("probe.timeout_secs", self.probe.timeout_secs)?,
            max_duration: secs("probe.max_duration_secs", self.probe.max_duration_secs)?,
            workers: self.pool.workers,
            cpu_ceiling_percent: self.governor.cpu_limit,
            memory_ceiling_percent: self.governor.memory_limit,
            growth_threshold_percent: self.classifier.threshold,
            settle_delay: secs("classifier.settle_secs", self.classifier.settle_secs)?,
            governor_interval: secs("governor.interval_secs", self.governor.interval_secs)?,
            throttle_delay: secs("governor.throttle_delay_secs", self.governor.throttle_delay_secs)?,
            ceiling_policy: self.governor.policy,
            abort_after_ticks: self.governor.abort_after,
            sample_scope: self.governor.scope,
            classify,
            flush_every: self.persist.flush_every,
            persist_retries: self.persist.retries,
            persist_retry_delay: secs("persist.retry_delay_secs", self.persist.retry_delay_secs)?,
        };
        config.validate()?;
        Ok(config)
    }
}

fn secs(name: &str, value: f64) -> anyhow::Result<Duration> {
    if value.is_sign_negative() {
        bail!("{name} must not be negative, got {value}");
    }
    Duration::try_from_secs_f64(value).with_context(|| format!("{name} is not a valid duration: {value}"))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
