pub mod reset;
pub mod scan;
pub mod status;

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use sitewatch_common::config::SampleScope;
use sitewatch_common::model::Verdict;

use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "sitewatch")]
#[command(version)]
#[command(about = "Probe site lists for reachability and flag suspicious resource growth.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// Only print warnings, errors and the final summary
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More log output (-v, -vv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Probe every unmarked target and classify resource growth
    #[command(alias = "s")]
    Scan {
        /// Target list, one site per line with an optional ",mark"
        list: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Connectivity check only, no resource classification
    #[command(alias = "c")]
    Check {
        list: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Show how many targets carry each mark
    #[command(alias = "st")]
    Status { list: PathBuf },
    /// Clear marks so targets are probed again
    #[command(alias = "r")]
    Reset {
        list: PathBuf,
        /// Only clear this verdict (0/1/2, unreachable, low, high)
        #[arg(long)]
        only: Option<Verdict>,
    },
}

/// Run flags. Anything given here overrides the settings file.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Stop after this many unmarked targets
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<f64>,

    /// Concurrent probes
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// CPU ceiling in percent
    #[arg(long = "cpu-limit")]
    pub cpu_limit: Option<f64>,

    /// Memory ceiling in percent
    #[arg(long = "memory-limit")]
    pub memory_limit: Option<f64>,

    /// Hard cap on a whole probe attempt, in seconds
    #[arg(long = "max-duration")]
    pub max_duration: Option<f64>,

    /// Growth (percent) above which a reachable site is flagged
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Wait after connecting before the second sample, in seconds
    #[arg(long)]
    pub settle: Option<f64>,

    /// Abort the run when the host stays critically overloaded
    #[arg(long = "hard-limits")]
    pub hard_limits: bool,

    /// Measure the whole host or only this process
    #[arg(long)]
    pub scope: Option<SampleScope>,

    /// Settings file (defaults to ./sitewatch.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for result files
    #[arg(short, long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    /// Do not listen for the 'q' key
    #[arg(long = "no-input")]
    pub no_input: bool,

    /// Log to the terminal only, without a run log file
    #[arg(long = "no-log-file")]
    pub no_log_file: bool,
}

impl RunArgs {
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(limit) = self.limit {
            settings.pool.limit = Some(limit);
        }
        if let Some(workers) = self.workers {
            settings.pool.workers = workers;
        }
        if let Some(timeout) = self.timeout {
            settings.probe.timeout_secs = timeout;
        }
        if let Some(max_duration) = self.max_duration {
            settings.probe.max_duration_secs = max_duration;
        }
        if let Some(cpu) = self.cpu_limit {
            settings.governor.cpu_limit = cpu;
        }
        if let Some(memory) = self.memory_limit {
            settings.governor.memory_limit = memory;
        }
        if self.hard_limits {
            settings.governor.policy = sitewatch_common::config::CeilingPolicy::Hard;
        }
        if let Some(scope) = self.scope {
            settings.governor.scope = scope;
        }
        if let Some(threshold) = self.threshold {
            settings.classifier.threshold = threshold;
        }
        if let Some(settle) = self.settle {
            settings.classifier.settle_secs = settle;
        }
        if let Some(dir) = &self.output_dir {
            settings.output.dir = dir.clone();
        }
        if self.no_log_file {
            settings.output.log_to_file = false;
        }
        settings
    }
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
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
