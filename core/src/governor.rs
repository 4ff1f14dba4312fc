//! # Resource Governor
//!
//! A single background task samples the host at a fixed interval for the
//! lifetime of a run and publishes a [`GovernorState`] snapshot through a
//! `watch` channel. The orchestrator and its workers only ever read that
//! snapshot through a [`GovernorView`].
//!
//! Ceilings are soft unless the run uses [`CeilingPolicy::Hard`]: crossing
//! them throttles dispatch and logs a warning. Under a hard policy a streak of
//! critical ticks turns into a request to abort the whole run.

use std::sync::Arc;
use std::time::Duration;

use sitewatch_common::config::{CeilingPolicy, RunConfig};
use sitewatch_common::model::ResourceSample;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::sampler::ResourceSampler;

/// Multiple of a ceiling past which the host counts as severely overloaded.
pub const CRITICAL_FACTOR: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ThrottleLevel {
    #[default]
    Normal,
    /// CPU or memory above its ceiling.
    Elevated,
    /// CPU or memory above [`CRITICAL_FACTOR`] times its ceiling.
    Critical,
}

impl ThrottleLevel {
    pub fn is_throttled(self) -> bool {
        self > ThrottleLevel::Normal
    }
}

/// Resource ceilings and what to do about them, taken from a [`RunConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub policy: CeilingPolicy,
    pub abort_after_ticks: u32,
}

impl Limits {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            cpu_percent: config.cpu_ceiling_percent,
            memory_percent: config.memory_ceiling_percent,
            policy: config.ceiling_policy,
            abort_after_ticks: config.abort_after_ticks,
        }
    }

    pub fn level_for(&self, sample: &ResourceSample) -> ThrottleLevel {
        let cpu = sample.cpu_percent;
        let memory = sample.memory_percent;

        if cpu > self.cpu_percent * CRITICAL_FACTOR || memory > self.memory_percent * CRITICAL_FACTOR {
            ThrottleLevel::Critical
        } else if cpu > self.cpu_percent || memory > self.memory_percent {
            ThrottleLevel::Elevated
        } else {
            ThrottleLevel::Normal
        }
    }
}

/// Snapshot published after every governor tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GovernorState {
    pub sample: ResourceSample,
    pub level: ThrottleLevel,
    /// Consecutive ticks spent at [`ThrottleLevel::Critical`].
    pub critical_streak: u32,
    /// Transitions from normal into a throttled level.
    pub throttle_events: u64,
    pub ticks: u64,
    /// Ticks where sampling failed and the previous state was kept.
    pub failed_ticks: u64,
}

impl GovernorState {
    /// Folds a fresh sample into the state.
    pub fn observe(&self, limits: &Limits, sample: ResourceSample) -> Self {
        let level = limits.level_for(&sample);
        let critical_streak = if level == ThrottleLevel::Critical {
            self.critical_streak.saturating_add(1)
        } else {
            0
        };
        let entered_throttle = level.is_throttled() && !self.level.is_throttled();

        Self {
            sample,
            level,
            critical_streak,
            throttle_events: self.throttle_events + u64::from(entered_throttle),
            ticks: self.ticks + 1,
            failed_ticks: self.failed_ticks,
        }
    }

    pub fn should_abort_all(&self, limits: &Limits) -> bool {
        limits.policy == CeilingPolicy::Hard && self.critical_streak >= limits.abort_after_ticks
    }
}

/// Read side of the governor, cheap to clone into every worker.
#[derive(Debug, Clone)]
pub struct GovernorView {
    rx: watch::Receiver<GovernorState>,
    limits: Limits,
}

impl GovernorView {
    pub fn state(&self) -> GovernorState {
        *self.rx.borrow()
    }

    /// Latest host reading; at most one governor interval old.
    pub fn latest_sample(&self) -> ResourceSample {
        self.rx.borrow().sample
    }

    pub fn level(&self) -> ThrottleLevel {
        self.rx.borrow().level
    }

    pub fn should_throttle(&self) -> bool {
        self.level().is_throttled()
    }

    pub fn should_abort_all(&self) -> bool {
        self.rx.borrow().should_abort_all(&self.limits)
    }

    /// Resolves on the next governor tick, or errors once the governor stops.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.rx.changed().await
    }
}

pub struct Governor {
    sampler: Arc<dyn ResourceSampler>,
    limits: Limits,
    interval: Duration,
}

impl Governor {
    pub fn new(sampler: Arc<dyn ResourceSampler>, config: &RunConfig) -> Self {
        Self {
            sampler,
            limits: Limits::from_config(config),
            interval: config.governor_interval,
        }
    }

    /// Takes the first reading and spawns the sampling loop.
    ///
    /// The returned handle must be stopped to end the loop.
    pub async fn start(self) -> GovernorHandle {
        let first = self.sampler.sample().await;
        let initial = GovernorState::default().observe(&self.limits, first);
        log_transition(&GovernorState::default(), &initial, &self.limits);

        let (tx, rx) = watch::channel(initial);
        let token = CancellationToken::new();
        let view = GovernorView {
            rx,
            limits: self.limits,
        };

        debug!(
            interval_ms = self.interval.as_millis() as u64,
            cpu_ceiling = self.limits.cpu_percent,
            memory_ceiling = self.limits.memory_percent,
            policy = %self.limits.policy,
            "governor started"
        );

        let task = tokio::spawn(self.watch(tx, token.clone()));
        GovernorHandle { view, task, token }
    }

    async fn watch(self, tx: watch::Sender<GovernorState>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and `start` already sampled.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = token.cancelled() => break,
                result = self.sampler.try_sample() => result,
            };

            match result {
                Ok(sample) => {
                    let previous = *tx.borrow();
                    let next = previous.observe(&self.limits, sample);
                    log_transition(&previous, &next, &self.limits);
                    tx.send_replace(next);
                }
                Err(e) => {
                    warn!(error = %e, "governor sample failed, holding previous state");
                    tx.send_modify(|state| state.failed_ticks += 1);
                }
            }
        }
    }
}

fn log_transition(previous: &GovernorState, next: &GovernorState, limits: &Limits) {
    let cpu = next.sample.cpu_percent;
    let memory = next.sample.memory_percent;

    match (previous.level, next.level) {
        (a, b) if a == b => {}
        (_, ThrottleLevel::Critical) => error!(
            "host severely over limits (cpu {cpu:.1}% / {:.0}%, memory {memory:.1}% / {:.0}%), throttling hard",
            limits.cpu_percent, limits.memory_percent
        ),
        (ThrottleLevel::Normal, ThrottleLevel::Elevated) => warn!(
            "host over limits (cpu {cpu:.1}% / {:.0}%, memory {memory:.1}% / {:.0}%), throttling",
            limits.cpu_percent, limits.memory_percent
        ),
        (ThrottleLevel::Critical, ThrottleLevel::Elevated) => {
            warn!("host load easing (cpu {cpu:.1}%, memory {memory:.1}%), still throttled")
        }
        (_, ThrottleLevel::Normal) => {
            info!("host back under limits (cpu {cpu:.1}%, memory {memory:.1}%)")
        }
        _ => {}
    }

    if next.should_abort_all(limits) && !previous.should_abort_all(limits) {
        error!(
            streak = next.critical_streak,
            "critical load persisted under hard limits, requesting abort"
        );
    }
}

/// Owner side of a running governor.
pub struct GovernorHandle {
    view: GovernorView,
    task: JoinHandle<()>,
    token: CancellationToken,
}

impl GovernorHandle {
    pub fn view(&self) -> GovernorView {
        self.view.clone()
    }

    /// Ends the sampling loop and returns the final snapshot.
    pub async fn stop(self) -> GovernorState {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "governor task did not shut down cleanly");
        }
        let state = self.view.state();
        debug!(ticks = state.ticks, failed = state.failed_ticks, "governor stopped");
        state
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
