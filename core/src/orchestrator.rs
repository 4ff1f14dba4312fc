//! # Worker Pool Orchestrator
//!
//! Drives a whole run: plans the queue from the target list, keeps a bounded
//! number of probes in flight, consults the [`governor`](crate::governor)
//! before every dispatch, and folds finished attempts into verdicts, store
//! marks and the [`RunReport`].
//!
//! All store writes happen on the dispatching task. Workers only probe, wait
//! and classify; their samples come from the governor snapshot. Runs with
//! classification disabled leave the store untouched.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sitewatch_common::config::RunConfig;
use sitewatch_common::error::{ConfigError, RunError};
use sitewatch_common::model::{RunReport, Target, Verdict, VerdictRecord};
use sitewatch_common::success;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::classifier::{self, Growth};
use crate::governor::{Governor, GovernorView, ThrottleLevel};
use crate::prober::Prober;
use crate::sampler::ResourceSampler;
use crate::store::TargetStore;

const MILESTONES: [usize; 4] = [25, 50, 75, 100];

/// The queue a run will work through, plus what was filtered out of it.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub queue: Vec<Target>,
    pub loaded: usize,
    pub skipped_marked: usize,
    pub duplicates: usize,
}

impl RunPlan {
    /// Skips marked targets, drops repeated URLs and applies the limit to
    /// what is left, in list order.
    pub fn new(targets: &[Target], limit: Option<usize>) -> Self {
        let mut plan = RunPlan {
            loaded: targets.len(),
            ..RunPlan::default()
        };

        let mut seen: HashSet<&str> = HashSet::new();
        for target in targets.iter().filter(|t| t.is_marked()) {
            plan.skipped_marked += 1;
            seen.insert(target.url());
        }

        for target in targets.iter().filter(|t| !t.is_marked()) {
            if !seen.insert(target.url()) {
                plan.duplicates += 1;
                continue;
            }
            if limit.is_some_and(|max| plan.queue.len() >= max) {
                continue;
            }
            plan.queue.push(target.clone());
        }

        plan
    }

    pub fn eligible(&self) -> usize {
        self.queue.len()
    }
}

/// Slots usable at a given throttle level.
pub fn effective_workers(workers: usize, level: ThrottleLevel) -> usize {
    match level {
        ThrottleLevel::Normal => workers,
        ThrottleLevel::Elevated => workers.div_ceil(2),
        ThrottleLevel::Critical => 1,
    }
}

/// Pause before the next dispatch at a given throttle level.
pub fn dispatch_delay(base: Duration, level: ThrottleLevel) -> Option<Duration> {
    match level {
        ThrottleLevel::Normal => None,
        ThrottleLevel::Elevated => Some(base),
        ThrottleLevel::Critical => Some(base * 2),
    }
}

pub struct Orchestrator {
    config: Arc<RunConfig>,
    prober: Arc<dyn Prober>,
    sampler: Arc<dyn ResourceSampler>,
    store: Arc<dyn TargetStore>,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<VerdictRecord>>,
}

impl Orchestrator {
    /// Validates `config`; nothing is probed when it is rejected.
    pub fn new(
        config: RunConfig,
        prober: Arc<dyn Prober>,
        sampler: Arc<dyn ResourceSampler>,
        store: Arc<dyn TargetStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            prober,
            sampler,
            store,
            cancel: CancellationToken::new(),
            events: None,
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Streams every verdict record as soon as it is final.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<VerdictRecord>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn plan(&self, targets: &[Target]) -> RunPlan {
        RunPlan::new(targets, self.config.limit)
    }

    pub async fn run(&self, targets: Vec<Target>) -> Result<RunReport, RunError> {
        let started = Instant::now();
        let plan = self.plan(&targets);
        drop(targets);

        let mut collector = Collector::new(self, &plan);
        info!(
            "{} targets loaded, {} already marked, {} duplicates, {} queued",
            plan.loaded,
            plan.skipped_marked,
            plan.duplicates,
            plan.eligible()
        );

        let governor = Governor::new(Arc::clone(&self.sampler), &self.config).start().await;
        let run_token = self.cancel.child_token();
        let ctx = Arc::new(WorkerContext {
            config: Arc::clone(&self.config),
            prober: Arc::clone(&self.prober),
            view: governor.view(),
            token: run_token.clone(),
        });

        let mut queue: VecDeque<Target> = plan.queue.into();
        let mut tasks: JoinSet<WorkerOutcome> = JoinSet::new();
        let mut ticks = governor.view();

        loop {
            while let Some(joined) = tasks.try_join_next() {
                collector.absorb(joined);
            }

            if ctx.view.should_abort_all() && !run_token.is_cancelled() {
                error!("host stayed critically overloaded, aborting the run");
                collector.report.aborted = true;
                run_token.cancel();
            }
            if run_token.is_cancelled() {
                if self.cancel.is_cancelled() {
                    warn!("run cancelled, {} targets left undispatched", queue.len());
                    collector.report.cancelled = true;
                }
                break;
            }
            if queue.is_empty() {
                break;
            }

            let level = ctx.view.level();
            if tasks.len() >= effective_workers(self.config.workers, level) {
                // A full pool still re-checks the abort streak on every tick.
                tokio::select! {
                    _ = run_token.cancelled() => {}
                    Some(joined) = tasks.join_next() => collector.absorb(joined),
                    Ok(()) = ticks.changed() => {}
                }
                continue;
            }

            if let Some(delay) = dispatch_delay(self.config.throttle_delay, level) {
                debug!(?level, delay_ms = delay.as_millis() as u64, "throttled dispatch");
                tokio::select! {
                    _ = run_token.cancelled() => continue,
                    _ = tokio::time::sleep(delay) => {}
                }
                // Load may have changed while waiting.
                if ctx.view.should_abort_all() || tasks.len() >= effective_workers(self.config.workers, ctx.view.level()) {
                    continue;
                }
            }

            let Some(target) = queue.pop_front() else { break };
            collector.report.dispatched += 1;
            tasks.spawn(probe_one(Arc::clone(&ctx), target));
        }

        if !tasks.is_empty() {
            debug!(in_flight = tasks.len(), "waiting for in-flight probes");
        }
        while let Some(joined) = tasks.join_next().await {
            collector.absorb(joined);
        }

        let governor_state = governor.stop().await;
        let lost = collector.lost;
        let mut report = collector.finish();
        report.throttle_events = governor_state.throttle_events;
        report.elapsed = started.elapsed();
        report.unpersisted = self.final_flush().await + lost;

        log_summary(&report);
        if report.unpersisted > 0 {
            return Err(RunError::Unpersisted {
                count: report.unpersisted,
                report: Box::new(report),
            });
        }
        Ok(report)
    }

    /// Flushes with exponential backoff; returns what is still buffered.
    async fn final_flush(&self) -> usize {
        let attempts = self.config.persist_retries.max(1);
        let mut delay = self.config.persist_retry_delay;

        for attempt in 1..=attempts {
            match self.store.flush() {
                Ok(written) => {
                    debug!(written, "final flush complete");
                    return 0;
                }
                Err(e) if attempt < attempts => {
                    error!(attempt, error = %e, "final flush failed, retrying in {:.1}s", delay.as_secs_f64());
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    error!(attempt, error = %e, "final flush failed, giving up");
                }
            }
        }
        self.store.pending()
    }
}

struct WorkerContext {
    config: Arc<RunConfig>,
    prober: Arc<dyn Prober>,
    view: GovernorView,
    token: CancellationToken,
}

enum WorkerOutcome {
    Verdict { record: VerdictRecord, probe_time: Duration },
    Abandoned { url: String },
}

async fn probe_one(ctx: Arc<WorkerContext>, target: Target) -> WorkerOutcome {
    let config = &ctx.config;
    let baseline = ctx.view.latest_sample();

    let attempt = ctx
        .prober
        .probe(&target, config.request_timeout, config.max_duration)
        .await;
    let probe_time = attempt.elapsed;

    if ctx.token.is_cancelled() {
        return WorkerOutcome::Abandoned {
            url: target.url().to_string(),
        };
    }

    let (verdict, post) = if !config.classify {
        (classifier::reachability_only(&attempt), baseline)
    } else if attempt.success {
        if !config.settle_delay.is_zero() {
            tokio::select! {
                _ = ctx.token.cancelled() => {
                    return WorkerOutcome::Abandoned { url: target.url().to_string() };
                }
                _ = tokio::time::sleep(config.settle_delay) => {}
            }
        }
        let post = ctx.view.latest_sample();
        let verdict = classifier::classify(&attempt, &baseline, &post, config.growth_threshold_percent);
        (verdict, post)
    } else {
        (Verdict::Unreachable, ctx.view.latest_sample())
    };

    let growth = Growth::between(&baseline, &post);
    let record = VerdictRecord::new(&attempt, verdict, baseline, post, growth.cpu_percent, growth.memory_percent);
    WorkerOutcome::Verdict { record, probe_time }
}

/// Folds worker outcomes into the report and the store.
struct Collector<'a> {
    store: &'a dyn TargetStore,
    events: Option<&'a mpsc::UnboundedSender<VerdictRecord>>,
    report: RunReport,
    recorded: HashSet<String>,
    /// False for connectivity-only runs: their verdicts carry no growth
    /// measurement and must not mark targets.
    persist: bool,
    /// Verdicts the store refused outright.
    lost: usize,
    since_flush: usize,
    flush_every: usize,
    next_milestone: usize,
}

impl<'a> Collector<'a> {
    fn new(orchestrator: &'a Orchestrator, plan: &RunPlan) -> Self {
        Self {
            store: orchestrator.store.as_ref(),
            events: orchestrator.events.as_ref(),
            report: RunReport {
                loaded: plan.loaded,
                skipped_marked: plan.skipped_marked,
                duplicates: plan.duplicates,
                eligible: plan.eligible(),
                ..RunReport::default()
            },
            recorded: HashSet::new(),
            persist: orchestrator.config.classify,
            lost: 0,
            since_flush: 0,
            flush_every: orchestrator.config.flush_every,
            next_milestone: 0,
        }
    }

    fn absorb(&mut self, joined: Result<WorkerOutcome, JoinError>) {
        match joined {
            Ok(WorkerOutcome::Verdict { record, probe_time }) => self.accept(record, probe_time),
            Ok(WorkerOutcome::Abandoned { url }) => {
                debug!(%url, "result discarded after interruption");
                self.report.abandoned += 1;
            }
            Err(e) => {
                error!(error = %e, "probe task failed");
                self.report.abandoned += 1;
            }
        }
    }

    fn accept(&mut self, record: VerdictRecord, probe_time: Duration) {
        if !self.recorded.insert(record.target.clone()) {
            warn!(site = %record.target, "second verdict for the same target ignored");
            self.report.abandoned += 1;
            return;
        }

        match record.verdict {
            Verdict::ReachableHighGrowth => warn!(
                "{} reachable, resource growth cpu {:.1}% / memory {:.1}%, flagged",
                record.target, record.cpu_growth_percent, record.memory_growth_percent
            ),
            Verdict::ReachableLowGrowth => success!(
                "{} reachable (status {}, {} ms)",
                record.target,
                record.status.map_or_else(|| "-".to_string(), |s| s.to_string()),
                record.elapsed_ms
            ),
            Verdict::Unreachable => debug!(
                site = %record.target,
                kind = ?record.error_kind,
                error = record.error.as_deref().unwrap_or(""),
                "unreachable"
            ),
        }

        self.report.record(&record, probe_time);
        if self.persist {
            self.store_mark(&record);
        }
        if let Some(tx) = self.events {
            if tx.send(record).is_err() {
                debug!("verdict stream receiver closed");
            }
        }

        self.log_milestone();
    }

    fn store_mark(&mut self, record: &VerdictRecord) {
        if let Err(e) = self.store.record(&record.target, record.verdict) {
            error!(site = %record.target, error = %e, "verdict could not be stored");
            self.lost += 1;
        }

        self.since_flush += 1;
        if self.since_flush >= self.flush_every {
            self.since_flush = 0;
            match self.store.flush() {
                Ok(written) => debug!(written, "marks flushed"),
                Err(e) => error!(error = %e, pending = self.store.pending(), "flush failed, marks kept for retry"),
            }
        }
    }

    fn log_milestone(&mut self) {
        let eligible = self.report.eligible;
        if eligible == 0 {
            return;
        }
        let percent = self.report.completed * 100 / eligible;

        let mut reached = None;
        while let Some(&milestone) = MILESTONES.get(self.next_milestone) {
            if percent < milestone {
                break;
            }
            reached = Some(milestone);
            self.next_milestone += 1;
        }

        if let Some(milestone) = reached {
            info!(
                "progress {milestone}% ({}/{}), reachable {}, success rate {:.1}%",
                self.report.completed,
                eligible,
                self.report.reachable(),
                self.report.success_rate()
            );
        }
    }

    fn finish(self) -> RunReport {
        self.report
    }
}

fn log_summary(report: &RunReport) {
    let outcome = if report.aborted {
        "aborted"
    } else if report.cancelled {
        "cancelled"
    } else {
        "finished"
    };
    info!(
        "run {outcome} in {:.1}s: {} dispatched, {} unreachable, {} low growth, {} high growth, {} abandoned",
        report.elapsed.as_secs_f64(),
        report.dispatched,
        report.unreachable,
        report.low_growth,
        report.high_growth,
        report.abandoned
    );
    if report.throttle_events > 0 {
        info!("host load throttled dispatch {} times", report.throttle_events);
    }
    if report.unpersisted > 0 {
        error!("{} verdicts were not persisted", report.unpersisted);
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
