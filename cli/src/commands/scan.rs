use std::fs;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Local;
use colored::*;
use sitewatch_common::config::RunConfig;
use sitewatch_common::error::RunError;
use sitewatch_common::model::{RunReport, Verdict};
use sitewatch_common::success;
use sitewatch_core::Orchestrator;
use sitewatch_core::orchestrator::RunPlan;
use sitewatch_core::prober::HttpProber;
use sitewatch_core::sampler::SystemSampler;
use sitewatch_core::store::{FileTargetStore, TargetStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, warn};

use crate::commands::RunArgs;
use crate::report::{self, ReportPaths};
use crate::settings::Settings;
use crate::terminal::input::InputHandle;
use crate::terminal::{colors, print, progress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Reachability plus resource-growth classification.
    Classify,
    /// Reachability only.
    Connectivity,
}

impl Mode {
    fn label(self) -> &'static str {
        match self {
            Mode::Classify => "scanning",
            Mode::Connectivity => "checking",
        }
    }
}

pub async fn scan(list: &Path, settings: Settings, args: &RunArgs, mode: Mode) -> anyhow::Result<()> {
    let config = settings.run_config(mode == Mode::Classify)?;

    let store = Arc::new(
        FileTargetStore::open(list).with_context(|| format!("cannot open target list {}", list.display()))?,
    );
    let targets = store.load()?;
    let prober = Arc::new(HttpProber::new().context("failed to build the http client")?);
    let sampler = Arc::new(SystemSampler::new(config.sample_scope));

    print_config(list, &config, mode, settings.output.log_dir());

    let token = CancellationToken::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(config, prober, sampler, store.clone())?
        .with_cancellation(token.clone())
        .with_events(tx);

    let plan = orchestrator.plan(&targets);
    if let Some(reason) = idle_reason(&plan) {
        print::nothing_to_do(reason);
        print::end_of_program();
        return Ok(());
    }

    let out_dir = &settings.output.dir;
    fs::create_dir_all(out_dir).with_context(|| format!("cannot create {}", out_dir.display()))?;
    let paths = ReportPaths::new(out_dir, Local::now(), &settings.output.high_growth_file);

    let span = progress::run_span(mode.label(), plan.eligible());
    let writer = tokio::spawn(report::stream_verdicts(rx, paths.results.clone(), span.clone()));

    let ctrl_c = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing in-flight probes");
                token.cancel();
            }
        })
    };
    let input = if !args.no_input && std::io::stdin().is_terminal() && console::user_attended() {
        match InputHandle::start(token.clone()) {
            Ok(handle) => {
                info!("press 'q' to stop early");
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "key listener unavailable");
                None
            }
        }
    } else {
        None
    };

    let outcome = orchestrator.run(targets).instrument(span).await;
    drop(orchestrator);
    drop(input);
    ctrl_c.abort();

    let records = writer.await.context("result writer stopped unexpectedly")??;
    let (report, unpersisted) = match outcome {
        Ok(report) => (report, None),
        Err(RunError::Unpersisted { count, report }) => (*report, Some(count)),
    };

    let reachable = report::write_reachable(&paths.reachable, &records)
        .with_context(|| format!("cannot write {}", paths.reachable.display()))?;
    if mode == Mode::Classify {
        let flagged = store
            .urls_with(Verdict::ReachableHighGrowth)
            .into_iter()
            .map(|url| format!("https://{url}"));
        let total = report::merge_high_growth(&paths.high_growth, flagged)
            .with_context(|| format!("cannot write {}", paths.high_growth.display()))?;
        info!("high-growth list now holds {total} sites ({})", paths.high_growth.display());
    }
    fs::write(&paths.summary, report::render_summary(list, &report, &records))
        .with_context(|| format!("cannot write {}", paths.summary.display()))?;

    print_report(&report, mode);
    success!("{reachable} reachable sites written to {}", paths.reachable.display());
    info!("verdict stream: {}", paths.results.display());
    info!("summary: {}", paths.summary.display());
    print::end_of_program();

    if let Some(count) = unpersisted {
        bail!("{count} verdicts could not be saved to {}; those targets stay unmarked", list.display());
    }
    Ok(())
}

/// Why a run would have nothing to probe, if that is the case.
fn idle_reason(plan: &RunPlan) -> Option<&'static str> {
    if plan.loaded == 0 {
        Some("the target list has no entries, nothing to probe")
    } else if plan.eligible() == 0 {
        Some("every target is already marked, nothing to probe")
    } else {
        None
    }
}

fn print_config(list: &Path, config: &RunConfig, mode: Mode, log_dir: Option<&Path>) {
    print::banner();
    print::header(if mode == Mode::Classify { "starting scan" } else { "starting check" });
    print::aligned_line("target list", list.display().to_string());
    print::aligned_line("workers", config.workers.to_string());
    print::aligned_line("timeout", format!("{:.1}s", config.request_timeout.as_secs_f64()));
    print::aligned_line("max duration", format!("{:.1}s", config.max_duration.as_secs_f64()));
    if let Some(limit) = config.limit {
        print::aligned_line("limit", limit.to_string());
    }
    print::aligned_line(
        "ceilings",
        format!(
            "cpu {:.0}% / memory {:.0}% ({})",
            config.cpu_ceiling_percent, config.memory_ceiling_percent, config.ceiling_policy
        ),
    );
    if mode == Mode::Classify {
        print::aligned_line("growth threshold", format!("{:.0}%", config.growth_threshold_percent));
        print::aligned_line("settle delay", format!("{:.1}s", config.settle_delay.as_secs_f64()));
        print::aligned_line("sample scope", config.sample_scope.to_string());
    } else {
        print::aligned_line("marks", "not written in connectivity mode");
    }
    if let Some(dir) = log_dir {
        print::aligned_line("run log", dir.display().to_string());
    }
    print::fat_separator();
}

fn print_report(report: &RunReport, mode: Mode) {
    print::header("results");
    print::aligned_line("checked", report.completed.to_string());
    print::aligned_line(
        "reachable",
        report.reachable().to_string().color(colors::REACHABLE).bold(),
    );
    if mode == Mode::Classify {
        print::as_tree_one_level(vec![
            ("low growth".to_string(), report.low_growth.to_string().color(colors::REACHABLE)),
            (
                "high growth".to_string(),
                report.high_growth.to_string().color(colors::HIGH_GROWTH).bold(),
            ),
        ]);
    }
    print::aligned_line(
        "unreachable",
        report.unreachable.to_string().color(colors::UNREACHABLE),
    );
    print::aligned_line("success rate", format!("{:.1}%", report.success_rate()));
    print::aligned_line("duration", format!("{:.1}s", report.elapsed.as_secs_f64()));
    if report.throttle_events > 0 {
        print::aligned_line("throttle events", report.throttle_events.to_string().color(colors::ACCENT));
    }
    if report.abandoned > 0 {
        print::aligned_line("abandoned", report.abandoned.to_string());
    }
    if report.aborted {
        print::print_status("run aborted: host stayed critically overloaded".color(colors::UNREACHABLE).to_string());
    } else if report.cancelled {
        print::print_status("run cancelled: unfinished targets stay unmarked");
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
