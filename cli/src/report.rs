//! # Report Writers
//!
//! Files produced by a run, all under the output directory:
//!
//! * `results_<stamp>.jsonl`: one verdict record per line, written as they arrive.
//! * `reachable_<stamp>.txt`: URLs that answered during this run.
//! * `summary_<stamp>.txt`: counts and the notable sites in plain text.
//! * the high-growth list (`mining_sites.txt` by default), merged across runs.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local};
use sitewatch_common::model::{RunReport, Verdict, VerdictRecord};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::Span;

use crate::terminal::progress;

const UNREACHABLE_SHOWN: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct ReportPaths {
    pub results: PathBuf,
    pub reachable: PathBuf,
    pub summary: PathBuf,
    pub high_growth: PathBuf,
}

impl ReportPaths {
    pub fn new(dir: &Path, started: DateTime<Local>, high_growth_file: &str) -> Self {
        let stamp = started.format("%Y%m%d_%H%M%S");
        Self {
            results: dir.join(format!("results_{stamp}.jsonl")),
            reachable: dir.join(format!("reachable_{stamp}.txt")),
            summary: dir.join(format!("summary_{stamp}.txt")),
            high_growth: dir.join(high_growth_file),
        }
    }
}

/// Writes every streamed record to `path` as JSON lines until the sender is
/// dropped, and hands the records back for the final reports.
pub async fn stream_verdicts(
    mut rx: mpsc::UnboundedReceiver<VerdictRecord>,
    path: PathBuf,
    span: Span,
) -> anyhow::Result<Vec<VerdictRecord>> {
    let file = tokio::fs::File::create(&path)
        .await
        .with_context(|| format!("cannot create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut records = Vec::new();
    let mut reachable = 0;

    while let Some(record) = rx.recv().await {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;

        if record.verdict.is_reachable() {
            reachable += 1;
        }
        progress::advance(&span, &record, reachable, records.len() + 1);
        records.push(record);
    }

    writer.flush().await?;
    Ok(records)
}

/// One reachable URL per line, in completion order.
pub fn write_reachable(path: &Path, records: &[VerdictRecord]) -> io::Result<usize> {
    let mut out = String::new();
    let mut count = 0;
    for record in records.iter().filter(|r| r.verdict.is_reachable()) {
        let url = record
            .final_url
            .clone()
            .unwrap_or_else(|| format!("https://{}", record.target));
        out.push_str(&url);
        out.push('\n');
        count += 1;
    }
    fs::write(path, out)?;
    Ok(count)
}

/// Merges `urls` into the list at `path`, keeping it sorted and free of
/// repeats. Returns the size of the merged list.
pub fn merge_high_growth<I>(path: &Path, urls: I) -> io::Result<usize>
where
    I: IntoIterator<Item = String>,
{
    let mut merged: BTreeSet<String> = match fs::read_to_string(path) {
        Ok(existing) => existing
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeSet::new(),
        Err(e) => return Err(e),
    };
    merged.extend(urls);

    let mut out = String::new();
    for url in &merged {
        out.push_str(url);
        out.push('\n');
    }
    fs::write(path, out)?;
    Ok(merged.len())
}

pub fn render_summary(list: &Path, report: &RunReport, records: &[VerdictRecord]) -> String {
    Summary { list, report, records }.to_string()
}

/// Plain-text run summary.
struct Summary<'a> {
    list: &'a Path,
    report: &'a RunReport,
    records: &'a [VerdictRecord],
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Summary { list, report, records } = *self;
        let rule = "=".repeat(60);

        writeln!(out, "{rule}")?;
        writeln!(out, "sitewatch run summary")?;
        writeln!(out, "{rule}")?;
        writeln!(out, "target list:      {}", list.display())?;
        writeln!(out, "loaded:           {}", report.loaded)?;
        writeln!(out, "already marked:   {}", report.skipped_marked)?;
        writeln!(out, "duplicates:       {}", report.duplicates)?;
        writeln!(out, "checked:          {}", report.completed)?;
        writeln!(out, "reachable:        {}", report.reachable())?;
        writeln!(out, "  low growth:     {}", report.low_growth)?;
        writeln!(out, "  high growth:    {}", report.high_growth)?;
        writeln!(out, "unreachable:      {}", report.unreachable)?;
        writeln!(out, "success rate:     {:.1}%", report.success_rate())?;
        writeln!(out, "duration:         {:.1}s", report.elapsed.as_secs_f64())?;
        writeln!(out, "mean probe time:  {:.2}s", report.mean_probe_time().as_secs_f64())?;
        writeln!(out, "throttle events:  {}", report.throttle_events)?;
        if report.abandoned > 0 {
            writeln!(out, "abandoned:        {}", report.abandoned)?;
        }
        if report.is_interrupted() {
            let reason = if report.aborted { "aborted (host overloaded)" } else { "cancelled" };
            writeln!(out, "status:           {reason}")?;
        }
        if report.unpersisted > 0 {
            writeln!(out, "NOT SAVED:        {} verdicts", report.unpersisted)?;
        }

        if !report.errors.is_empty() {
            writeln!(out, "\nerrors by kind:")?;
            for (kind, count) in &report.errors {
                writeln!(out, "  {kind}: {count}")?;
            }
        }

        let flagged: Vec<_> = records
            .iter()
            .filter(|r| r.verdict == Verdict::ReachableHighGrowth)
            .collect();
        if !flagged.is_empty() {
            writeln!(out, "\nhigh resource growth:")?;
            for r in flagged {
                writeln!(
                    out,
                    "  {} (cpu {:+.1}%, memory {:+.1}%)",
                    r.target, r.cpu_growth_percent, r.memory_growth_percent
                )?;
            }
        }

        let reachable: Vec<_> = records.iter().filter(|r| r.verdict.is_reachable()).collect();
        if !reachable.is_empty() {
            writeln!(out, "\nreachable sites:")?;
            for r in reachable {
                let status = r.status.map_or_else(|| "-".to_string(), |s| s.to_string());
                writeln!(out, "  {} [{}] {} ms", r.target, status, r.elapsed_ms)?;
            }
        }

        let unreachable: Vec<_> = records.iter().filter(|r| !r.verdict.is_reachable()).collect();
        if !unreachable.is_empty() {
            writeln!(out, "\nunreachable sites (first {UNREACHABLE_SHOWN}):")?;
            for r in unreachable.iter().take(UNREACHABLE_SHOWN) {
                writeln!(out, "  {}: {}", r.target, r.error.as_deref().unwrap_or("unknown error"))?;
            }
            if unreachable.len() > UNREACHABLE_SHOWN {
                writeln!(out, "  ... and {} more", unreachable.len() - UNREACHABLE_SHOWN)?;
            }
        }

        Ok(())
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
