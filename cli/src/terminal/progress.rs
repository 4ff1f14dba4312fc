use indicatif::ProgressStyle;
use sitewatch_common::model::{Verdict, VerdictRecord};
use tracing::{Span, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

const BAR_TEMPLATE: &str =
    "{spinner:.blue} {msg:<18} [{bar:32.green/bright_black}] {pos}/{len} ({elapsed_precise}, eta {eta})";

/// Span whose lifetime drives the run progress bar.
pub fn run_span(label: &str, total: usize) -> Span {
    let span = info_span!("run");
    if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
        span.pb_set_style(&style.progress_chars("█▓░"));
    }
    span.pb_set_length(total as u64);
    span.pb_set_message(label);
    span
}

/// Advances the bar by one finished target.
pub fn advance(span: &Span, record: &VerdictRecord, reachable: usize, completed: usize) {
    span.pb_inc(1);
    let rate = if completed == 0 {
        0.0
    } else {
        reachable as f64 / completed as f64 * 100.0
    };
    let flag = if record.verdict == Verdict::ReachableHighGrowth { " !" } else { "" };
    span.pb_set_message(&format!("ok {reachable} ({rate:.0}%){flag}"));
}
