#![cfg(test)]
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sitewatch_common::config::RunConfig;
use sitewatch_core::Orchestrator;
use sitewatch_core::store::{MemoryTargetStore, TargetStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::support::{DialSampler, ScriptedProber, fast_config, sites};

/// Stopping part-way keeps everything already decided and nothing else.
#[tokio::test]
async fn cancel_mid_run_keeps_completed_verdicts() -> anyhow::Result<()> {
    let store = Arc::new(MemoryTargetStore::new(sites(100)));
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(20)));
    let token = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orch = Orchestrator::new(fast_config(), prober, DialSampler::new(10.0, 30.0), store.clone())?
        .with_cancellation(token.clone())
        .with_events(tx);

    let listener = tokio::spawn(async move {
        let mut seen = Vec::new();
        let mut cancelled_at = None;
        while let Some(record) = rx.recv().await {
            seen.push(record.target);
            if seen.len() == 25 {
                cancelled_at = Some(Instant::now());
                token.cancel();
            }
        }
        (seen, cancelled_at)
    });

    let report = orch.run(store.load()?).await?;
    let finished_at = Instant::now();
    drop(orch);
    let (seen, cancelled_at) = listener.await?;

    let cancelled_at = cancelled_at.expect("run never reached 25 verdicts");
    assert!(
        finished_at.duration_since(cancelled_at) < Duration::from_secs(1),
        "run took {:?} to stop",
        finished_at.duration_since(cancelled_at)
    );

    assert!(report.cancelled);
    assert!(!report.aborted);
    assert_eq!(report.completed, seen.len());
    assert_eq!(report.dispatched, report.completed + report.abandoned);
    assert!(report.abandoned <= 4, "abandoned {}", report.abandoned);
    assert!(report.dispatched < 100);

    let persisted: HashSet<String> = store.persisted().into_keys().collect();
    let streamed: HashSet<String> = seen.into_iter().collect();
    assert_eq!(persisted, streamed);
    Ok(())
}

/// Probes waiting out the settle delay are dropped promptly and leave no mark.
#[tokio::test]
async fn cancel_during_settle_abandons_in_flight() -> anyhow::Result<()> {
    let store = Arc::new(MemoryTargetStore::new(sites(8)));
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(5)));
    let token = CancellationToken::new();
    let config = RunConfig {
        settle_delay: Duration::from_secs(10),
        ..fast_config()
    };
    let orch = Orchestrator::new(config, prober, DialSampler::new(10.0, 30.0), store.clone())?
        .with_cancellation(token.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let clock = Instant::now();
    let report = orch.run(store.load()?).await?;

    assert!(clock.elapsed() < Duration::from_secs(2), "run took {:?}", clock.elapsed());
    assert!(report.cancelled);
    assert_eq!(report.completed, 0);
    assert_eq!(report.abandoned, 4);
    assert_eq!(report.dispatched, 4);
    assert!(store.persisted().is_empty());
    Ok(())
}
