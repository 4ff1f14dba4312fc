#![cfg(test)]
use std::sync::Arc;
use std::time::Duration;

use sitewatch_common::config::{CeilingPolicy, RunConfig};
use sitewatch_core::Orchestrator;
use sitewatch_core::store::{MemoryTargetStore, TargetStore};

use crate::support::{DialSampler, ScriptedProber, fast_config, sites};

/*************************************************************
                      Soft ceilings
**************************************************************/

/// Host above its CPU ceiling: dispatch slows down but every target still
/// completes.
#[tokio::test]
async fn elevated_load_spaces_out_dispatch() -> anyhow::Result<()> {
    let store = Arc::new(MemoryTargetStore::new(sites(6)));
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(5)));
    let config = RunConfig {
        throttle_delay: Duration::from_millis(40),
        ..fast_config()
    };
    let orch = Orchestrator::new(config, prober.clone(), DialSampler::new(95.0, 30.0), store.clone())?;

    let report = orch.run(store.load()?).await?;

    assert_eq!(report.completed, 6);
    assert!(!report.aborted);
    assert!(report.throttle_events >= 1);

    let times = prober.call_times();
    let min_gap = times
        .windows(2)
        .map(|pair| pair[1].duration_since(pair[0]))
        .min()
        .unwrap();
    assert!(min_gap >= Duration::from_millis(30), "dispatches only {min_gap:?} apart");
    Ok(())
}

/// Far above the ceiling the pool drops to a single probe at a time.
#[tokio::test]
async fn critical_load_serializes_probes() -> anyhow::Result<()> {
    let store = Arc::new(MemoryTargetStore::new(sites(5)));
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(20)));
    let config = RunConfig {
        throttle_delay: Duration::from_millis(1),
        ..fast_config()
    };
    let orch = Orchestrator::new(config, prober.clone(), DialSampler::new(99.0, 30.0), store.clone())?;

    let report = orch.run(store.load()?).await?;

    assert_eq!(report.completed, 5);
    assert_eq!(prober.max_concurrency(), 1);
    Ok(())
}

/// Without a hard policy even sustained critical load never aborts.
#[tokio::test]
async fn soft_policy_never_aborts() -> anyhow::Result<()> {
    let store = Arc::new(MemoryTargetStore::new(sites(4)));
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(25)));
    let config = RunConfig {
        ceiling_policy: CeilingPolicy::Soft,
        abort_after_ticks: 1,
        throttle_delay: Duration::from_millis(1),
        ..fast_config()
    };
    let orch = Orchestrator::new(config, prober, DialSampler::new(99.0, 99.0), store.clone())?;

    let report = orch.run(store.load()?).await?;

    assert!(!report.aborted);
    assert_eq!(report.completed, 4);
    assert_eq!(store.persisted().len(), 4);
    Ok(())
}

/*************************************************************
                      Hard ceilings
**************************************************************/

/// A critical streak under a hard policy aborts the run. Whatever was
/// dispatched is either a verdict or abandoned.
#[tokio::test]
async fn hard_policy_aborts_on_critical_streak() -> anyhow::Result<()> {
    let store = Arc::new(MemoryTargetStore::new(sites(20)));
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(30)));
    let config = RunConfig {
        ceiling_policy: CeilingPolicy::Hard,
        abort_after_ticks: 2,
        ..fast_config()
    };
    let orch = Orchestrator::new(config, prober, DialSampler::new(99.0, 30.0), store.clone())?;

    let report = tokio::time::timeout(Duration::from_secs(5), orch.run(store.load()?)).await??;

    assert!(report.aborted);
    assert!(!report.cancelled);
    assert!(report.dispatched < 20);
    assert_eq!(report.verdicts() + report.abandoned, report.dispatched);
    assert_eq!(store.persisted().len(), report.completed);
    Ok(())
}

/// Load dropping back below the ceiling lifts the throttle mid-run.
#[tokio::test]
async fn throttle_lifts_when_load_recovers() -> anyhow::Result<()> {
    let sampler = DialSampler::new(99.0, 30.0);
    let store = Arc::new(MemoryTargetStore::new(sites(12)));
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(20)));
    let orch = Orchestrator::new(fast_config(), prober.clone(), sampler.clone(), store.clone())?;

    let dial = Arc::clone(&sampler);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        dial.set(10.0, 30.0);
    });
    let report = orch.run(store.load()?).await?;

    assert_eq!(report.completed, 12);
    assert!(report.throttle_events >= 1);
    assert!(prober.max_concurrency() > 1, "pool never widened again");
    Ok(())
}

/// With every slot busy on a slow site, the abort still lands on the
/// governor tick instead of waiting for a worker to finish.
#[tokio::test]
async fn abort_is_noticed_while_pool_is_full() -> anyhow::Result<()> {
    let sampler = DialSampler::new(10.0, 30.0);
    let store = Arc::new(MemoryTargetStore::new(sites(10)));
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(500)));
    let config = RunConfig {
        workers: 2,
        ceiling_policy: CeilingPolicy::Hard,
        abort_after_ticks: 2,
        ..fast_config()
    };
    let orch = Orchestrator::new(config, prober.clone(), sampler.clone(), store.clone())?;

    let dial = Arc::clone(&sampler);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        dial.set(99.0, 30.0);
    });
    let report = tokio::time::timeout(Duration::from_secs(5), orch.run(store.load()?)).await??;

    assert!(report.aborted);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.completed, 0);
    assert_eq!(report.abandoned, 2);
    assert!(store.persisted().is_empty());
    Ok(())
}
