#![cfg(test)]
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sitewatch_common::config::RunConfig;
use sitewatch_common::model::{ProbeErrorKind, Target, Verdict};
use sitewatch_core::Orchestrator;
use sitewatch_core::prober::HttpProber;
use sitewatch_core::store::{MemoryTargetStore, TargetStore};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::support::{DialSampler, ScriptedProber, fast_config, sites};

/*************************************************************
                  Dispatch and accounting
**************************************************************/

/// Every dispatched target ends with exactly one verdict, and the verdict
/// counts add up.
#[tokio::test]
async fn every_dispatched_target_gets_one_verdict() -> anyhow::Result<()> {
    let store = Arc::new(MemoryTargetStore::new(sites(30)));
    let prober = Arc::new(
        ScriptedProber::new(Duration::from_millis(5)).with_unreachable(["site3.example", "site17.example"]),
    );
    let sampler = DialSampler::new(10.0, 30.0);
    let orch = Orchestrator::new(fast_config(), prober.clone(), sampler, store.clone())?;

    let report = orch.run(store.load()?).await?;

    assert_eq!(report.dispatched, 30);
    assert_eq!(report.completed, 30);
    assert_eq!(report.verdicts(), report.dispatched);
    assert_eq!(report.unreachable, 2);
    assert_eq!(report.low_growth, 28);
    assert_eq!(report.errors.get(&ProbeErrorKind::ConnectionRefused), Some(&2));
    assert_eq!(report.abandoned, 0);
    assert!(!report.is_interrupted());
    assert_eq!(store.persisted().len(), 30);
    assert_eq!(store.pending(), 0);
    Ok(())
}

/// Targets carrying a mark from an earlier run are never probed again.
#[tokio::test]
async fn marked_targets_are_not_redispatched() -> anyhow::Result<()> {
    let mut targets = sites(6);
    targets[1].mark = Some(Verdict::Unreachable);
    targets[4].mark = Some(Verdict::ReachableHighGrowth);
    let store = Arc::new(MemoryTargetStore::new(targets));
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(2)));
    let orch = Orchestrator::new(fast_config(), prober.clone(), DialSampler::new(10.0, 30.0), store.clone())?;

    let report = orch.run(store.load()?).await?;

    assert_eq!(report.skipped_marked, 2);
    assert_eq!(report.dispatched, 4);
    let called: HashSet<String> = prober.calls().into_iter().collect();
    assert!(!called.contains("site1.example"));
    assert!(!called.contains("site4.example"));
    assert_eq!(store.persisted().get("site4.example"), Some(&Verdict::ReachableHighGrowth));

    // A second run over the same store has nothing left to do.
    let again = orch.run(store.load()?).await?;
    assert_eq!(again.dispatched, 0);
    assert_eq!(prober.calls().len(), 4);
    Ok(())
}

#[tokio::test]
async fn limit_caps_the_number_of_probes() -> anyhow::Result<()> {
    let store = Arc::new(MemoryTargetStore::new(sites(20)));
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(2)));
    let config = RunConfig {
        limit: Some(7),
        ..fast_config()
    };
    let orch = Orchestrator::new(config, prober.clone(), DialSampler::new(10.0, 30.0), store.clone())?;

    let report = orch.run(store.load()?).await?;

    assert_eq!(report.eligible, 7);
    assert_eq!(report.dispatched, 7);
    let mut called = prober.calls();
    called.sort();
    assert_eq!(called, (0..7).map(|i| format!("site{i}.example")).collect::<Vec<_>>());
    Ok(())
}

/// Equivalent spellings of one site are probed once, and the pool never runs
/// more than `workers` probes at the same time.
#[tokio::test]
async fn duplicates_never_overlap_and_pool_is_bounded() -> anyhow::Result<()> {
    let mut targets = Vec::new();
    for i in 0..12 {
        targets.push(Target::new(&format!("dup{i}.example")));
        targets.push(Target::new(&format!("https://www.dup{i}.example/")));
        targets.push(Target::new(&format!("DUP{i}.example")));
    }
    let store = Arc::new(MemoryTargetStore::new(targets));
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(15)));
    let config = RunConfig {
        workers: 3,
        ..fast_config()
    };
    let orch = Orchestrator::new(config, prober.clone(), DialSampler::new(10.0, 30.0), store.clone())?;

    let report = orch.run(store.load()?).await?;

    assert_eq!(report.duplicates, 24);
    assert_eq!(report.dispatched, 12);
    assert_eq!(prober.calls().len(), 12);
    assert_eq!(prober.overlaps(), 0);
    assert!(prober.max_concurrency() <= 3, "saw {} concurrent probes", prober.max_concurrency());
    assert!(prober.max_concurrency() >= 2);
    Ok(())
}

/*************************************************************
                   Growth classification
**************************************************************/

/// A probe that drives the host up between its two samples is flagged; a
/// quiet one right after it is not.
#[tokio::test]
async fn growth_during_settle_is_flagged() -> anyhow::Result<()> {
    let sampler = DialSampler::new(10.0, 30.0);
    let dial = Arc::clone(&sampler);
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(2)).with_hook(move |target: &Target| {
        if target.url().starts_with("hot") {
            dial.set(16.0, 30.0);
        } else {
            dial.set(10.0, 30.0);
        }
    }));
    let store = Arc::new(MemoryTargetStore::from_urls(["hot.example", "calm.example", "hot2.example"]));
    let config = RunConfig {
        workers: 1,
        settle_delay: Duration::from_millis(150),
        ..fast_config()
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orch = Orchestrator::new(config, prober, sampler, store.clone())?.with_events(tx);

    let report = orch.run(store.load()?).await?;
    drop(orch);

    assert_eq!(report.high_growth, 2);
    assert_eq!(report.low_growth, 1);

    let persisted = store.persisted();
    assert_eq!(persisted.get("hot.example"), Some(&Verdict::ReachableHighGrowth));
    assert_eq!(persisted.get("calm.example"), Some(&Verdict::ReachableLowGrowth));
    assert_eq!(persisted.get("hot2.example"), Some(&Verdict::ReachableHighGrowth));

    let mut records = Vec::new();
    while let Some(record) = rx.recv().await {
        records.push(record);
    }
    let hot = records.iter().find(|r| r.target == "hot.example").unwrap();
    assert_eq!(hot.mark, 2);
    assert!((hot.cpu_growth_percent - 60.0).abs() < 1e-6);
    assert_eq!(hot.post.cpu_percent, 16.0);
    Ok(())
}

/// Connectivity mode never classifies growth and never waits for the settle
/// delay.
#[tokio::test]
async fn connectivity_mode_ignores_growth() -> anyhow::Result<()> {
    let sampler = DialSampler::new(10.0, 30.0);
    let dial = Arc::clone(&sampler);
    let prober = ScriptedProber::new(Duration::from_millis(2))
        .with_unreachable(["down.example"])
        .with_hook(move |_: &Target| dial.set(60.0, 30.0));
    let store = Arc::new(MemoryTargetStore::from_urls(["a.example", "b.example", "down.example"]));
    let config = RunConfig {
        classify: false,
        settle_delay: Duration::from_secs(30),
        ..fast_config()
    };
    let orch = Orchestrator::new(config, Arc::new(prober), sampler, store.clone())?;

    let report = tokio::time::timeout(Duration::from_secs(5), orch.run(store.load()?)).await??;

    assert_eq!(report.high_growth, 0);
    assert_eq!(report.low_growth, 2);
    assert_eq!(report.unreachable, 1);
    assert!(store.persisted().is_empty());
    Ok(())
}

/// A check leaves the list untouched, so a later scan still visits and
/// classifies every target.
#[tokio::test]
async fn check_then_scan_classifies_everything() -> anyhow::Result<()> {
    let store = Arc::new(MemoryTargetStore::new(sites(3)));
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(2)));

    let check = RunConfig {
        classify: false,
        ..fast_config()
    };
    let orch = Orchestrator::new(check, prober.clone(), DialSampler::new(10.0, 30.0), store.clone())?;
    let report = orch.run(store.load()?).await?;
    assert_eq!(report.completed, 3);
    assert!(store.persisted().is_empty());
    assert!(store.load()?.iter().all(|t| !t.is_marked()));

    let orch = Orchestrator::new(fast_config(), prober.clone(), DialSampler::new(10.0, 30.0), store.clone())?;
    let report = orch.run(store.load()?).await?;
    assert_eq!(report.skipped_marked, 0);
    assert_eq!(report.dispatched, 3);
    assert_eq!(store.persisted().len(), 3);
    assert_eq!(prober.calls().len(), 6);
    Ok(())
}

/*************************************************************
                 Real prober, local listener
**************************************************************/

/// A site that accepts connections and never answers is cut off at the
/// attempt cap even with a generous request timeout.
#[tokio::test]
async fn silent_site_is_unreachable_after_max_duration() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let url = format!("127.0.0.1:{port}");
    let store = Arc::new(MemoryTargetStore::from_urls([url.as_str()]));
    let config = RunConfig {
        request_timeout: Duration::from_secs(60),
        max_duration: Duration::from_millis(300),
        ..fast_config()
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orch = Orchestrator::new(config, Arc::new(HttpProber::new()?), DialSampler::new(10.0, 30.0), store.clone())?
        .with_events(tx);

    let report = tokio::time::timeout(Duration::from_secs(5), orch.run(store.load()?)).await??;
    drop(orch);

    assert_eq!(report.unreachable, 1);
    assert_eq!(report.errors.get(&ProbeErrorKind::Timeout), Some(&1));
    assert_eq!(store.persisted().get(url.as_str()), Some(&Verdict::Unreachable));

    let record = rx.recv().await.unwrap();
    assert_eq!(record.verdict, Verdict::Unreachable);
    assert_eq!(record.error_kind, Some(ProbeErrorKind::Timeout));
    assert!(record.elapsed_ms >= 290 && record.elapsed_ms < 3_000, "took {} ms", record.elapsed_ms);
    Ok(())
}
