#![cfg(test)]
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sitewatch_common::config::RunConfig;
use sitewatch_common::error::RunError;
use sitewatch_common::model::Verdict;
use sitewatch_core::Orchestrator;
use sitewatch_core::store::{FileTargetStore, MemoryTargetStore, TargetStore};
use tempfile::TempDir;

use crate::support::{DialSampler, ScriptedProber, fast_config, sites};

const LIST: &str = "\
# candidates collected last week
alpha.example
https://www.beta.example/
gamma.example,
delta.example

# second batch
epsilon.example
zeta.example,0
eta.example
theta.example
";

fn list_file() -> anyhow::Result<(TempDir, PathBuf)> {
    let dir = TempDir::new()?;
    let path = dir.path().join("sites.txt");
    fs::write(&path, LIST)?;
    Ok((dir, path))
}

/*************************************************************
                     Resumable runs
**************************************************************/

/// A limited run followed by a full one probes every target exactly once,
/// keeps the original file as a backup and leaves comments alone.
#[tokio::test]
async fn interrupted_list_resumes_where_it_stopped() -> anyhow::Result<()> {
    let (_dir, path) = list_file()?;
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(2)).with_unreachable(["eta.example"]));

    let store = Arc::new(FileTargetStore::open(&path)?);
    let first = RunConfig {
        limit: Some(4),
        ..fast_config()
    };
    let orch = Orchestrator::new(first, prober.clone(), DialSampler::new(10.0, 30.0), store.clone())?;
    let report = orch.run(store.load()?).await?;
    assert_eq!(report.skipped_marked, 1);
    assert_eq!(report.dispatched, 4);

    let backup = fs::read_to_string(store.backup_path())?;
    assert_eq!(backup, LIST);

    // Reopen as a fresh process would.
    let store = Arc::new(FileTargetStore::open(&path)?);
    let orch = Orchestrator::new(fast_config(), prober.clone(), DialSampler::new(10.0, 30.0), store.clone())?;
    let report = orch.run(store.load()?).await?;
    assert_eq!(report.skipped_marked, 5);
    assert_eq!(report.dispatched, 3);

    let mut called = prober.calls();
    let total = called.len();
    called.sort();
    called.dedup();
    assert_eq!(total, 7);
    assert_eq!(called.len(), 7);
    assert!(!called.contains(&"zeta.example".to_string()));

    let written = fs::read_to_string(&path)?;
    assert!(written.contains("# candidates collected last week\n"));
    assert!(written.contains("# second batch\n"));
    assert!(written.contains("https://www.beta.example/,1"));
    assert!(written.contains("eta.example,0"));
    assert!(written.contains("zeta.example,0"));
    assert!(store.load()?.iter().all(|t| t.is_marked()));
    Ok(())
}

/*************************************************************
                    Flushing and failure
**************************************************************/

/// Marks are written in batches during the run and once more at the end.
#[tokio::test]
async fn marks_are_flushed_in_batches() -> anyhow::Result<()> {
    let store = Arc::new(MemoryTargetStore::new(sites(10)));
    let config = RunConfig {
        flush_every: 3,
        ..fast_config()
    };
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(2)));
    let orch = Orchestrator::new(config, prober, DialSampler::new(10.0, 30.0), store.clone())?;

    orch.run(store.load()?).await?;

    assert_eq!(store.flushes(), 4);
    assert_eq!(store.persisted().len(), 10);
    Ok(())
}

/// When the store never accepts a flush the run still finishes, and the
/// error carries the full report.
#[tokio::test]
async fn persistent_store_failure_is_reported() -> anyhow::Result<()> {
    let store = Arc::new(MemoryTargetStore::new(sites(10)));
    store.fail_all_flushes(true);
    let config = RunConfig {
        persist_retries: 3,
        ..fast_config()
    };
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(2)));
    let orch = Orchestrator::new(config, prober, DialSampler::new(10.0, 30.0), store.clone())?;

    let err = orch.run(store.load()?).await.unwrap_err();

    match &err {
        RunError::Unpersisted { count, report } => {
            assert_eq!(*count, 10);
            assert_eq!(report.completed, 10);
            assert_eq!(report.unpersisted, 10);
        }
    }
    assert!(store.persisted().is_empty());
    assert_eq!(store.pending(), 10);
    Ok(())
}

/// A reset clears marks so the next run probes those targets again.
#[tokio::test]
async fn reset_makes_targets_eligible_again() -> anyhow::Result<()> {
    let (_dir, path) = list_file()?;
    let prober = Arc::new(ScriptedProber::new(Duration::from_millis(2)).with_unreachable(["alpha.example"]));

    let store = Arc::new(FileTargetStore::open(&path)?);
    let orch = Orchestrator::new(fast_config(), prober.clone(), DialSampler::new(10.0, 30.0), store.clone())?;
    orch.run(store.load()?).await?;

    let cleared = store.reset_marks(Some(Verdict::Unreachable))?;
    assert_eq!(cleared, 2);

    let store = Arc::new(FileTargetStore::open(&path)?);
    let plan = orch.plan(&store.load()?);
    let urls: Vec<&str> = plan.queue.iter().map(|t| t.url()).collect();
    assert_eq!(urls, vec!["alpha.example", "zeta.example"]);
    Ok(())
}
