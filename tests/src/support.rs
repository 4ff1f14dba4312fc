//! Scripted collaborators for driving the orchestrator without a network or
//! a real host load.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use sitewatch_common::config::RunConfig;
use sitewatch_common::model::{ProbeAttempt, ProbeErrorKind, ResourceSample, Target};
use sitewatch_core::prober::Prober;
use sitewatch_core::sampler::{ResourceSampler, SampleError};

type ProbeHook = Box<dyn Fn(&Target) + Send + Sync>;

/// Prober that answers after a fixed delay and records how it was used.
pub struct ScriptedProber {
    delay: Duration,
    unreachable: HashSet<String>,
    hook: Option<ProbeHook>,
    calls: Mutex<Vec<(String, Instant)>>,
    in_flight: Mutex<HashSet<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    overlaps: AtomicUsize,
}

impl ScriptedProber {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            unreachable: HashSet::new(),
            hook: None,
            calls: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashSet::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
        }
    }

    /// Targets (normalized URLs) that fail with a refused connection.
    pub fn with_unreachable<'a>(mut self, urls: impl IntoIterator<Item = &'a str>) -> Self {
        self.unreachable = urls.into_iter().map(str::to_string).collect();
        self
    }

    /// Runs `hook` at the start of every probe.
    pub fn with_hook(mut self, hook: impl Fn(&Target) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Probes that started while another probe of the same target was running.
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, target: &Target, _timeout: Duration, max_duration: Duration) -> ProbeAttempt {
        let started_at = Utc::now();
        let clock = Instant::now();
        let url = target.url().to_string();

        self.calls.lock().unwrap().push((url.clone(), clock));
        if !self.in_flight.lock().unwrap().insert(url.clone()) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if let Some(hook) = &self.hook {
            hook(target);
        }
        tokio::time::sleep(self.delay.min(max_duration)).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.in_flight.lock().unwrap().remove(&url);

        let elapsed = clock.elapsed();
        if self.delay > max_duration {
            ProbeAttempt::failed(url, started_at, elapsed, ProbeErrorKind::Timeout, "exceeded max duration")
        } else if self.unreachable.contains(&url) {
            ProbeAttempt::failed(url, started_at, elapsed, ProbeErrorKind::ConnectionRefused, "connection refused")
        } else {
            let final_url = format!("https://{url}/");
            ProbeAttempt::reachable(url, started_at, elapsed, 200, final_url)
        }
    }
}

/// Sampler whose reading can be changed while a run is in progress.
pub struct DialSampler {
    reading: Mutex<(f64, f64)>,
}

impl DialSampler {
    pub fn new(cpu: f64, memory: f64) -> Arc<Self> {
        Arc::new(Self {
            reading: Mutex::new((cpu, memory)),
        })
    }

    pub fn set(&self, cpu: f64, memory: f64) {
        *self.reading.lock().unwrap() = (cpu, memory);
    }
}

#[async_trait]
impl ResourceSampler for DialSampler {
    async fn try_sample(&self) -> Result<ResourceSample, SampleError> {
        let (cpu, memory) = *self.reading.lock().unwrap();
        Ok(ResourceSample::new(cpu, memory))
    }
}

pub fn sites(n: usize) -> Vec<Target> {
    (0..n).map(|i| Target::new(&format!("site{i}.example"))).collect()
}

/// Short timings so whole runs finish in milliseconds.
pub fn fast_config() -> RunConfig {
    RunConfig {
        workers: 4,
        settle_delay: Duration::from_millis(10),
        governor_interval: Duration::from_millis(10),
        throttle_delay: Duration::from_millis(10),
        persist_retry_delay: Duration::from_millis(5),
        ..RunConfig::default()
    }
}
