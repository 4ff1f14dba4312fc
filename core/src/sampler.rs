//! # Resource Sampler
//!
//! Reads host CPU and memory utilization through `sysinfo`.
//!
//! CPU usage is a rate, so every reading refreshes the counters twice with a
//! short measurement window in between. Sampling never fails from the caller's
//! point of view: [`ResourceSampler::sample`] degrades to the last good reading
//! (or zero) and only the governor looks at [`ResourceSampler::try_sample`].

use std::time::Duration;

use async_trait::async_trait;
use sitewatch_common::config::SampleScope;
use sitewatch_common::model::ResourceSample;
use sysinfo::{CpuExt, Pid, ProcessExt, System, SystemExt};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

const CPU_MEASURE_WINDOW: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("host reported zero total memory")]
    NoMemoryInfo,
    #[error("cannot resolve the current process id: {0}")]
    NoPid(&'static str),
    #[error("process {0} is no longer visible")]
    ProcessGone(Pid),
}

#[async_trait]
pub trait ResourceSampler: Send + Sync {
    /// Takes a reading, reporting measurement failures.
    async fn try_sample(&self) -> Result<ResourceSample, SampleError>;

    /// Takes a reading, falling back to a zero sample on failure.
    async fn sample(&self) -> ResourceSample {
        match self.try_sample().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "resource sampling failed, using zero sample");
                ResourceSample::zero()
            }
        }
    }
}

/// `sysinfo`-backed sampler for the local host or the current process.
pub struct SystemSampler {
    scope: SampleScope,
    pid: Result<Pid, &'static str>,
    cpu_count: usize,
    state: Mutex<SamplerState>,
}

struct SamplerState {
    system: System,
    last: Option<ResourceSample>,
}

impl SystemSampler {
    pub fn new(scope: SampleScope) -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        let cpu_count = system.cpus().len().max(1);

        Self {
            scope,
            pid: sysinfo::get_current_pid(),
            cpu_count,
            state: Mutex::new(SamplerState { system, last: None }),
        }
    }

    pub fn scope(&self) -> SampleScope {
        self.scope
    }

    fn host_reading(system: &System) -> Result<(f64, f64), SampleError> {
        let total = system.total_memory();
        if total == 0 {
            return Err(SampleError::NoMemoryInfo);
        }
        let cpu = f64::from(system.global_cpu_info().cpu_usage());
        let memory = system.used_memory() as f64 / total as f64 * 100.0;
        Ok((cpu, memory))
    }

    fn process_reading(&self, system: &System, pid: Pid) -> Result<(f64, f64), SampleError> {
        let total = system.total_memory();
        if total == 0 {
            return Err(SampleError::NoMemoryInfo);
        }
        let process = system.process(pid).ok_or(SampleError::ProcessGone(pid))?;
        // Per-process CPU is reported per core; bring it down to host capacity.
        let cpu = f64::from(process.cpu_usage()) / self.cpu_count as f64;
        let memory = process.memory() as f64 / total as f64 * 100.0;
        Ok((cpu, memory))
    }
}

#[async_trait]
impl ResourceSampler for SystemSampler {
    async fn try_sample(&self) -> Result<ResourceSample, SampleError> {
        let mut state = self.state.lock().await;

        let (cpu, memory) = match self.scope {
            SampleScope::Host => {
                state.system.refresh_cpu();
                tokio::time::sleep(CPU_MEASURE_WINDOW).await;
                state.system.refresh_cpu();
                state.system.refresh_memory();
                Self::host_reading(&state.system)?
            }
            SampleScope::Process => {
                let pid = self.pid.map_err(SampleError::NoPid)?;
                state.system.refresh_process(pid);
                tokio::time::sleep(CPU_MEASURE_WINDOW).await;
                if !state.system.refresh_process(pid) {
                    return Err(SampleError::ProcessGone(pid));
                }
                state.system.refresh_memory();
                self.process_reading(&state.system, pid)?
            }
        };

        let sample = ResourceSample::new(cpu.clamp(0.0, 100.0), memory.clamp(0.0, 100.0));
        state.last = Some(sample);
        Ok(sample)
    }

    async fn sample(&self) -> ResourceSample {
        match self.try_sample().await {
            Ok(sample) => sample,
            Err(e) => {
                let fallback = self.state.lock().await.last;
                warn!(error = %e, has_previous = fallback.is_some(), "resource sampling failed");
                fallback.unwrap_or_else(ResourceSample::zero)
            }
        }
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
