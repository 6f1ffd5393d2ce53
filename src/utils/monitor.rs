//! Process resource sampling for long exports.

#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct ResourceSample {
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub peak_memory_mb: u64,
    pub elapsed: Duration,
}

#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: std::sync::Mutex<System>,
    pid: Option<Pid>,
    started: Instant,
    peak_memory_mb: std::sync::atomic::AtomicU64,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    /// Returns `None` when monitoring is disabled.
    pub fn new(enabled: bool) -> Option<Self> {
        if !enabled {
            return None;
        }
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!("System monitoring unavailable: {}", e);
                None
            }
        };

        Some(Self {
            system: std::sync::Mutex::new(System::new()),
            pid,
            started: Instant::now(),
            peak_memory_mb: std::sync::atomic::AtomicU64::new(0),
        })
    }

    pub fn sample(&self) -> Option<ResourceSample> {
        use std::sync::atomic::Ordering;

        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::everything(),
        );
        let process = system.process(pid)?;
        let memory_mb = process.memory() / 1024 / 1024;
        let peak = self
            .peak_memory_mb
            .fetch_max(memory_mb, Ordering::Relaxed)
            .max(memory_mb);

        Some(ResourceSample {
            cpu_usage: process.cpu_usage(),
            memory_mb,
            peak_memory_mb: peak,
            elapsed: self.started.elapsed(),
        })
    }

    pub fn log_sample(&self, phase: &str) {
        if let Some(sample) = self.sample() {
            tracing::info!(
                "{} - CPU: {:.1}%, Memory: {}MB, Peak: {}MB, Time: {:?}",
                phase,
                sample.cpu_usage,
                sample.memory_mb,
                sample.peak_memory_mb,
                sample.elapsed
            );
        }
    }
}

#[cfg(not(feature = "cli"))]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Option<Self> {
        None
    }

    pub fn log_sample(&self, _phase: &str) {}
}
