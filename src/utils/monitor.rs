#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, System};

/// Process usage at one point of a run.
#[cfg(feature = "cli")]
#[derive(Debug, Clone)]
pub struct UsageSample {
    pub label: String,
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub memory_percent: f32,
    pub elapsed: Duration,
}

/// Samples CPU and memory of the running process at stage boundaries.
/// Dumps are filtered while streaming, so a stage whose memory jumps is
/// worth a look.
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    started: Instant,
    samples: Mutex<Vec<UsageSample>>,
    enabled: bool,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let pid = if enabled {
            sysinfo::get_current_pid()
                .map_err(|e| tracing::warn!("Process monitoring unavailable: {}", e))
                .ok()
        } else {
            None
        };

        Self {
            system: Mutex::new(System::new()),
            pid,
            started: Instant::now(),
            samples: Mutex::new(Vec::new()),
            enabled,
        }
    }

    fn sample(&self, label: &str) -> Option<UsageSample> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_all();

        let process = system.process(pid)?;
        let memory_mb = process.memory() / 1024 / 1024;
        let total_mb = system.total_memory() / 1024 / 1024;
        let sample = UsageSample {
            label: label.to_string(),
            cpu_usage: process.cpu_usage(),
            memory_mb,
            memory_percent: if total_mb > 0 {
                memory_mb as f32 / total_mb as f32 * 100.0
            } else {
                0.0
            },
            elapsed: self.started.elapsed(),
        };

        self.samples.lock().ok()?.push(sample.clone());
        Some(sample)
    }

    /// Samples in the order they were taken.
    pub fn samples(&self) -> Vec<UsageSample> {
        self.samples.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn peak_memory_mb(&self) -> u64 {
        self.samples().iter().map(|s| s.memory_mb).max().unwrap_or(0)
    }

    pub fn log_stats(&self, phase: &str) {
        let previous = self.samples().last().map(|s| s.memory_mb);
        if let Some(sample) = self.sample(phase) {
            let delta = previous.map_or(0, |p| sample.memory_mb as i64 - p as i64);
            tracing::info!(
                "📊 {} - CPU: {:.1}%, Memory: {}MB ({:+}MB, {:.1}%), Time: {:?}",
                phase,
                sample.cpu_usage,
                sample.memory_mb,
                delta,
                sample.memory_percent,
                sample.elapsed
            );
        }
    }

    /// Total time, peak memory and the step with the largest memory growth.
    pub fn log_final_stats(&self) {
        if !self.enabled {
            return;
        }
        let samples = self.samples();
        let largest_growth = samples
            .windows(2)
            .map(|pair| (pair[1].label.as_str(), pair[1].memory_mb.saturating_sub(pair[0].memory_mb)))
            .max_by_key(|(_, growth)| *growth);

        tracing::info!(
            "📊 Final Stats - Total Time: {:?}, Peak Memory: {}MB, Samples: {}",
            self.started.elapsed(),
            self.peak_memory_mb(),
            samples.len()
        );
        if let Some((label, growth)) = largest_growth.filter(|(_, growth)| *growth > 0) {
            tracing::info!("📊 Largest memory growth: +{}MB at '{}'", growth, label);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn log_stats(&self, _phase: &str) {}

    pub fn log_final_stats(&self) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}
