use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use std::time::{Duration, Instant};

/// What one stage produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: String,
    pub rows: usize,
    pub output_path: String,
    pub duration: Duration,
}

/// Runs a single pipeline: extract, transform, load.
pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn name(&self) -> &str {
        self.pipeline.name()
    }

    pub async fn run(&self) -> Result<StageReport> {
        let stage = self.pipeline.name().to_string();
        let start = Instant::now();
        tracing::info!("🚀 Starting stage: {}", stage);
        self.monitor.log_stats(&format!("{} started", stage));

        tracing::debug!("📥 Extracting...");
        let input = self.pipeline.extract().await?;

        tracing::debug!("🔄 Transforming...");
        let result = self.pipeline.transform(input).await?;
        let rows = result.table.len();
        tracing::info!("🔄 {}: {} rows", stage, rows);

        tracing::debug!("💾 Loading...");
        let output_path = self.pipeline.load(result).await?;
        tracing::info!("💾 {} saved to: {}", stage, output_path);

        self.monitor.log_stats(&format!("{} finished", stage));

        Ok(StageReport {
            stage,
            rows,
            output_path,
            duration: start.elapsed(),
        })
    }
}
