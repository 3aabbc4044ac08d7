use crate::core::etl::{EtlEngine, StageReport};
use crate::domain::ports::Pipeline;
use crate::utils::error::{EtlError, Result};
use crate::utils::monitor::SystemMonitor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Deck-building stages, declared in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Species,
    Translations,
    Countries,
    Images,
    Identification,
    Traits,
    Combine,
    Sort,
}

impl StageKind {
    /// Sort is left out: it works on an Anki export, not on the processed files.
    pub const DEFAULT_ORDER: [StageKind; 7] = [
        StageKind::Species,
        StageKind::Translations,
        StageKind::Countries,
        StageKind::Images,
        StageKind::Identification,
        StageKind::Traits,
        StageKind::Combine,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Species => "species",
            StageKind::Translations => "translations",
            StageKind::Countries => "countries",
            StageKind::Images => "images",
            StageKind::Identification => "identification",
            StageKind::Traits => "traits",
            StageKind::Combine => "combine",
            StageKind::Sort => "sort",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        [StageKind::Sort]
            .into_iter()
            .chain(StageKind::DEFAULT_ORDER)
            .find(|stage| stage.name() == wanted)
            .ok_or_else(|| format!("unknown stage '{}'", s.trim()))
    }
}

/// Object-safe view of a runnable stage so different pipelines can share a
/// sequence.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self) -> Result<StageReport>;
}

#[async_trait]
impl<P: Pipeline> Stage for EtlEngine<P> {
    fn name(&self) -> &str {
        EtlEngine::name(self)
    }

    async fn run(&self) -> Result<StageReport> {
        EtlEngine::run(self).await
    }
}

/// Stages run one after another; the first failure stops the sequence.
pub struct StageSequence {
    stages: Vec<Box<dyn Stage>>,
    monitor: Option<SystemMonitor>,
    execution_id: String,
}

impl StageSequence {
    pub fn new(execution_id: String) -> Self {
        Self {
            stages: Vec::new(),
            monitor: None,
            execution_id,
        }
    }

    /// 啟用或禁用系統監控
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled.then(|| SystemMonitor::new(true));
        self
    }

    pub fn add_stage(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn execute_all(&self) -> Result<Vec<StageReport>> {
        tracing::info!(
            "🧬 Run {}: {} stage(s): {}",
            self.execution_id,
            self.stages.len(),
            self.names().join(", ")
        );
        if let Some(monitor) = &self.monitor {
            monitor.log_stats("Sequence started");
        }

        let mut reports = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            match stage.run().await {
                Ok(report) => {
                    tracing::info!(
                        "✅ Stage completed: {} (rows: {}, duration: {:?})",
                        report.stage,
                        report.rows,
                        report.duration
                    );
                    reports.push(report);
                }
                Err(e) => {
                    tracing::error!("❌ Stage {} failed: {}", stage.name(), e);
                    return Err(EtlError::StageFailed {
                        stage: stage.name().to_string(),
                        details: e.to_string(),
                    });
                }
            }
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_final_stats();
        }
        Ok(reports)
    }

    /// 獲取執行摘要
    pub fn get_execution_summary(reports: &[StageReport]) -> HashMap<String, serde_json::Value> {
        let total_rows: usize = reports.iter().map(|r| r.rows).sum();
        let total_duration: std::time::Duration = reports.iter().map(|r| r.duration).sum();

        let mut summary = HashMap::new();
        summary.insert("total_stages".to_string(), serde_json::json!(reports.len()));
        summary.insert("total_rows".to_string(), serde_json::json!(total_rows));
        summary.insert(
            "total_duration_ms".to_string(),
            serde_json::json!(total_duration.as_millis() as u64),
        );
        summary.insert(
            "executed_stages".to_string(),
            serde_json::json!(reports.iter().map(|r| r.stage.as_str()).collect::<Vec<_>>()),
        );
        summary.insert(
            "outputs".to_string(),
            serde_json::json!(reports
                .iter()
                .map(|r| r.output_path.as_str())
                .collect::<Vec<_>>()),
        );
        summary
    }
}
