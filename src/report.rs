//! Structured run report.
//!
//! One [`InstanceReport`] per (instance, evaluation) pair, in plan order,
//! each carrying the full ordered [`PipelineResult`] and its aggregate score.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::pipeline::{EvaluationPipeline, PipelineResult, PipelineStatus};
use crate::template::{resolve, ResolutionScope};

/// Outcome of one evaluation on one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceReport {
    pub instance_id: String,
    pub evaluation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_id: Option<String>,
    pub pipeline: PipelineResult,
    pub score: f64,
    pub passed: bool,
    /// Set when sandbox creation or a configurer failed before the pipeline ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
}

/// Aggregates over all instance reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub terminated_early: usize,
    pub passed: usize,
    pub mean_score: f64,
}

impl RunSummary {
    pub fn from_results(results: &[InstanceReport]) -> Self {
        let total = results.len();
        let count = |status: PipelineStatus| results.iter().filter(|r| r.pipeline.status == status).count();
        let mean_score = if total == 0 {
            0.0
        } else {
            results.iter().map(|r| r.score).sum::<f64>() / total as f64
        };
        Self {
            total,
            completed: count(PipelineStatus::Completed),
            terminated_early: count(PipelineStatus::TerminatedEarly),
            passed: results.iter().filter(|r| r.passed).count(),
            mean_score,
        }
    }
}

/// The report written at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub config_digest: String,
    pub results: Vec<InstanceReport>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(
        run_id: impl Into<String>,
        started_at: DateTime<Utc>,
        config_digest: impl Into<String>,
        results: Vec<InstanceReport>,
    ) -> Self {
        let summary = RunSummary::from_results(&results);
        Self {
            run_id: run_id.into(),
            started_at,
            finished_at: Utc::now(),
            config_digest: config_digest.into(),
            results,
            summary,
        }
    }

    /// Writes pretty JSON, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), HarnessError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!(path = %path.display(), results = self.results.len(), "Report written");
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, HarnessError> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }
}

/// SHA-256 over evaluation and evaluator names, in declared order.
pub fn config_digest(pipelines: &[EvaluationPipeline]) -> String {
    let mut hasher = Sha256::new();
    for pipeline in pipelines {
        hasher.update(pipeline.name().as_bytes());
        hasher.update(b"\0");
        for evaluator in pipeline.evaluators() {
            hasher.update(evaluator.name.as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Resolves the templated report path against env and CLI scopes.
pub fn resolve_report_path(config: &HarnessConfig, scope: &ResolutionScope) -> Result<PathBuf, HarnessError> {
    let path = resolve(&config.report.path, scope)?;
    Ok(config.resolve_path(&path))
}
