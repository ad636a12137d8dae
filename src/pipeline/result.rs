//! Outcome types recorded by the pipeline executor.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::spec::{EvaluationPipeline, EvaluatorSpec};

/// Lifecycle state of one evaluator.
///
/// `Pending` at report time means the evaluator was never reached, which is
/// distinct from `Skipped` (disabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluatorStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
    Errored,
}

impl EvaluatorStatus {
    /// True for `Failed` and `Errored`.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Errored)
    }
}

impl fmt::Display for EvaluatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Passed => write!(f, "PASSED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Errored => write!(f, "ERRORED"),
        }
    }
}

/// Why an evaluator ended `Failed` or `Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    Timeout,
    Runtime,
    Configuration,
    Resolution,
    Setup,
}

/// Final record for one evaluator. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorResult {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: EvaluatorStatus,
    pub score: f64,
    pub max_score: f64,
    pub message: String,
    pub attempt_count: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<FailureCause>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, Value>,
}

impl EvaluatorResult {
    fn empty(spec: &EvaluatorSpec, status: EvaluatorStatus, message: &str) -> Self {
        Self {
            name: spec.name.clone(),
            kind: spec.kind.clone(),
            status,
            score: 0.0,
            max_score: spec.max_score,
            message: message.to_string(),
            attempt_count: 0,
            duration_ms: 0,
            cause: None,
            artifacts: BTreeMap::new(),
        }
    }

    /// Never executed.
    pub fn pending(spec: &EvaluatorSpec) -> Self {
        Self::empty(spec, EvaluatorStatus::Pending, "")
    }

    /// Disabled evaluator.
    pub fn skipped(spec: &EvaluatorSpec) -> Self {
        Self::empty(spec, EvaluatorStatus::Skipped, "disabled")
    }

    /// Wall-clock time spent across attempts.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Pipeline-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Running,
    Completed,
    TerminatedEarly,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::TerminatedEarly => write!(f, "TERMINATED_EARLY"),
        }
    }
}

/// One entry per declared evaluator, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub evaluation: String,
    pub status: PipelineStatus,
    pub results: Vec<EvaluatorResult>,
}

impl PipelineResult {
    /// Result for a pipeline that never started (e.g. environment setup failed).
    ///
    /// Enabled evaluators stay `Pending`; disabled ones are still `Skipped`.
    pub fn not_started(pipeline: &EvaluationPipeline) -> Self {
        Self {
            evaluation: pipeline.name().to_string(),
            status: PipelineStatus::TerminatedEarly,
            results: pipeline
                .evaluators()
                .iter()
                .map(|spec| {
                    if spec.enabled {
                        EvaluatorResult::pending(spec)
                    } else {
                        EvaluatorResult::skipped(spec)
                    }
                })
                .collect(),
        }
    }

    /// Looks up an evaluator result by name.
    pub fn get(&self, name: &str) -> Option<&EvaluatorResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Number of evaluators with the given status.
    pub fn count(&self, status: EvaluatorStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// True if every executed evaluator passed and none were left pending.
    pub fn all_passed(&self) -> bool {
        self.status == PipelineStatus::Completed
            && self
                .results
                .iter()
                .all(|r| matches!(r.status, EvaluatorStatus::Passed | EvaluatorStatus::Skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ScoringConfig;

    #[test]
    fn test_not_started_is_total_and_pending() {
        let pipeline = EvaluationPipeline::new(
            "default",
            vec![EvaluatorSpec::new("a", "command"), EvaluatorSpec::new("b", "command")],
            ScoringConfig::default(),
        )
        .unwrap();
        let result = PipelineResult::not_started(&pipeline);
        assert_eq!(result.status, PipelineStatus::TerminatedEarly);
        assert_eq!(result.count(EvaluatorStatus::Pending), 2);
        assert!(!result.all_passed());
        assert_eq!(result.get("b").map(|r| r.attempt_count), Some(0));
    }

    #[test]
    fn test_not_started_keeps_disabled_skipped() {
        let pipeline = EvaluationPipeline::new(
            "default",
            vec![
                EvaluatorSpec::new("a", "command"),
                EvaluatorSpec::new("off", "command").disabled(),
            ],
            ScoringConfig::default(),
        )
        .unwrap();
        let result = PipelineResult::not_started(&pipeline);
        assert_eq!(result.get("a").unwrap().status, EvaluatorStatus::Pending);
        assert_eq!(result.get("off").unwrap().status, EvaluatorStatus::Skipped);
        assert_eq!(result.status, PipelineStatus::TerminatedEarly);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&EvaluatorStatus::Errored).unwrap(), "\"ERRORED\"");
        assert_eq!(
            serde_json::to_string(&PipelineStatus::TerminatedEarly).unwrap(),
            "\"TERMINATED_EARLY\""
        );
        assert_eq!(EvaluatorStatus::Skipped.to_string(), "SKIPPED");
        assert!(EvaluatorStatus::Errored.is_failure());
        assert!(!EvaluatorStatus::Pending.is_failure());
    }
}
