//! Evaluator declarations and the pipeline they form.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigurationError;
use crate::scoring::ScoringConfig;

/// One step of an evaluation pipeline, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorSpec {
    /// Unique within the pipeline.
    pub name: String,

    /// Registry key of the evaluator implementation.
    #[serde(rename = "type")]
    pub kind: String,

    /// Raw options; string leaves are templates.
    #[serde(default)]
    pub options: Map<String, Value>,

    #[serde(default = "default_max_score")]
    pub max_score: f64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub retry_delay_ms: u64,

    #[serde(default = "default_true")]
    pub continue_on_failure: bool,

    #[serde(default)]
    pub is_terminal: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl EvaluatorSpec {
    /// Creates a spec with default settings.
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            options: Map::new(),
            max_score: default_max_score(),
            timeout_secs: default_timeout_secs(),
            retry_count: 0,
            retry_delay_ms: 0,
            continue_on_failure: true,
            is_terminal: false,
            enabled: true,
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        if let Value::Object(map) = options {
            self.options = map;
        }
        self
    }

    pub fn with_max_score(mut self, max_score: f64) -> Self {
        self.max_score = max_score;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_retry(mut self, retry_count: u32, retry_delay: Duration) -> Self {
        self.retry_count = retry_count;
        self.retry_delay_ms = retry_delay.as_millis() as u64;
        self
    }

    pub fn with_continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.continue_on_failure = continue_on_failure;
        self
    }

    pub fn terminal(mut self) -> Self {
        self.is_terminal = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Enforced execution deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Wait between attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Total attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// True if a failure of this evaluator ends the pipeline.
    pub fn stops_pipeline_on_failure(&self) -> bool {
        self.is_terminal || !self.continue_on_failure
    }
}

/// Ordered evaluators plus scoring, validated for unique names.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationPipeline {
    name: String,
    evaluators: Vec<EvaluatorSpec>,
    scoring: ScoringConfig,
}

impl EvaluationPipeline {
    /// Builds a pipeline, rejecting duplicate evaluator names.
    pub fn new(
        name: impl Into<String>,
        evaluators: Vec<EvaluatorSpec>,
        scoring: ScoringConfig,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        let mut seen = HashSet::new();
        for evaluator in &evaluators {
            if !seen.insert(evaluator.name.as_str()) {
                return Err(ConfigurationError::DuplicateEvaluatorName {
                    evaluation: name,
                    name: evaluator.name.clone(),
                });
            }
        }
        Ok(Self {
            name,
            evaluators,
            scoring,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluators(&self) -> &[EvaluatorSpec] {
        &self.evaluators
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Sum of `max_score` over enabled evaluators.
    pub fn max_total_score(&self) -> f64 {
        self.evaluators
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.max_score)
            .sum()
    }
}

fn default_max_score() -> f64 {
    1.0
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}
