//! Aggregate scoring over a pipeline result.
//!
//! Scoring tolerates partial pipelines: an evaluator that never ran, was
//! skipped, or is missing from the result contributes 0.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pipeline::{EvaluatorResult, PipelineResult};

/// Aggregation method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    #[default]
    Sum,
    WeightedSum,
}

impl fmt::Display for ScoringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sum => write!(f, "sum"),
            Self::WeightedSum => write!(f, "weighted_sum"),
        }
    }
}

/// How a pipeline result becomes one number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub method: ScoringMethod,

    /// Evaluators that count; `None` means all.
    #[serde(default)]
    pub evaluators: Option<Vec<String>>,

    /// Per-evaluator weights for `weighted_sum`. Used as given, never renormalized.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,

    /// Divide each raw score by its `max_score` before weighting.
    #[serde(default)]
    pub normalize: bool,

    /// Minimum aggregate for the instance to count as passed.
    #[serde(default)]
    pub pass_threshold: Option<f64>,
}

impl ScoringConfig {
    /// Sum over the given subset (or all evaluators).
    pub fn sum(evaluators: Option<Vec<String>>) -> Self {
        Self {
            method: ScoringMethod::Sum,
            evaluators,
            ..Self::default()
        }
    }

    /// Weighted sum with the given weights.
    pub fn weighted(weights: BTreeMap<String, f64>, normalize: bool) -> Self {
        Self {
            method: ScoringMethod::WeightedSum,
            weights,
            normalize,
            ..Self::default()
        }
    }

    /// Every evaluator name the config refers to.
    pub fn referenced_evaluators(&self) -> impl Iterator<Item = &str> {
        self.evaluators
            .iter()
            .flatten()
            .map(String::as_str)
            .chain(self.weights.keys().map(String::as_str))
    }

    fn includes(&self, name: &str) -> bool {
        self.evaluators
            .as_ref()
            .map_or(true, |subset| subset.iter().any(|n| n == name))
    }

    /// Pass/fail verdict for an aggregate score.
    ///
    /// With a threshold the score decides; without one every evaluator
    /// must have passed (or been skipped) and the pipeline must have completed.
    pub fn is_passing(&self, score: f64, result: &PipelineResult) -> bool {
        match self.pass_threshold {
            Some(threshold) => score >= threshold,
            None => result.all_passed(),
        }
    }
}

/// Computes the aggregate score of a pipeline result.
pub fn compute_score(result: &PipelineResult, config: &ScoringConfig) -> f64 {
    let counted = result.results.iter().filter(|r| config.includes(&r.name));
    match config.method {
        ScoringMethod::Sum => counted.map(|r| r.score).sum(),
        ScoringMethod::WeightedSum => counted
            .filter_map(|r| {
                config
                    .weights
                    .get(&r.name)
                    .map(|weight| weight * component(r, config.normalize))
            })
            .sum(),
    }
}

fn component(result: &EvaluatorResult, normalize: bool) -> f64 {
    if !normalize {
        result.score
    } else if result.max_score > 0.0 {
        result.score / result.max_score
    } else {
        0.0
    }
}
