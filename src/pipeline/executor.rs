//! Sequential evaluator execution with timeout, retry and early stop.
//!
//! Per evaluator: `PENDING → RUNNING → {PASSED, FAILED, SKIPPED, ERRORED}`.
//! Per pipeline: `RUNNING → {COMPLETED, TERMINATED_EARLY}`.
//!
//! - A disabled evaluator is recorded `SKIPPED` without being constructed.
//! - Each attempt resolves the evaluator's options, builds it from the
//!   registry and runs it under `timeout`. Expiry is `FAILED` with cause
//!   `timeout`; option or construction errors are `ERRORED`.
//! - `FAILED`/`ERRORED` attempts are retried up to `retry_count` times,
//!   `retry_delay` apart. Only the last attempt is recorded.
//! - A final `FAILED`/`ERRORED` on a terminal evaluator, or on one with
//!   `continue_on_failure = false`, ends the pipeline; the rest stay `PENDING`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::result::{
    EvaluatorResult, EvaluatorStatus, FailureCause, PipelineResult, PipelineStatus,
};
use super::spec::{EvaluationPipeline, EvaluatorSpec};
use crate::config::{AgentSpec, Prediction};
use crate::error::{ExecutionError, HarnessError};
use crate::evaluator::{EvaluationContext, EvaluatorRegistry, Verdict};
use crate::options::{EnvMap, OptionMap};
use crate::sandbox::Sandbox;
use crate::template::{resolve_value, ResolutionScope};

/// Upper bound used when `timeout_secs` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Per-instance inputs shared by every evaluator of a pipeline.
pub struct PipelineInput<'a> {
    pub instance_id: &'a str,
    pub scope: &'a ResolutionScope,
    pub sandbox: &'a dyn Sandbox,
    pub env: &'a EnvMap,
    /// Directory relative host paths in evaluator options resolve against.
    pub base_dir: &'a Path,
    pub prediction: Option<&'a Prediction>,
    pub prediction_id: Option<&'a str>,
    pub agents: &'a [AgentSpec],
}

/// Outcome of a single attempt.
struct Attempt {
    status: EvaluatorStatus,
    score: f64,
    message: String,
    cause: Option<FailureCause>,
    artifacts: BTreeMap<String, Value>,
}

impl Attempt {
    fn errored(cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            status: EvaluatorStatus::Errored,
            score: 0.0,
            message: message.into(),
            cause: Some(cause),
            artifacts: BTreeMap::new(),
        }
    }

    fn timed_out(spec: &EvaluatorSpec) -> Self {
        Self {
            status: EvaluatorStatus::Failed,
            score: 0.0,
            message: format!("timed out after {}s", spec.timeout_secs),
            cause: Some(FailureCause::Timeout),
            artifacts: BTreeMap::new(),
        }
    }
}

/// Runs evaluation pipelines against a shared, read-only registry.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    registry: Arc<EvaluatorRegistry>,
}

impl PipelineExecutor {
    pub fn new(registry: Arc<EvaluatorRegistry>) -> Self {
        Self { registry }
    }

    /// Runs every evaluator in declared order.
    ///
    /// The result always holds one entry per declared evaluator.
    pub async fn run(&self, pipeline: &EvaluationPipeline, input: &PipelineInput<'_>) -> PipelineResult {
        let evaluators = pipeline.evaluators();
        let mut results = Vec::with_capacity(evaluators.len());
        let mut status = PipelineStatus::Running;

        for (index, spec) in evaluators.iter().enumerate() {
            if !spec.enabled {
                debug!(instance_id = input.instance_id, evaluator = %spec.name, "Evaluator disabled");
                results.push(EvaluatorResult::skipped(spec));
                continue;
            }

            let result = self.run_evaluator(spec, input).await;
            let stop = result.status.is_failure() && spec.stops_pipeline_on_failure();
            results.push(result);

            if stop {
                warn!(
                    instance_id = input.instance_id,
                    evaluation = pipeline.name(),
                    evaluator = %spec.name,
                    terminal = spec.is_terminal,
                    "Pipeline terminated early"
                );
                results.extend(evaluators[index + 1..].iter().map(EvaluatorResult::pending));
                status = PipelineStatus::TerminatedEarly;
                break;
            }
        }

        if status == PipelineStatus::Running {
            status = PipelineStatus::Completed;
        }

        PipelineResult {
            evaluation: pipeline.name().to_string(),
            status,
            results,
        }
    }

    async fn run_evaluator(&self, spec: &EvaluatorSpec, input: &PipelineInput<'_>) -> EvaluatorResult {
        let start = Instant::now();
        let max_attempts = spec.max_attempts();
        let mut attempt_count = 0;

        loop {
            attempt_count += 1;
            debug!(
                instance_id = input.instance_id,
                evaluator = %spec.name,
                attempt = attempt_count,
                status = %EvaluatorStatus::Running,
                "Running evaluator"
            );

            let attempt = self.attempt(spec, input).await;
            let final_attempt = attempt.status == EvaluatorStatus::Passed || attempt_count >= max_attempts;

            if final_attempt {
                info!(
                    instance_id = input.instance_id,
                    evaluator = %spec.name,
                    attempt = attempt_count,
                    status = %attempt.status,
                    score = attempt.score,
                    "Evaluator finished"
                );
                return EvaluatorResult {
                    name: spec.name.clone(),
                    kind: spec.kind.clone(),
                    status: attempt.status,
                    score: attempt.score,
                    max_score: spec.max_score,
                    message: attempt.message,
                    attempt_count,
                    duration_ms: start.elapsed().as_millis() as u64,
                    cause: attempt.cause,
                    artifacts: attempt.artifacts,
                };
            }

            warn!(
                instance_id = input.instance_id,
                evaluator = %spec.name,
                attempt = attempt_count,
                status = %attempt.status,
                message = %attempt.message,
                "Evaluator attempt failed, retrying"
            );
            let delay = spec.retry_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn attempt(&self, spec: &EvaluatorSpec, input: &PipelineInput<'_>) -> Attempt {
        let raw = Value::Object(spec.options.clone());
        let resolved = match resolve_value(&raw, input.scope) {
            Ok(value) => value,
            Err(e) => return Attempt::errored(FailureCause::Resolution, e.to_string()),
        };
        let evaluator = match OptionMap::from_value(spec.name.clone(), resolved)
            .and_then(|options| self.registry.create(&spec.kind, &options))
        {
            Ok(evaluator) => evaluator,
            Err(e) => return Attempt::errored(FailureCause::Configuration, e.to_string()),
        };

        let timeout = spec.timeout();
        let now = Instant::now();
        let ctx = EvaluationContext {
            instance_id: input.instance_id,
            evaluator: &spec.name,
            sandbox: input.sandbox,
            env: input.env,
            base_dir: input.base_dir,
            prediction: input.prediction,
            prediction_id: input.prediction_id,
            agents: input.agents,
            max_score: spec.max_score,
            timeout,
            deadline: now.checked_add(timeout).unwrap_or(now + FAR_FUTURE),
        };

        match tokio::time::timeout(timeout, evaluator.evaluate(&ctx)).await {
            Err(_) => Attempt::timed_out(spec),
            Ok(Ok(outcome)) => Attempt {
                status: match outcome.verdict {
                    Verdict::Passed => EvaluatorStatus::Passed,
                    Verdict::Failed => EvaluatorStatus::Failed,
                },
                score: outcome.score.max(0.0).min(spec.max_score.max(0.0)),
                message: outcome.message,
                cause: None,
                artifacts: outcome.artifacts,
            },
            Ok(Err(HarnessError::Execution(ExecutionError::EvaluatorTimeout { .. }))) => {
                Attempt::timed_out(spec)
            }
            Ok(Err(HarnessError::Configuration(e))) => {
                Attempt::errored(FailureCause::Configuration, e.to_string())
            }
            Ok(Err(HarnessError::Resolution(e))) => {
                Attempt::errored(FailureCause::Resolution, e.to_string())
            }
            Ok(Err(e)) => Attempt::errored(FailureCause::Runtime, e.to_string()),
        }
    }
}
