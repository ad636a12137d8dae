//! Evaluator capability contract and registry.
//!
//! An evaluator is created from its resolved options for every attempt and
//! receives an [`EvaluationContext`] carrying the sandbox, merged env, the
//! instance's prediction and the deadline it must honor.
//!
//! Built-in evaluator types:
//!
//! | Type | Purpose |
//! |---|---|
//! | `command` | run a command, pass on expected exit codes |
//! | `apply_patch` | write the prediction patch and apply it |
//! | `test_suite` | run test commands, score by pass ratio |
//! | `regression` | compare test outcomes against a baseline |
//! | `run_agent` | run a resolved agent's command |

pub mod agent;
pub mod command;
pub mod patch;
pub mod regression;
pub mod test_suite;

pub use agent::RunAgentEvaluator;
pub use command::CommandEvaluator;
pub use patch::ApplyPatchEvaluator;
pub use regression::RegressionEvaluator;
pub use test_suite::TestSuiteEvaluator;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{AgentSpec, Prediction};
use crate::error::{ConfigurationError, ExecutionError, HarnessError};
use crate::options::{EnvMap, OptionMap};
use crate::sandbox::{ExecOutput, Sandbox};

/// Everything an evaluator may read while running.
pub struct EvaluationContext<'a> {
    pub instance_id: &'a str,
    pub evaluator: &'a str,
    pub sandbox: &'a dyn Sandbox,
    pub env: &'a EnvMap,
    /// Config file directory; relative host paths resolve against it.
    pub base_dir: &'a Path,
    pub prediction: Option<&'a Prediction>,
    pub prediction_id: Option<&'a str>,
    pub agents: &'a [AgentSpec],
    pub max_score: f64,
    pub timeout: Duration,
    pub deadline: Instant,
}

impl EvaluationContext<'_> {
    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Runs a command in the sandbox within the remaining deadline.
    ///
    /// Expiry is reported as [`ExecutionError::EvaluatorTimeout`].
    pub async fn exec(&self, command: &str, env: &EnvMap) -> Result<ExecOutput, HarnessError> {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return Err(self.timeout_error().into());
        }
        let output = self.sandbox.exec(command, env, remaining).await?;
        if output.timed_out {
            return Err(self.timeout_error().into());
        }
        Ok(output)
    }

    /// Resolves a host path from the options against [`Self::base_dir`].
    pub fn host_path(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    fn timeout_error(&self) -> ExecutionError {
        ExecutionError::EvaluatorTimeout {
            name: self.evaluator.to_string(),
            timeout: self.timeout,
        }
    }
}

/// Pass/fail verdict of a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
}

/// What an evaluator reports back to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorOutcome {
    pub verdict: Verdict,
    pub score: f64,
    pub message: String,
    pub artifacts: BTreeMap<String, Value>,
}

impl EvaluatorOutcome {
    /// Passed with the given score.
    pub fn passed(score: f64, message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Passed,
            score,
            message: message.into(),
            artifacts: BTreeMap::new(),
        }
    }

    /// Failed with score 0.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Failed,
            score: 0.0,
            message: message.into(),
            artifacts: BTreeMap::new(),
        }
    }

    /// Overrides the score.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Attaches an artifact.
    pub fn with_artifact(mut self, key: impl Into<String>, value: Value) -> Self {
        self.artifacts.insert(key.into(), value);
        self
    }
}

/// A pipeline step.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Evaluates one instance. Must honor `ctx.deadline`.
    async fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<EvaluatorOutcome, HarnessError>;
}

/// Constructor from resolved options.
pub type EvaluatorFactory =
    Arc<dyn Fn(&OptionMap) -> Result<Box<dyn Evaluator>, ConfigurationError> + Send + Sync>;

/// Static table of evaluator types, read-only after construction.
#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    factories: BTreeMap<String, EvaluatorFactory>,
}

impl EvaluatorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in evaluator type.
    pub fn builtin() -> Self {
        Self::new()
            .register("command", |o| Ok(Box::new(CommandEvaluator::from_options(o)?)))
            .register("apply_patch", |o| Ok(Box::new(ApplyPatchEvaluator::from_options(o)?)))
            .register("test_suite", |o| Ok(Box::new(TestSuiteEvaluator::from_options(o)?)))
            .register("regression", |o| Ok(Box::new(RegressionEvaluator::from_options(o)?)))
            .register("run_agent", |o| Ok(Box::new(RunAgentEvaluator::from_options(o)?)))
    }

    /// Adds or replaces a factory.
    pub fn register<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&OptionMap) -> Result<Box<dyn Evaluator>, ConfigurationError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered type names, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Creates an evaluator of `kind` from resolved options.
    pub fn create(
        &self,
        kind: &str,
        options: &OptionMap,
    ) -> Result<Box<dyn Evaluator>, ConfigurationError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ConfigurationError::UnknownEvaluatorType(kind.to_string()))?;
        factory(options)
    }
}

impl std::fmt::Debug for EvaluatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluatorRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_kinds() {
        let registry = EvaluatorRegistry::builtin();
        assert_eq!(
            registry.kinds().collect::<Vec<_>>(),
            vec!["apply_patch", "command", "regression", "run_agent", "test_suite"]
        );
    }

    #[test]
    fn test_unknown_type_is_error() {
        let registry = EvaluatorRegistry::builtin();
        let err = registry
            .create("llm_judge", &OptionMap::default())
            .err()
            .unwrap();
        assert_eq!(err, ConfigurationError::UnknownEvaluatorType("llm_judge".into()));
    }

    #[test]
    fn test_create_validates_options() {
        let registry = EvaluatorRegistry::builtin();
        let missing = OptionMap::from_value("run", json!({})).unwrap();
        assert!(registry.create("command", &missing).is_err());
        let ok = OptionMap::from_value("run", json!({"command": "true"})).unwrap();
        assert!(registry.create("command", &ok).is_ok());
    }

    #[tokio::test]
    async fn test_context_exec_reports_expired_deadline() {
        let sandbox = testing::ScriptedSandbox::default();
        let env = EnvMap::new();
        let mut ctx = testing::context(&sandbox, &env, None, &[]);
        ctx.deadline = Instant::now();
        let err = ctx.exec("true", &env).await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Execution(ExecutionError::EvaluatorTimeout { .. })
        ));
        assert!(sandbox.commands().is_empty());
    }
}
