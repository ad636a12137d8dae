//! Runs a list of test commands and scores by pass ratio.

use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;

use super::{EvaluationContext, Evaluator, EvaluatorOutcome};
use crate::error::{ConfigurationError, HarnessError};
use crate::options::OptionMap;

/// Outcome of one test command.
#[derive(Debug, Clone, Serialize)]
pub struct TestRun {
    pub command: String,
    pub exit_code: i32,
    pub passed: bool,
    pub duration_ms: u64,
}

/// Runs each command in order; all must pass for a `Passed` verdict.
#[derive(Debug, Clone)]
pub struct TestSuiteEvaluator {
    tests: Vec<String>,
}

impl TestSuiteEvaluator {
    /// Options: `tests` (non-empty list of commands).
    pub fn from_options(options: &OptionMap) -> Result<Self, ConfigurationError> {
        let tests = options.string_list("tests")?;
        if tests.is_empty() {
            return Err(ConfigurationError::MissingOption {
                owner: options.owner().to_string(),
                option: "tests".to_string(),
            });
        }
        Ok(Self { tests })
    }
}

/// Runs commands sequentially in the sandbox, sharing the context deadline.
pub(crate) async fn run_tests(
    ctx: &EvaluationContext<'_>,
    tests: &[String],
) -> Result<Vec<TestRun>, HarnessError> {
    let mut runs = Vec::with_capacity(tests.len());
    for command in tests {
        let start = Instant::now();
        let output = ctx.exec(command, ctx.env).await?;
        tracing::debug!(
            instance_id = ctx.instance_id,
            evaluator = ctx.evaluator,
            command = %command,
            exit_code = output.exit_code,
            "Test command finished"
        );
        runs.push(TestRun {
            command: command.clone(),
            exit_code: output.exit_code,
            passed: output.success(),
            duration_ms: start.elapsed().as_millis() as u64,
        });
    }
    Ok(runs)
}

#[async_trait]
impl Evaluator for TestSuiteEvaluator {
    async fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<EvaluatorOutcome, HarnessError> {
        let runs = run_tests(ctx, &self.tests).await?;
        let passed = runs.iter().filter(|r| r.passed).count();
        let total = runs.len();
        let score = ctx.max_score * passed as f64 / total as f64;
        let message = format!("{passed}/{total} tests passed");

        let outcome = if passed == total {
            EvaluatorOutcome::passed(score, message)
        } else {
            EvaluatorOutcome::failed(message).with_score(score)
        };
        Ok(outcome.with_artifact("tests", serde_json::to_value(&runs)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::testing::{context, ScriptedSandbox};
    use crate::evaluator::Verdict;
    use crate::options::EnvMap;
    use serde_json::json;

    fn evaluator(tests: serde_json::Value) -> TestSuiteEvaluator {
        TestSuiteEvaluator::from_options(&OptionMap::from_value("t", json!({"tests": tests})).unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn test_partial_pass_scores_ratio() {
        let sandbox = ScriptedSandbox::default().reply("FooTest", 0, "").reply("BarTest", 1, "");
        let env = EnvMap::new();
        let outcome = evaluator(json!([
            "mvn test -Dtest=FooTest",
            "mvn test -Dtest=BarTest",
            "mvn test -Dtest=BazTest",
            "mvn test -Dtest=QuxTest"
        ]))
        .evaluate(&context(&sandbox, &env, None, &[]))
        .await
        .unwrap();

        assert_eq!(outcome.verdict, Verdict::Failed);
        assert_eq!(outcome.score, 7.5);
        assert_eq!(outcome.message, "3/4 tests passed");
        assert_eq!(outcome.artifacts["tests"][1]["passed"], false);
        assert_eq!(sandbox.commands().len(), 4);
    }

    #[tokio::test]
    async fn test_all_pass() {
        let sandbox = ScriptedSandbox::default();
        let env = EnvMap::new();
        let outcome = evaluator(json!("pytest -q"))
            .evaluate(&context(&sandbox, &env, None, &[]))
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Passed);
        assert_eq!(outcome.score, 10.0);
    }

    #[test]
    fn test_requires_tests() {
        let options = OptionMap::from_value("t", json!({"tests": []})).unwrap();
        assert!(matches!(
            TestSuiteEvaluator::from_options(&options),
            Err(ConfigurationError::MissingOption { .. })
        ));
    }
}
