//! Runs a single command and checks its exit code (and optionally its output).

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use super::{EvaluationContext, Evaluator, EvaluatorOutcome};
use crate::error::{ConfigurationError, HarnessError};
use crate::options::OptionMap;
use crate::sandbox::truncate;

#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    command: String,
    expected_exit_codes: Vec<i32>,
    expected_output: Option<Regex>,
}

impl CommandEvaluator {
    /// Options: `command` (required), `expected_exit_codes` (default `[0]`),
    /// `expected_output` (regex that stdout must match).
    pub fn from_options(options: &OptionMap) -> Result<Self, ConfigurationError> {
        let expected_output = options
            .str("expected_output")?
            .map(|pattern| {
                Regex::new(&pattern).map_err(|e| ConfigurationError::InvalidOption {
                    owner: options.owner().to_string(),
                    option: "expected_output".to_string(),
                    message: format!("invalid regex: {e}"),
                })
            })
            .transpose()?;
        Ok(Self {
            command: options.required_str("command")?,
            expected_exit_codes: options
                .i32_list("expected_exit_codes")?
                .unwrap_or_else(|| vec![0]),
            expected_output,
        })
    }
}

#[async_trait]
impl Evaluator for CommandEvaluator {
    async fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<EvaluatorOutcome, HarnessError> {
        let output = ctx.exec(&self.command, ctx.env).await?;
        let outcome = if !self.expected_exit_codes.contains(&output.exit_code) {
            EvaluatorOutcome::failed(format!(
                "exit code {} not in {:?}: {}",
                output.exit_code,
                self.expected_exit_codes,
                output.diagnostic(500)
            ))
        } else {
            match &self.expected_output {
                Some(re) if !re.is_match(&output.stdout) => EvaluatorOutcome::failed(format!(
                    "output does not match '{}': {}",
                    re.as_str(),
                    truncate(&output.stdout, 500)
                )),
                _ => EvaluatorOutcome::passed(ctx.max_score, format!("exit code {}", output.exit_code)),
            }
        };
        Ok(outcome
            .with_artifact("exit_code", json!(output.exit_code))
            .with_artifact("stdout", json!(truncate(&output.stdout, 4000))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::testing::{context, ScriptedSandbox};
    use crate::evaluator::Verdict;
    use crate::options::EnvMap;
    use serde_json::json;

    fn evaluator(options: serde_json::Value) -> CommandEvaluator {
        CommandEvaluator::from_options(&OptionMap::from_value("cmd", options).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_pass_on_expected_exit_code() {
        let sandbox = ScriptedSandbox::default().reply("lint", 0, "clean");
        let env = EnvMap::new();
        let outcome = evaluator(json!({"command": "make lint"}))
            .evaluate(&context(&sandbox, &env, None, &[]))
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Passed);
        assert_eq!(outcome.score, 10.0);
        assert_eq!(outcome.artifacts["stdout"], "clean");
    }

    #[tokio::test]
    async fn test_custom_exit_codes() {
        let sandbox = ScriptedSandbox::default().reply("grep", 1, "");
        let env = EnvMap::new();
        let ctx = context(&sandbox, &env, None, &[]);

        let outcome = evaluator(json!({"command": "grep TODO src", "expected_exit_codes": [1]}))
            .evaluate(&ctx)
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Passed);

        let outcome = evaluator(json!({"command": "grep TODO src"}))
            .evaluate(&ctx)
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Failed);
        assert_eq!(outcome.score, 0.0);
    }

    #[tokio::test]
    async fn test_expected_output_pattern() {
        let sandbox = ScriptedSandbox::default().reply("pytest", 0, "== 12 passed in 0.4s ==");
        let env = EnvMap::new();
        let ctx = context(&sandbox, &env, None, &[]);

        let outcome = evaluator(json!({"command": "pytest -q", "expected_output": r"\d+ passed"}))
            .evaluate(&ctx)
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Passed);

        let outcome = evaluator(json!({"command": "pytest -q", "expected_output": "failed"}))
            .evaluate(&ctx)
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Failed);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let options = OptionMap::from_value("cmd", json!({"command": "x", "expected_output": "("})).unwrap();
        assert!(matches!(
            CommandEvaluator::from_options(&options),
            Err(ConfigurationError::InvalidOption { .. })
        ));
    }
}
