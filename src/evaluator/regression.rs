//! Detects tests that passed in a baseline run but fail now.
//!
//! The baseline file is JSON mapping a prediction id to the list of test
//! commands that passed for it:
//!
//! ```json
//! { "gold": ["pytest tests/test_a.py", "pytest tests/test_b.py"] }
//! ```
//!
//! A relative `baseline_path` resolves against the config file's directory.
//! A missing baseline file or a prediction id absent from it is a
//! configuration error; the evaluator is recorded as errored, never skipped.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;

use super::test_suite::run_tests;
use super::{EvaluationContext, Evaluator, EvaluatorOutcome};
use crate::error::{ConfigurationError, HarnessError};
use crate::options::OptionMap;

#[derive(Debug, Clone)]
pub struct RegressionEvaluator {
    tests: Vec<String>,
    baseline_path: PathBuf,
    prediction: Option<String>,
}

impl RegressionEvaluator {
    /// Options: `tests`, `baseline_path` (host path), `prediction` (defaults
    /// to the run's prediction id).
    pub fn from_options(options: &OptionMap) -> Result<Self, ConfigurationError> {
        let tests = options.string_list("tests")?;
        if tests.is_empty() {
            return Err(ConfigurationError::MissingOption {
                owner: options.owner().to_string(),
                option: "tests".to_string(),
            });
        }
        Ok(Self {
            tests,
            baseline_path: PathBuf::from(options.required_str("baseline_path")?),
            prediction: options.str("prediction")?,
        })
    }

    async fn baseline(
        &self,
        path: &Path,
        prediction_id: &str,
    ) -> Result<HashSet<String>, HarnessError> {
        let display = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|_| ConfigurationError::MissingBaseline(display.clone()))?;
        let mut baselines: HashMap<String, Vec<String>> = serde_json::from_str(&content)
            .map_err(|e| ConfigurationError::Invalid(format!("baseline '{display}': {e}")))?;
        baselines
            .remove(prediction_id)
            .map(|tests| tests.into_iter().collect())
            .ok_or_else(|| {
                ConfigurationError::MissingPrediction {
                    prediction_id: prediction_id.to_string(),
                    source_name: format!("baseline '{display}'"),
                }
                .into()
            })
    }
}

#[async_trait]
impl Evaluator for RegressionEvaluator {
    async fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<EvaluatorOutcome, HarnessError> {
        let prediction_id = self
            .prediction
            .as_deref()
            .or(ctx.prediction_id)
            .ok_or_else(|| ConfigurationError::MissingOption {
                owner: ctx.evaluator.to_string(),
                option: "prediction".to_string(),
            })?;
        let baseline = self
            .baseline(&ctx.host_path(&self.baseline_path), prediction_id)
            .await?;

        let runs = run_tests(ctx, &self.tests).await?;
        let covered: Vec<_> = runs.iter().filter(|r| baseline.contains(&r.command)).collect();
        let regressions: Vec<&str> = covered
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.command.as_str())
            .collect();

        let score = if covered.is_empty() {
            ctx.max_score
        } else {
            ctx.max_score * (covered.len() - regressions.len()) as f64 / covered.len() as f64
        };

        let outcome = if regressions.is_empty() {
            EvaluatorOutcome::passed(score, format!("no regressions in {} baseline tests", covered.len()))
        } else {
            EvaluatorOutcome::failed(format!(
                "{} of {} baseline tests regressed",
                regressions.len(),
                covered.len()
            ))
            .with_score(score)
        };
        Ok(outcome.with_artifact("regressions", json!(regressions)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::testing::{context, ScriptedSandbox};
    use crate::evaluator::Verdict;
    use crate::options::EnvMap;
    use serde_json::Value;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn baseline_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn evaluator(baseline: &str, extra: Value) -> RegressionEvaluator {
        let mut options = json!({
            "tests": ["test_a", "test_b", "test_new"],
            "baseline_path": baseline,
        });
        if let (Some(map), Value::Object(extra)) = (options.as_object_mut(), extra) {
            map.extend(extra);
        }
        RegressionEvaluator::from_options(&OptionMap::from_value("reg", options).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_detects_regression() {
        let file = baseline_file(r#"{"gold": ["test_a", "test_b"]}"#);
        let sandbox = ScriptedSandbox::default().reply("test_b", 1, "").reply("test_new", 1, "");
        let env = EnvMap::new();
        let outcome = evaluator(&file.path().display().to_string(), json!({}))
            .evaluate(&context(&sandbox, &env, None, &[]))
            .await
            .unwrap();

        assert_eq!(outcome.verdict, Verdict::Failed);
        assert_eq!(outcome.score, 5.0);
        assert_eq!(outcome.artifacts["regressions"], json!(["test_b"]));
    }

    #[tokio::test]
    async fn test_no_regression_passes() {
        let file = baseline_file(r#"{"gold": ["test_a"]}"#);
        let sandbox = ScriptedSandbox::default().reply("test_new", 1, "");
        let env = EnvMap::new();
        let outcome = evaluator(&file.path().display().to_string(), json!({}))
            .evaluate(&context(&sandbox, &env, None, &[]))
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Passed);
        assert_eq!(outcome.score, 10.0);
    }

    #[tokio::test]
    async fn test_relative_baseline_resolves_against_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("baseline.json"), r#"{"gold": ["test_a"]}"#).unwrap();
        let sandbox = ScriptedSandbox::default();
        let env = EnvMap::new();
        let mut ctx = context(&sandbox, &env, None, &[]);
        ctx.base_dir = dir.path();

        let outcome = evaluator("baseline.json", json!({}))
            .evaluate(&ctx)
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Passed);
        assert_eq!(outcome.message, "no regressions in 1 baseline tests");
    }

    #[tokio::test]
    async fn test_missing_baseline_file() {
        let sandbox = ScriptedSandbox::default();
        let env = EnvMap::new();
        let err = evaluator("/nonexistent/baseline.json", json!({}))
            .evaluate(&context(&sandbox, &env, None, &[]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Configuration(ConfigurationError::MissingBaseline(_))
        ));
        assert!(sandbox.commands().is_empty());
    }

    #[tokio::test]
    async fn test_prediction_absent_from_baseline() {
        let file = baseline_file(r#"{"gold": ["test_a"]}"#);
        let sandbox = ScriptedSandbox::default();
        let env = EnvMap::new();
        let err = evaluator(&file.path().display().to_string(), json!({"prediction": "model-x"}))
            .evaluate(&context(&sandbox, &env, None, &[]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Configuration(ConfigurationError::MissingPrediction { ref prediction_id, .. })
                if prediction_id == "model-x"
        ));
    }
}
