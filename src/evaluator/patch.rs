//! Applies the instance's prediction patch inside the sandbox.

use async_trait::async_trait;
use serde_json::json;

use super::{EvaluationContext, Evaluator, EvaluatorOutcome};
use crate::error::{ConfigurationError, HarnessError};
use crate::options::OptionMap;
use crate::sandbox::{shell_quote, validate_file_path};

const DEFAULT_PATCH_FILE: &str = ".swe-eval/prediction.patch";
const DEFAULT_APPLY_COMMAND: &str = "git apply --verbose --whitespace=nowarn";

#[derive(Debug, Clone)]
pub struct ApplyPatchEvaluator {
    patch: Option<String>,
    patch_file: String,
    apply_command: String,
}

impl ApplyPatchEvaluator {
    /// Options: `patch` (overrides the prediction), `patch_file`, `apply_command`.
    ///
    /// The patch file path is appended to `apply_command`.
    pub fn from_options(options: &OptionMap) -> Result<Self, ConfigurationError> {
        let patch_file = options
            .str("patch_file")?
            .unwrap_or_else(|| DEFAULT_PATCH_FILE.to_string());
        validate_file_path(&patch_file).map_err(|e| ConfigurationError::InvalidOption {
            owner: options.owner().to_string(),
            option: "patch_file".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            patch: options.str("patch")?,
            patch_file,
            apply_command: options
                .str("apply_command")?
                .unwrap_or_else(|| DEFAULT_APPLY_COMMAND.to_string()),
        })
    }

    fn patch_text<'a>(&'a self, ctx: &'a EvaluationContext<'_>) -> Result<&'a str, ConfigurationError> {
        if let Some(patch) = &self.patch {
            return Ok(patch);
        }
        ctx.prediction
            .and_then(|p| p.patch.as_deref())
            .ok_or_else(|| ConfigurationError::MissingPrediction {
                prediction_id: ctx.prediction_id.unwrap_or_default().to_string(),
                source_name: format!("predictions for instance '{}'", ctx.instance_id),
            })
    }
}

#[async_trait]
impl Evaluator for ApplyPatchEvaluator {
    async fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<EvaluatorOutcome, HarnessError> {
        let patch = self.patch_text(ctx)?;
        if patch.trim().is_empty() {
            return Ok(EvaluatorOutcome::failed("prediction patch is empty"));
        }

        ctx.sandbox.write_file(&self.patch_file, patch).await?;
        let command = format!("{} {}", self.apply_command, shell_quote(&self.patch_file));
        let output = ctx.exec(&command, ctx.env).await?;

        let outcome = if output.success() {
            EvaluatorOutcome::passed(ctx.max_score, "patch applied")
        } else {
            EvaluatorOutcome::failed(format!("patch did not apply: {}", output.diagnostic(1000)))
        };
        Ok(outcome.with_artifact("patch_bytes", json!(patch.len())))
    }
}
