//! Runs an agent's command as a pipeline step.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{EvaluationContext, Evaluator, EvaluatorOutcome};
use crate::config::AgentSpec;
use crate::error::{ConfigurationError, HarnessError};
use crate::options::{merge_env, OptionMap};
use crate::sandbox::truncate;

/// Runs the named agent (or the evaluation's first agent).
///
/// The agent's env is layered over the evaluation env, and its own
/// `timeout_secs` further bounds the step deadline.
#[derive(Debug, Clone)]
pub struct RunAgentEvaluator {
    agent: Option<String>,
}

impl RunAgentEvaluator {
    /// Options: `agent` (name of an agent listed in the evaluation).
    pub fn from_options(options: &OptionMap) -> Result<Self, ConfigurationError> {
        Ok(Self {
            agent: options.str("agent")?,
        })
    }

    fn select<'a>(&self, agents: &'a [AgentSpec]) -> Result<&'a AgentSpec, ConfigurationError> {
        let found = match &self.agent {
            Some(name) => agents.iter().find(|a| &a.name == name),
            None => agents.first(),
        };
        found.ok_or_else(|| ConfigurationError::UnresolvedEntityReference {
            kind: "agent".to_string(),
            name: self.agent.clone().unwrap_or_else(|| "<first>".to_string()),
        })
    }
}

#[async_trait]
impl Evaluator for RunAgentEvaluator {
    async fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<EvaluatorOutcome, HarnessError> {
        let agent = self.select(ctx.agents)?;
        let env = merge_env([ctx.env, &agent.env]);

        let output = match agent.timeout_secs.map(Duration::from_secs) {
            Some(limit) if limit < ctx.remaining() => {
                let output = ctx.sandbox.exec(&agent.command, &env, limit).await?;
                if output.timed_out {
                    return Ok(EvaluatorOutcome::failed(format!(
                        "agent '{}' exceeded its {}s limit",
                        agent.name,
                        limit.as_secs()
                    )));
                }
                output
            }
            _ => ctx.exec(&agent.command, &env).await?,
        };

        tracing::info!(
            instance_id = ctx.instance_id,
            agent = %agent.name,
            exit_code = output.exit_code,
            duration_secs = output.duration.as_secs_f64(),
            "Agent finished"
        );

        let outcome = if output.success() {
            EvaluatorOutcome::passed(ctx.max_score, format!("agent '{}' succeeded", agent.name))
        } else {
            EvaluatorOutcome::failed(format!(
                "agent '{}' exited with {}: {}",
                agent.name,
                output.exit_code,
                output.diagnostic(500)
            ))
        };
        Ok(outcome
            .with_artifact("agent", json!(agent.name))
            .with_artifact("agent_output", json!(truncate(&output.stdout, 4000))))
    }
}
