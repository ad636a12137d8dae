//! Run orchestration.
//!
//! # Architecture
//!
//! ```text
//! config + dataset ──plan──▶ [InstancePlan] ──execute──▶ [InstanceReport] ──finish──▶ report.json
//! ```
//!
//! The plan phase resolves every instance up front and fails fast. The
//! execute phase runs instances concurrently (bounded by `concurrency`).
//! Each evaluation of an instance is an isolated unit with a sandbox of
//! its own:
//!
//! 1. create the evaluation's sandbox
//! 2. run configurers in declared order
//! 3. run the evaluation pipeline and score it
//! 4. tear the sandbox down, whatever happened
//!
//! # Example
//!
//! ```ignore
//! use swe_eval::config::ConfigLoader;
//! use swe_eval::runner::{RunContext, RunOptions, Runner};
//!
//! let config = ConfigLoader::load_file("harness.yaml")?;
//! let runner = Runner::new(RunContext::new(config), RunOptions::default());
//! let report = runner.run().await?;
//! println!("mean score: {:.2}", report.summary.mean_score);
//! ```

mod plan;

pub use plan::{
    build_plan, EvaluationPlan, InstancePlan, PlannedConfigurer, RunContext, RunOptions, RunPlan,
};

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::error::HarnessError;
use crate::pipeline::{PipelineExecutor, PipelineInput, PipelineResult};
use crate::report::{InstanceReport, RunReport};
use crate::sandbox::{create_sandbox, Sandbox};
use crate::scoring::{compute_score, ScoringConfig};

/// Drives one run from plan to report.
pub struct Runner {
    ctx: RunContext,
    options: RunOptions,
}

impl Runner {
    pub fn new(ctx: RunContext, options: RunOptions) -> Self {
        Self { ctx, options }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Plan phase only.
    pub fn plan(&self) -> Result<RunPlan, HarnessError> {
        build_plan(&self.ctx, &self.options)
    }

    /// Runs every planned instance, at most `plan.concurrency` at a time.
    ///
    /// Reports come back in plan order.
    pub async fn execute(&self, plan: &RunPlan) -> Vec<InstanceReport> {
        let semaphore = Arc::new(Semaphore::new(plan.concurrency));
        let executor = PipelineExecutor::new(Arc::clone(&self.ctx.evaluators));
        let base_dir = self.ctx.config.base_dir.as_path();

        let futures = plan.instances.iter().map(|instance| {
            let semaphore = Arc::clone(&semaphore);
            let executor = &executor;
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let message = format!("Failed to acquire permit: {}", e);
                        return instance
                            .evaluations
                            .iter()
                            .map(|evaluation| setup_failed(instance, evaluation, message.clone()))
                            .collect::<Vec<_>>();
                    }
                };
                run_instance(executor, instance, base_dir).await
            }
        });

        futures::future::join_all(futures)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Builds the report and writes it to the planned path.
    pub fn finish(&self, plan: &RunPlan, results: Vec<InstanceReport>) -> Result<RunReport, HarnessError> {
        let report = RunReport::new(plan.run_id.clone(), plan.started_at, plan.config_digest.clone(), results);
        report.write(&plan.report_path)?;
        info!(
            run_id = %report.run_id,
            total = report.summary.total,
            passed = report.summary.passed,
            mean_score = report.summary.mean_score,
            "Run finished"
        );
        Ok(report)
    }

    /// Plan, execute and write the report.
    pub async fn run(&self) -> Result<RunReport, HarnessError> {
        let plan = self.plan()?;
        let results = self.execute(&plan).await;
        self.finish(&plan, results)
    }
}

async fn run_instance(
    executor: &PipelineExecutor,
    plan: &InstancePlan,
    base_dir: &Path,
) -> Vec<InstanceReport> {
    info!(instance_id = %plan.instance_id, sandbox = %plan.sandbox.kind, "Starting instance");

    let mut reports = Vec::with_capacity(plan.evaluations.len());
    for evaluation in &plan.evaluations {
        reports.push(run_evaluation(executor, plan, evaluation, base_dir).await);
    }
    reports
}

async fn run_evaluation(
    executor: &PipelineExecutor,
    plan: &InstancePlan,
    evaluation: &EvaluationPlan,
    base_dir: &Path,
) -> InstanceReport {
    let sandbox = match create_sandbox(&evaluation.sandbox).await {
        Ok(sandbox) => sandbox,
        Err(e) => {
            error!(instance_id = %plan.instance_id, sandbox = %evaluation.sandbox.name, error = %e, "Sandbox creation failed");
            return setup_failed(plan, evaluation, e.to_string());
        }
    };

    let report = match configure(plan, sandbox.as_ref()).await {
        Ok(()) => evaluate(executor, plan, evaluation, sandbox.as_ref(), base_dir).await,
        Err(e) => {
            error!(instance_id = %plan.instance_id, sandbox = %evaluation.sandbox.name, error = %e, "Environment setup failed");
            setup_failed(plan, evaluation, e.to_string())
        }
    };

    if let Err(e) = sandbox.teardown().await {
        warn!(instance_id = %plan.instance_id, sandbox = %evaluation.sandbox.name, error = %e, "Sandbox teardown failed");
    }
    report
}

async fn configure(plan: &InstancePlan, sandbox: &dyn Sandbox) -> Result<(), HarnessError> {
    for planned in &plan.configurers {
        info!(
            instance_id = %plan.instance_id,
            configurer = planned.configurer.name(),
            sandbox = sandbox.id(),
            "Running configurer"
        );
        planned.configurer.configure(sandbox, &planned.env).await?;
    }
    Ok(())
}

async fn evaluate(
    executor: &PipelineExecutor,
    plan: &InstancePlan,
    evaluation: &EvaluationPlan,
    sandbox: &dyn Sandbox,
    base_dir: &Path,
) -> InstanceReport {
    let input = PipelineInput {
        instance_id: &plan.instance_id,
        scope: &plan.scope,
        sandbox,
        env: &evaluation.env,
        base_dir,
        prediction: plan.prediction.as_ref(),
        prediction_id: plan.prediction_id.as_deref(),
        agents: &evaluation.agents,
    };
    let result = executor.run(&evaluation.pipeline, &input).await;
    scored(plan, evaluation.pipeline.scoring(), result, None)
}

fn setup_failed(plan: &InstancePlan, evaluation: &EvaluationPlan, message: String) -> InstanceReport {
    scored(
        plan,
        evaluation.pipeline.scoring(),
        PipelineResult::not_started(&evaluation.pipeline),
        Some(message),
    )
}

fn scored(
    plan: &InstancePlan,
    scoring: &ScoringConfig,
    pipeline: PipelineResult,
    setup_error: Option<String>,
) -> InstanceReport {
    let score = compute_score(&pipeline, scoring);
    let passed = setup_error.is_none() && scoring.is_passing(score, &pipeline);
    info!(
        instance_id = %plan.instance_id,
        evaluation = %pipeline.evaluation,
        status = %pipeline.status,
        score,
        passed,
        "Evaluation scored"
    );
    InstanceReport {
        instance_id: plan.instance_id.clone(),
        evaluation: pipeline.evaluation.clone(),
        prediction_id: plan.prediction_id.clone(),
        pipeline,
        score,
        passed,
        setup_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigLoader;
    use crate::options::EnvMap;
    use crate::pipeline::{EvaluatorStatus, PipelineStatus};

    fn runner(dir: &std::path::Path, yaml: &str) -> Runner {
        std::fs::write(
            dir.join("instances.jsonl"),
            "{\"instance_id\": \"a\"}\n{\"instance_id\": \"b\"}\n",
        )
        .unwrap();
        let mut config = ConfigLoader::from_yaml_str(yaml).unwrap();
        config.base_dir = dir.to_path_buf();
        Runner::new(RunContext::new(config).with_env(EnvMap::new()), RunOptions::default())
    }

    #[tokio::test]
    async fn test_run_with_local_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(
            dir.path(),
            r#"
dataset: { path: instances.jsonl }
environment:
  sandbox: { type: local, workdir: work }
  configurers:
    - { name: bash, options: { script: "echo ready > setup.txt" } }
evaluations:
  - name: default
    evaluators:
      - { name: setup_ran, type: command, options: { command: "test -f setup.txt" } }
      - { name: echo_id, type: command, max_score: 2, options: { command: "echo {instance.instance_id}" } }
report: { path: out/report.json }
concurrency: 2
"#,
        );

        let report = runner.run().await.unwrap();
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results[0].instance_id, "a");
        assert_eq!(report.results[1].instance_id, "b");
        for result in &report.results {
            assert_eq!(result.pipeline.status, PipelineStatus::Completed);
            assert_eq!(result.score, 3.0);
            assert!(result.passed);
        }
        assert_eq!(report.summary.passed, 2);
        assert!(dir.path().join("out/report.json").exists());
    }

    #[tokio::test]
    async fn test_evaluations_do_not_share_sandbox_state() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(
            dir.path(),
            r#"
dataset: { path: instances.jsonl, instance_ids: [a] }
environment:
  sandbox: { type: local, workdir: work }
evaluations:
  - name: first
    evaluators:
      - { name: fresh, type: command, options: { command: "test ! -f seen && touch seen" } }
  - name: second
    evaluators:
      - { name: fresh, type: command, options: { command: "test ! -f seen && touch seen" } }
report: { path: out/report.json }
"#,
        );

        let report = runner.run().await.unwrap();
        assert_eq!(report.results.len(), 2);
        for result in &report.results {
            assert_eq!(
                result.pipeline.get("fresh").unwrap().status,
                EvaluatorStatus::Passed,
                "evaluation '{}' saw state from another evaluation",
                result.evaluation
            );
        }
        assert!(dir.path().join("work/swe-eval-a-first/seen").exists());
        assert!(dir.path().join("work/swe-eval-a-second/seen").exists());
    }

    #[tokio::test]
    async fn test_setup_failure_reports_pending_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(
            dir.path(),
            r#"
dataset: { path: instances.jsonl }
environment:
  sandbox: { type: local }
  configurers:
    - { name: bash, options: { script: "exit 7" } }
evaluations:
  - name: default
    evaluators:
      - { name: never, type: command, options: { command: "true" } }
report: { path: out/report.json }
"#,
        );

        let plan = runner.plan().unwrap();
        let results = runner.execute(&plan).await;
        assert_eq!(results.len(), 2);
        let first = &results[0];
        assert_eq!(first.pipeline.status, PipelineStatus::TerminatedEarly);
        assert_eq!(first.pipeline.results[0].status, EvaluatorStatus::Pending);
        assert!(first.setup_error.as_deref().unwrap().contains("bash"));
        assert!(!first.passed);
    }
}
