//! Plan phase: everything resolvable before the first sandbox starts.
//!
//! Any resolution or configuration error here aborts the whole run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{
    load_instances, load_predictions, resolve_agents, AgentSpec, ConfigLoader, HarnessConfig,
    Instance, Prediction, PredictionSet,
};
use crate::configurer::{Configurer, ConfigurerRegistry};
use crate::error::HarnessError;
use crate::evaluator::EvaluatorRegistry;
use crate::options::{EnvLayers, EnvMap, OptionMap, OptionResolver};
use crate::pipeline::EvaluationPipeline;
use crate::report::{config_digest, resolve_report_path};
use crate::sandbox::{container_name, SandboxKind, SandboxPlan};
use crate::template::{resolve, resolve_value, ResolutionScope};

/// Everything a run owns: configuration, registries and outer scopes.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: HarnessConfig,
    pub configurers: Arc<ConfigurerRegistry>,
    pub evaluators: Arc<EvaluatorRegistry>,
    pub cli: BTreeMap<String, String>,
    pub env: EnvMap,
}

impl RunContext {
    /// Context with the built-in registries and the process environment.
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            configurers: Arc::new(ConfigurerRegistry::builtin()),
            evaluators: Arc::new(EvaluatorRegistry::builtin()),
            cli: BTreeMap::new(),
            env: ResolutionScope::process_env(),
        }
    }

    pub fn with_cli(mut self, cli: BTreeMap<String, String>) -> Self {
        self.cli = cli;
        self
    }

    pub fn with_env(mut self, env: EnvMap) -> Self {
        self.env = env;
        self
    }

    pub fn with_configurers(mut self, registry: ConfigurerRegistry) -> Self {
        self.configurers = Arc::new(registry);
        self
    }

    pub fn with_evaluators(mut self, registry: EvaluatorRegistry) -> Self {
        self.evaluators = Arc::new(registry);
        self
    }

    /// Scope with env and CLI but no instance.
    pub fn base_scope(&self) -> ResolutionScope {
        ResolutionScope::new()
            .with_env(self.env.clone())
            .with_cli(self.cli.clone())
    }
}

/// Caller-supplied narrowing of a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Only evaluate these instances (combined with the dataset filter).
    pub instance_ids: Vec<String>,
    /// Overrides the configured concurrency.
    pub concurrency: Option<usize>,
}

/// A configurer ready to run, with its merged env.
pub struct PlannedConfigurer {
    pub configurer: Box<dyn Configurer>,
    pub env: EnvMap,
}

/// One evaluation of one instance, run in a sandbox of its own.
#[derive(Debug, Clone)]
pub struct EvaluationPlan {
    pub pipeline: Arc<EvaluationPipeline>,
    pub sandbox: SandboxPlan,
    pub agents: Vec<AgentSpec>,
    pub env: EnvMap,
}

/// Fully resolved work for one instance.
pub struct InstancePlan {
    pub instance_id: String,
    pub scope: ResolutionScope,
    /// Settings shared by the sandboxes of every evaluation.
    pub sandbox: SandboxPlan,
    pub configurers: Vec<PlannedConfigurer>,
    pub evaluations: Vec<EvaluationPlan>,
    pub prediction: Option<Prediction>,
    pub prediction_id: Option<String>,
}

/// Output of the plan phase.
pub struct RunPlan {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub config_digest: String,
    pub report_path: PathBuf,
    pub concurrency: usize,
    pub instances: Vec<InstancePlan>,
}

impl RunPlan {
    /// Number of (instance, evaluation) pairs.
    pub fn evaluation_count(&self) -> usize {
        self.instances.iter().map(|i| i.evaluations.len()).sum()
    }
}

/// Validates the configuration and resolves every instance.
pub fn build_plan(ctx: &RunContext, options: &RunOptions) -> Result<RunPlan, HarnessError> {
    let config = &ctx.config;
    ConfigLoader::validate(config, &ctx.configurers, &ctx.evaluators)?;

    let started_at = Utc::now();
    let base = ctx.base_scope();
    let run_id = ctx
        .cli
        .get("run_id")
        .cloned()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let dataset_path = config.resolve_path(&resolve(&config.dataset.path, &base)?);
    let instances = load_instances(&config.dataset, &dataset_path, &options.instance_ids)?;

    let predictions = match &config.predictions {
        Some(spec) => {
            let path = config.resolve_path(&resolve(&spec.path, &base)?);
            Some(load_predictions(spec, &path)?)
        }
        None => None,
    };

    let pipelines: Vec<Arc<EvaluationPipeline>> =
        config.pipelines()?.into_iter().map(Arc::new).collect();

    let mut planned = Vec::with_capacity(instances.len());
    for instance in &instances {
        planned.push(plan_instance(ctx, &base, instance, &pipelines, predictions.as_ref())?);
    }

    let digest_input: Vec<EvaluationPipeline> = pipelines.iter().map(|p| (**p).clone()).collect();
    let plan = RunPlan {
        run_id,
        started_at,
        config_digest: config_digest(&digest_input),
        report_path: resolve_report_path(config, &base)?,
        concurrency: options.concurrency.unwrap_or(config.concurrency).max(1),
        instances: planned,
    };
    info!(
        run_id = %plan.run_id,
        instances = plan.instances.len(),
        evaluations = plan.evaluation_count(),
        "Run planned"
    );
    Ok(plan)
}

fn plan_instance(
    ctx: &RunContext,
    base: &ResolutionScope,
    instance: &Instance,
    pipelines: &[Arc<EvaluationPipeline>],
    predictions: Option<&PredictionSet>,
) -> Result<InstancePlan, HarnessError> {
    let config = &ctx.config;
    let environment = &config.environment;
    let scope = base.clone().with_instance(instance.record.clone());
    let resolver = OptionResolver::new(&scope);

    let mut sandbox = SandboxPlan::resolve(
        &environment.sandbox,
        &environment.configurers,
        &resolver,
        &instance.id,
    )?;
    // A local workdir is a host path relative to the config file.
    if sandbox.kind == SandboxKind::Local {
        sandbox.workdir = sandbox
            .workdir
            .take()
            .map(|dir| config.resolve_path(&dir).to_string_lossy().into_owned());
    }

    let empty = EnvMap::new();
    let prediction_env = predictions.map_or(&empty, |p| &p.env);

    let mut configurers = Vec::with_capacity(environment.configurers.len());
    for spec in &environment.configurers {
        let resolved = resolve_value(&Value::Object(spec.options.clone()), &scope)?;
        let options = OptionMap::from_value(spec.name.clone(), resolved)?;
        let configurer = ctx.configurers.create(&spec.name, &options, &scope)?;
        let env = EnvLayers::new()
            .push("sandbox", &environment.sandbox.env)
            .push(format!("configurer:{}", spec.name), &spec.env)
            .push("prediction", prediction_env)
            .resolve(&scope)?;
        configurers.push(PlannedConfigurer { configurer, env });
    }

    let mut evaluations = Vec::with_capacity(pipelines.len());
    for (spec, pipeline) in config.evaluations.iter().zip(pipelines) {
        let agents = resolve_agents(&spec.agents, &config.agents)?
            .iter()
            .map(|agent| agent.resolve(&scope))
            .collect::<Result<Vec<_>, _>>()?;
        let env = EnvLayers::new()
            .push("sandbox", &environment.sandbox.env)
            .push(format!("evaluation:{}", spec.name), &spec.env)
            .push("prediction", prediction_env)
            .resolve(&scope)?;
        evaluations.push(EvaluationPlan {
            pipeline: Arc::clone(pipeline),
            sandbox: evaluation_sandbox(&sandbox, &instance.id, &spec.name),
            agents,
            env,
        });
    }

    debug!(instance_id = %instance.id, sandbox = %sandbox.kind, configurers = configurers.len(), "Instance planned");

    Ok(InstancePlan {
        instance_id: instance.id.clone(),
        scope,
        sandbox,
        configurers,
        evaluations,
        prediction: predictions.and_then(|p| p.get(&instance.id)).cloned(),
        prediction_id: predictions.map(|p| p.id.clone()),
    })
}

/// Sandbox for one (instance, evaluation) pair.
///
/// Names are unique per pair, and a local workdir gets a subdirectory per
/// pair, so no state crosses evaluation boundaries.
fn evaluation_sandbox(shared: &SandboxPlan, instance_id: &str, evaluation: &str) -> SandboxPlan {
    let mut sandbox = shared.clone();
    sandbox.name = container_name(&format!("{instance_id}-{evaluation}"));
    if sandbox.kind == SandboxKind::Local {
        sandbox.workdir = sandbox.workdir.take().map(|dir| {
            PathBuf::from(dir)
                .join(&sandbox.name)
                .to_string_lossy()
                .into_owned()
        });
    }
    sandbox
}
