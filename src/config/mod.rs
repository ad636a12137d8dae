//! Harness configuration: the YAML document, its loader and the entity
//! and dataset helpers built on it.
//!
//! ```yaml
//! agents: [...]
//! dataset: { path, id_field, instance_ids, limit }
//! environment: { sandbox: {...}, configurers: [...] }
//! predictions: { id, path, env }
//! evaluations: [{ name, agents, env, evaluators, scoring }]
//! report: { path }
//! concurrency: 4
//! ```

pub mod dataset;
pub mod entity;
pub mod loader;
pub mod schema;

pub use dataset::{load_instances, load_predictions, Instance, Prediction, PredictionSet};
pub use entity::{resolve_agent, resolve_agents};
pub use loader::ConfigLoader;
pub use schema::{
    AgentOverride, AgentRef, AgentSpec, ConfigurerSpec, DatasetSpec, EnvironmentSpec, EvaluationSpec,
    HarnessConfig, PredictionSpec, ReportSpec, SandboxSpec,
};
