//! Serde schema of the harness configuration document.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::options::{deserialize_env_map, EnvMap};
use crate::pipeline::EvaluatorSpec;
use crate::scoring::ScoringConfig;

/// Root of a configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Top-level agent declarations, referenced by name from evaluations.
    #[serde(default)]
    pub agents: Vec<AgentSpec>,

    pub dataset: DatasetSpec,

    #[serde(default)]
    pub environment: EnvironmentSpec,

    #[serde(default)]
    pub predictions: Option<PredictionSpec>,

    pub evaluations: Vec<EvaluationSpec>,

    #[serde(default)]
    pub report: ReportSpec,

    /// Maximum number of instances evaluated at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Directory relative paths are resolved against; set by the loader.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl HarnessConfig {
    /// Resolves a possibly relative path against the config directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            path
        } else {
            self.base_dir.join(path)
        }
    }

    /// Looks up a declared agent.
    pub fn agent(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.name == name)
    }
}

/// A declared agent entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "deserialize_env_map")]
    pub env: EnvMap,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub options: Map<String, Value>,
}

/// Agent entry inside an evaluation: a bare name or a partial override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentRef {
    Name(String),
    Override(AgentOverride),
}

impl AgentRef {
    /// Name of the referenced top-level agent.
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Override(o) => &o.name,
        }
    }
}

/// Fields an evaluation may override on a declared agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOverride {
    pub name: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, deserialize_with = "deserialize_env_map")]
    pub env: EnvMap,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
}

/// Source of dataset instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// JSON Lines or JSON array file; templated against env and CLI.
    pub path: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Only evaluate these instances (empty = all).
    #[serde(default)]
    pub instance_ids: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Sandbox and configurer declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub sandbox: SandboxSpec,
    #[serde(default)]
    pub configurers: Vec<ConfigurerSpec>,
}

/// Sandbox options (`type`, `image`, `workdir`, `force_rebuild`) plus env.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxSpec {
    #[serde(default, deserialize_with = "deserialize_env_map")]
    pub env: EnvMap,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// A configurer declaration, immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurerSpec {
    pub name: String,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default, deserialize_with = "deserialize_env_map")]
    pub env: EnvMap,
}

/// Candidate predictions (patches) to evaluate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSpec {
    pub id: String,
    /// JSON Lines or JSON array file; templated against env and CLI.
    pub path: String,
    #[serde(default, deserialize_with = "deserialize_env_map")]
    pub env: EnvMap,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default = "default_patch_field")]
    pub patch_field: String,
}

/// One evaluation: a pipeline of evaluators plus scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSpec {
    pub name: String,
    #[serde(default)]
    pub agents: Vec<AgentRef>,
    #[serde(default, deserialize_with = "deserialize_env_map")]
    pub env: EnvMap,
    pub evaluators: Vec<EvaluatorSpec>,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// Report destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSpec {
    #[serde(default = "default_report_path")]
    pub path: String,
}

impl Default for ReportSpec {
    fn default() -> Self {
        Self {
            path: default_report_path(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_id_field() -> String {
    "instance_id".to_string()
}

fn default_patch_field() -> String {
    "patch".to_string()
}

fn default_report_path() -> String {
    "reports/{cli.run_id:latest}/report.json".to_string()
}
