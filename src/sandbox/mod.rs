//! Isolated execution environments for configurers and evaluators.
//!
//! A sandbox is either a Docker container driven through the `docker` CLI or
//! a local working directory. The kind is a closed choice resolved through
//! the option resolver (`sandbox.type`, CLI key `sandbox`) and dispatched by
//! [`create_sandbox`].

pub mod docker;
pub mod local;
pub mod validate;

pub use docker::DockerSandbox;
pub use local::LocalSandbox;
pub use validate::{shell_quote, validate_file_path, validate_git_ref};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigurerSpec, SandboxSpec};
use crate::error::{ExecutionError, HarnessError};
use crate::options::{EnvMap, OptionEnum, OptionResolver};

/// Default image when neither the config nor the CLI names one.
pub const DEFAULT_IMAGE: &str = "python:3.12-slim";

/// Default working directory inside a container.
pub const DEFAULT_WORKDIR: &str = "/repo";

/// Output of a command run inside a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

impl ExecOutput {
    /// True if the command exited with status 0 before its deadline.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }

    /// Stderr if non-empty, else stdout, truncated for reports.
    pub fn diagnostic(&self, max: usize) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        truncate(text.trim(), max)
    }

    pub(crate) fn timed_out(duration: Duration) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: format!("timed out after {}s", duration.as_secs()),
            duration,
            timed_out: true,
        }
    }
}

/// Kind of sandbox, the `sandbox.type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxKind {
    Docker,
    Local,
}

impl OptionEnum for SandboxKind {
    fn choices() -> &'static [&'static str] {
        &["docker", "local"]
    }

    fn from_choice(value: &str) -> Option<Self> {
        match value {
            "docker" => Some(Self::Docker),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

impl fmt::Display for SandboxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Docker => write!(f, "docker"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// An isolated environment that commands run in.
///
/// Implementations release everything they acquired in [`Sandbox::teardown`],
/// which the runner calls exactly once regardless of how the instance ended.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Sandbox kind.
    fn kind(&self) -> SandboxKind;

    /// Container name or directory path.
    fn id(&self) -> &str;

    /// Runs `command` with `bash -c`, bounded by `timeout`.
    ///
    /// A timeout is reported through [`ExecOutput::timed_out`], not as an error.
    async fn exec(
        &self,
        command: &str,
        env: &EnvMap,
        timeout: Duration,
    ) -> Result<ExecOutput, ExecutionError>;

    /// Writes a file relative to the working directory.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), ExecutionError>;

    /// Releases the sandbox.
    async fn teardown(&self) -> Result<(), ExecutionError>;
}

/// Fully resolved sandbox settings for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxPlan {
    pub kind: SandboxKind,
    pub name: String,
    pub image: String,
    pub workdir: Option<String>,
    pub force_rebuild: bool,
}

impl SandboxPlan {
    /// Resolves the sandbox section for one instance.
    ///
    /// `force_rebuild` may be declared on the sandbox and on any configurer;
    /// the most specific declaration wins.
    pub fn resolve(
        spec: &SandboxSpec,
        configurers: &[ConfigurerSpec],
        resolver: &OptionResolver<'_>,
        instance_id: &str,
    ) -> Result<Self, HarnessError> {
        let kind = resolver.resolve_enum(
            "sandbox",
            spec.options.get("type"),
            SandboxKind::Docker,
            "docker",
        )?;
        let image = resolver
            .resolve("image", spec.options.get("image"), DEFAULT_IMAGE)?
            .value;
        let workdir = resolver.resolve("workdir", spec.options.get("workdir"), "")?.value;

        let mut layers = vec![spec.options.get("force_rebuild")];
        layers.extend(configurers.iter().map(|c| c.options.get("force_rebuild")));
        let force_rebuild = resolver.resolve_flag("force_rebuild", &layers, false)?;

        Ok(Self {
            kind,
            name: container_name(instance_id),
            image,
            workdir: (!workdir.is_empty()).then_some(workdir),
            force_rebuild,
        })
    }
}

/// Creates and starts the sandbox a plan describes.
pub async fn create_sandbox(plan: &SandboxPlan) -> Result<Box<dyn Sandbox>, ExecutionError> {
    match plan.kind {
        SandboxKind::Docker => Ok(Box::new(DockerSandbox::start(plan).await?)),
        SandboxKind::Local => Ok(Box::new(LocalSandbox::start(plan).await?)),
    }
}

/// Container name for an instance.
pub fn container_name(instance_id: &str) -> String {
    let safe: String = instance_id
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '-',
        })
        .collect();
    format!("swe-eval-{safe}")
}

/// Truncates to at most `max` bytes on a char boundary.
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}... [truncated]", &s[..end])
    }
}
