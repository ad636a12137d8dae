//! Local sandbox: commands run with `bash -c` in a working directory.
//!
//! Without an explicit workdir a temporary directory is created and removed
//! on teardown.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use super::{validate_file_path, ExecOutput, Sandbox, SandboxKind, SandboxPlan};
use crate::error::ExecutionError;
use crate::options::EnvMap;

/// Working directory on the host.
#[derive(Debug)]
pub struct LocalSandbox {
    id: String,
    root: PathBuf,
    temp: Mutex<Option<TempDir>>,
}

impl LocalSandbox {
    /// Prepares the working directory described by the plan.
    pub async fn start(plan: &SandboxPlan) -> Result<Self, ExecutionError> {
        match &plan.workdir {
            Some(dir) => {
                let root = PathBuf::from(dir);
                tokio::fs::create_dir_all(&root).await.map_err(|e| {
                    ExecutionError::Sandbox(format!("cannot create workdir '{}': {e}", root.display()))
                })?;
                Ok(Self::at(root))
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix(&format!("{}-", plan.name))
                    .tempdir()
                    .map_err(|e| ExecutionError::Sandbox(format!("cannot create temp dir: {e}")))?;
                let root = temp.path().to_path_buf();
                tracing::debug!(workdir = %root.display(), "Local sandbox ready");
                Ok(Self {
                    id: root.display().to_string(),
                    root,
                    temp: Mutex::new(Some(temp)),
                })
            }
        }
    }

    /// Uses an existing directory; teardown leaves it in place.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            id: root.display().to_string(),
            root,
            temp: Mutex::new(None),
        }
    }

    /// Working directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    fn kind(&self) -> SandboxKind {
        SandboxKind::Local
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn exec(
        &self,
        command: &str,
        env: &EnvMap,
        timeout: Duration,
    ) -> Result<ExecOutput, ExecutionError> {
        let start = Instant::now();
        let child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .envs(env)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => Ok(ExecOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                duration: start.elapsed(),
                timed_out: false,
            }),
            Ok(Err(e)) => Err(ExecutionError::Sandbox(format!("failed to spawn bash: {e}"))),
            Err(_) => Ok(ExecOutput::timed_out(timeout)),
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), ExecutionError> {
        validate_file_path(path).map_err(|e| ExecutionError::Sandbox(e.to_string()))?;
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExecutionError::Sandbox(format!("write to '{path}' failed: {e}")))?;
        }
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| ExecutionError::Sandbox(format!("write to '{path}' failed: {e}")))
    }

    async fn teardown(&self) -> Result<(), ExecutionError> {
        let temp = self
            .temp
            .lock()
            .map_err(|_| ExecutionError::Sandbox("sandbox state poisoned".to_string()))?
            .take();
        if let Some(temp) = temp {
            temp.close()
                .map_err(|e| ExecutionError::Sandbox(format!("cannot remove temp dir: {e}")))?;
        }
        Ok(())
    }
}
