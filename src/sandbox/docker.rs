//! Docker-backed sandbox driven through the `docker` CLI.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{
    shell_quote, truncate, validate_file_path, ExecOutput, Sandbox, SandboxKind, SandboxPlan,
    DEFAULT_WORKDIR,
};
use crate::error::ExecutionError;
use crate::options::EnvMap;

/// Keep-alive for the container's main process.
const KEEPALIVE_SECS: u64 = 86_400;

/// Seconds between SIGTERM and SIGKILL for a command past its deadline.
const KILL_GRACE_SECS: u64 = 5;

/// A long-running container that commands are `docker exec`ed into.
#[derive(Debug)]
pub struct DockerSandbox {
    container: String,
    workdir: String,
}

impl DockerSandbox {
    /// Starts a detached container for the plan.
    ///
    /// With `force_rebuild` the image is re-pulled and any container left
    /// over under the same name is removed first.
    pub async fn start(plan: &SandboxPlan) -> Result<Self, ExecutionError> {
        let workdir = plan
            .workdir
            .clone()
            .unwrap_or_else(|| DEFAULT_WORKDIR.to_string());

        if plan.force_rebuild {
            docker_rm(&plan.name).await;
            let pull = docker(&["pull", &plan.image]).await?;
            if !pull.status.success() {
                tracing::warn!(
                    image = %plan.image,
                    stderr = %String::from_utf8_lossy(&pull.stderr).trim(),
                    "docker pull failed, using local image"
                );
            }
        }

        let keepalive = KEEPALIVE_SECS.to_string();
        let output = docker(&[
            "run",
            "-d",
            "--name",
            &plan.name,
            "-w",
            &workdir,
            &plan.image,
            "sleep",
            &keepalive,
        ])
        .await?;

        if !output.status.success() {
            return Err(ExecutionError::Sandbox(format!(
                "failed to start container '{}' from '{}': {}",
                plan.name,
                plan.image,
                truncate(String::from_utf8_lossy(&output.stderr).trim(), 500)
            )));
        }

        tracing::info!(container = %plan.name, image = %plan.image, "Docker sandbox ready");
        Ok(Self {
            container: plan.name.clone(),
            workdir,
        })
    }

    /// `docker exec` arguments for `command`.
    ///
    /// The command runs under coreutils `timeout` inside the container:
    /// killing the host-side `docker exec` client does not signal the
    /// process it started.
    fn exec_args(&self, env: &EnvMap, command: &str, timeout: Duration) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.extend([
            "-w".to_string(),
            self.workdir.clone(),
            self.container.clone(),
            "timeout".to_string(),
            "-k".to_string(),
            KILL_GRACE_SECS.to_string(),
            timeout_secs(timeout).to_string(),
            "bash".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]);
        args
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn kind(&self) -> SandboxKind {
        SandboxKind::Docker
    }

    fn id(&self) -> &str {
        &self.container
    }

    async fn exec(
        &self,
        command: &str,
        env: &EnvMap,
        timeout: Duration,
    ) -> Result<ExecOutput, ExecutionError> {
        let start = Instant::now();
        let child = Command::new("docker")
            .args(self.exec_args(env, command, timeout))
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
            Ok(Err(e)) => Err(ExecutionError::Sandbox(format!("docker exec failed: {e}"))),
            Err(_) => {
                tracing::warn!(container = %self.container, timeout_secs = timeout.as_secs(), "Command timed out");
                Ok(ExecOutput::timed_out(timeout))
            }
        }
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), ExecutionError> {
        validate_file_path(path).map_err(|e| ExecutionError::Sandbox(e.to_string()))?;

        let quoted = shell_quote(path);
        let script = format!("mkdir -p \"$(dirname {quoted})\" && cat > {quoted}");
        let mut child = Command::new("docker")
            .args(["exec", "-i", "-w", &self.workdir, &self.container, "bash", "-c", &script])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExecutionError::Sandbox(format!("docker exec failed: {e}")))?;

        if let Some(ref mut stdin) = child.stdin {
            let write = async {
                stdin.write_all(content.as_bytes()).await?;
                stdin.shutdown().await
            };
            write
                .await
                .map_err(|e| ExecutionError::Sandbox(format!("write to '{path}' failed: {e}")))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecutionError::Sandbox(format!("write to '{path}' failed: {e}")))?;
        if !output.status.success() {
            return Err(ExecutionError::Sandbox(format!(
                "write to '{}' failed: {}",
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn teardown(&self) -> Result<(), ExecutionError> {
        let output = docker(&["rm", "-f", &self.container]).await?;
        if !output.status.success() {
            return Err(ExecutionError::Sandbox(format!(
                "failed to remove container '{}': {}",
                self.container,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        tracing::debug!(container = %self.container, "Docker sandbox removed");
        Ok(())
    }
}

/// Whole seconds for `timeout(1)`, rounded up and at least 1.
fn timeout_secs(timeout: Duration) -> u64 {
    let secs = timeout
        .as_secs()
        .saturating_add(u64::from(timeout.subsec_nanos() > 0));
    secs.max(1)
}

async fn docker(args: &[&str]) -> Result<std::process::Output, ExecutionError> {
    Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(|e| ExecutionError::Sandbox(format!("failed to run docker: {e}")))
}

async fn docker_rm(container: &str) {
    if let Err(e) = Command::new("docker")
        .args(["rm", "-f", container])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        tracing::debug!(container = container, error = %e, "Failed to remove stale container (may not exist)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_args_pass_env_and_workdir() {
        let sandbox = DockerSandbox {
            container: "swe-eval-x".into(),
            workdir: "/repo".into(),
        };
        let mut env = EnvMap::new();
        env.insert("A".into(), "1".into());
        env.insert("B".into(), "two words".into());
        let args = sandbox.exec_args(&env, "make test", Duration::from_secs(90));
        assert_eq!(
            args,
            vec![
                "exec", "-e", "A=1", "-e", "B=two words", "-w", "/repo", "swe-eval-x", "timeout",
                "-k", "5", "90", "bash", "-c", "make test"
            ]
        );
    }

    #[test]
    fn test_exec_deadline_is_enforced_in_container() {
        let sandbox = DockerSandbox {
            container: "swe-eval-x".into(),
            workdir: "/repo".into(),
        };
        let args = sandbox.exec_args(&EnvMap::new(), "sleep 60", Duration::from_millis(1500));
        let at = args.iter().position(|a| a == "timeout").unwrap();
        assert_eq!(args[at + 1..at + 4], ["-k", "5", "2"]);
        assert_eq!(args[at + 4..], ["bash", "-c", "sleep 60"]);

        assert_eq!(timeout_secs(Duration::ZERO), 1);
        assert_eq!(timeout_secs(Duration::from_millis(200)), 1);
        assert_eq!(timeout_secs(Duration::from_secs(600)), 600);
    }
}
