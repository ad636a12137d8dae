//! Checks out a commit, optionally cloning the repository first.

use std::time::Duration;

use async_trait::async_trait;

use super::{run_step, Configurer, DEFAULT_SETUP_TIMEOUT};
use crate::error::{ConfigurationError, ExecutionError};
use crate::options::{EnvMap, OptionMap};
use crate::sandbox::{shell_quote, validate_git_ref, Sandbox};

#[derive(Debug, Clone)]
pub struct GitCheckoutConfigurer {
    repo: Option<String>,
    commit: String,
    timeout: Duration,
}

impl GitCheckoutConfigurer {
    /// Options: `commit` (required), `repo` (clone URL), `timeout_secs`.
    pub fn from_options(options: &OptionMap) -> Result<Self, ConfigurationError> {
        let commit = options.required_str("commit")?;
        validate_git_ref(&commit).map_err(|e| ConfigurationError::InvalidOption {
            owner: options.owner().to_string(),
            option: "commit".to_string(),
            message: e.to_string(),
        })?;
        let repo = options.str("repo")?.filter(|r| !r.trim().is_empty());
        if let Some(repo) = &repo {
            if repo.starts_with('-') {
                return Err(ConfigurationError::InvalidOption {
                    owner: options.owner().to_string(),
                    option: "repo".to_string(),
                    message: format!("'{repo}' is not a repository URL"),
                });
            }
        }
        Ok(Self {
            repo,
            commit,
            timeout: options.timeout_secs("timeout_secs", DEFAULT_SETUP_TIMEOUT)?,
        })
    }

    fn commands(&self) -> Vec<String> {
        let mut commands = Vec::with_capacity(2);
        if let Some(repo) = &self.repo {
            commands.push(format!("git clone {} . 2>&1", shell_quote(repo)));
        }
        commands.push(format!("git checkout --force {} 2>&1", self.commit));
        commands
    }
}

pub(super) fn create(options: &OptionMap) -> Result<Box<dyn Configurer>, ConfigurationError> {
    Ok(Box::new(GitCheckoutConfigurer::from_options(options)?))
}

#[async_trait]
impl Configurer for GitCheckoutConfigurer {
    fn name(&self) -> &str {
        "git_checkout"
    }

    async fn configure(&self, sandbox: &dyn Sandbox, env: &EnvMap) -> Result<(), ExecutionError> {
        for command in self.commands() {
            run_step(self.name(), sandbox, &command, env, self.timeout).await?;
        }
        tracing::debug!(sandbox = sandbox.id(), commit = %self.commit, "Checked out commit");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: serde_json::Value) -> OptionMap {
        OptionMap::from_value("git", value).unwrap()
    }

    #[test]
    fn test_clone_then_checkout() {
        let configurer = GitCheckoutConfigurer::from_options(&options(
            json!({"repo": "https://github.com/acme/app.git", "commit": "abc123"}),
        ))
        .unwrap();
        assert_eq!(
            configurer.commands(),
            vec![
                "git clone 'https://github.com/acme/app.git' . 2>&1".to_string(),
                "git checkout --force abc123 2>&1".to_string()
            ]
        );
    }

    #[test]
    fn test_rejects_unsafe_values() {
        assert!(GitCheckoutConfigurer::from_options(&options(json!({"commit": "x; id"}))).is_err());
        assert!(GitCheckoutConfigurer::from_options(&options(json!({}))).is_err());
        assert!(GitCheckoutConfigurer::from_options(&options(
            json!({"commit": "abc", "repo": "--upload-pack=x"})
        ))
        .is_err());
    }
}
