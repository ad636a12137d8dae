//! Runs an arbitrary shell script in the sandbox.

use std::time::Duration;

use async_trait::async_trait;

use super::{run_step, Configurer, DEFAULT_SETUP_TIMEOUT};
use crate::error::{ConfigurationError, ExecutionError};
use crate::options::{EnvMap, OptionMap};
use crate::sandbox::Sandbox;

#[derive(Debug, Clone)]
pub struct BashConfigurer {
    script: String,
    timeout: Duration,
}

impl BashConfigurer {
    /// Options: `script` (required), `timeout_secs`.
    pub fn from_options(options: &OptionMap) -> Result<Self, ConfigurationError> {
        Ok(Self {
            script: options.required_str("script")?,
            timeout: options.timeout_secs("timeout_secs", DEFAULT_SETUP_TIMEOUT)?,
        })
    }
}

pub(super) fn create(options: &OptionMap) -> Result<Box<dyn Configurer>, ConfigurationError> {
    Ok(Box::new(BashConfigurer::from_options(options)?))
}

#[async_trait]
impl Configurer for BashConfigurer {
    fn name(&self) -> &str {
        "bash"
    }

    async fn configure(&self, sandbox: &dyn Sandbox, env: &EnvMap) -> Result<(), ExecutionError> {
        run_step(self.name(), sandbox, &self.script, env, self.timeout).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::testing::ScriptedSandbox;
    use serde_json::json;

    #[tokio::test]
    async fn test_runs_script() {
        let options = OptionMap::from_value("bash", json!({"script": "pip install -e ."})).unwrap();
        let configurer = BashConfigurer::from_options(&options).unwrap();
        let sandbox = ScriptedSandbox::default();
        configurer.configure(&sandbox, &EnvMap::new()).await.unwrap();
        assert_eq!(sandbox.commands(), vec!["pip install -e ."]);
    }

    #[test]
    fn test_requires_script() {
        let options = OptionMap::from_value("bash", json!({})).unwrap();
        assert!(BashConfigurer::from_options(&options).is_err());
    }
}
