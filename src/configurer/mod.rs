//! Configurer registry and factory dispatch.
//!
//! The registry is a static table from configurer name to a
//! [`ConfigurerFactory`]. A factory is either concrete (a constructor) or
//! selecting: it resolves a discriminator option, then delegates to one of
//! a closed set of concrete constructors. Either way [`ConfigurerRegistry::create`]
//! returns a ready-to-run configurer.
//!
//! | Name | Kind |
//! |---|---|
//! | `bash` | concrete |
//! | `maven`, `gradle` | concrete, share [`build_tool::run_build_setup`] |
//! | `build_tool` | selecting on `tool` (`maven` \| `gradle`) |
//! | `git_checkout` | concrete |

pub mod bash;
pub mod build_tool;
pub mod git;

pub use bash::BashConfigurer;
pub use build_tool::{run_build_setup, BuildTool, BuildToolConfigurer};
pub use git::GitCheckoutConfigurer;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ConfigurationError, ExecutionError};
use crate::options::{resolve_option, EnvMap, OptionMap};
use crate::sandbox::{ExecOutput, Sandbox};
use crate::template::ResolutionScope;

/// Default time budget for one setup command.
pub const DEFAULT_SETUP_TIMEOUT: Duration = Duration::from_secs(1800);

/// Prepares a sandbox before evaluators run.
#[async_trait]
pub trait Configurer: Send + Sync {
    /// Declared name, used in logs and errors.
    fn name(&self) -> &str;

    /// Applies the configuration; `env` is already merged.
    async fn configure(&self, sandbox: &dyn Sandbox, env: &EnvMap) -> Result<(), ExecutionError>;
}

/// Constructor from resolved options.
pub type ConfigurerCtor = fn(&OptionMap) -> Result<Box<dyn Configurer>, ConfigurationError>;

/// Entry in the configurer table.
#[derive(Clone, Copy)]
pub enum ConfigurerFactory {
    Concrete(ConfigurerCtor),
    Selecting {
        discriminator: &'static str,
        default: &'static str,
        variants: &'static [(&'static str, ConfigurerCtor)],
    },
}

impl std::fmt::Debug for ConfigurerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Concrete(_) => write!(f, "Concrete"),
            Self::Selecting {
                discriminator,
                variants,
                ..
            } => f
                .debug_struct("Selecting")
                .field("discriminator", discriminator)
                .field("variants", &variants.iter().map(|(k, _)| *k).collect::<Vec<_>>())
                .finish(),
        }
    }
}

const BUILD_TOOL_VARIANTS: &[(&str, ConfigurerCtor)] = &[
    ("maven", build_tool::maven),
    ("gradle", build_tool::gradle),
];

/// Static name → factory table, read-only after construction.
#[derive(Debug, Clone, Default)]
pub struct ConfigurerRegistry {
    factories: BTreeMap<String, ConfigurerFactory>,
}

impl ConfigurerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in configurer.
    pub fn builtin() -> Self {
        Self::new()
            .register("bash", ConfigurerFactory::Concrete(bash::create))
            .register("maven", ConfigurerFactory::Concrete(build_tool::maven))
            .register("gradle", ConfigurerFactory::Concrete(build_tool::gradle))
            .register(
                "build_tool",
                ConfigurerFactory::Selecting {
                    discriminator: "tool",
                    default: "maven",
                    variants: BUILD_TOOL_VARIANTS,
                },
            )
            .register("git_checkout", ConfigurerFactory::Concrete(git::create))
    }

    /// Adds or replaces a factory.
    pub fn register(mut self, name: impl Into<String>, factory: ConfigurerFactory) -> Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Creates a configurer from already-resolved options.
    ///
    /// Selecting factories read their discriminator with CLI > options >
    /// default precedence; the option values are not re-templated.
    pub fn create(
        &self,
        name: &str,
        options: &OptionMap,
        scope: &ResolutionScope,
    ) -> Result<Box<dyn Configurer>, ConfigurationError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownConfigurerName(name.to_string()))?;

        match factory {
            ConfigurerFactory::Concrete(ctor) => ctor(options),
            ConfigurerFactory::Selecting {
                discriminator,
                default,
                variants,
            } => {
                let yaml = options.str(discriminator)?;
                let choice =
                    resolve_option(scope.cli_arg(discriminator), yaml.as_deref(), default);
                let ctor = variants
                    .iter()
                    .find(|(key, _)| *key == choice.value)
                    .map(|(_, ctor)| ctor)
                    .ok_or_else(|| ConfigurationError::InvalidEnumValue {
                        option: discriminator.to_string(),
                        value: choice.value.clone(),
                        allowed: variants.iter().map(|(k, _)| k.to_string()).collect(),
                    })?;
                tracing::debug!(configurer = name, selected = %choice.value, source = ?choice.source, "Selected configurer variant");
                ctor(options)
            }
        }
    }
}

/// Runs one setup command, mapping failure to `ConfigurerSetupFailure`.
pub(crate) async fn run_step(
    configurer: &str,
    sandbox: &dyn Sandbox,
    command: &str,
    env: &EnvMap,
    timeout: Duration,
) -> Result<ExecOutput, ExecutionError> {
    tracing::debug!(configurer = configurer, sandbox = sandbox.id(), "Running setup step");
    let output = sandbox.exec(command, env, timeout).await?;
    if output.timed_out {
        return Err(ExecutionError::ConfigurerSetupFailure {
            name: configurer.to_string(),
            message: format!("timed out after {}s", timeout.as_secs()),
        });
    }
    if output.exit_code != 0 {
        return Err(ExecutionError::ConfigurerSetupFailure {
            name: configurer.to_string(),
            message: format!("exit code {}: {}", output.exit_code, output.diagnostic(500)),
        });
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::testing::ScriptedSandbox;
    use serde_json::json;

    fn options(value: serde_json::Value) -> OptionMap {
        OptionMap::from_value("test", value).unwrap()
    }

    fn cli(pairs: &[(&str, &str)]) -> ResolutionScope {
        ResolutionScope::new().with_cli(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_builtin_names() {
        let registry = ConfigurerRegistry::builtin();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["bash", "build_tool", "git_checkout", "gradle", "maven"]
        );
    }

    #[test]
    fn test_unknown_name() {
        let err = ConfigurerRegistry::builtin()
            .create("ansible", &OptionMap::default(), &ResolutionScope::new())
            .err()
            .unwrap();
        assert_eq!(err, ConfigurationError::UnknownConfigurerName("ansible".into()));
    }

    #[test]
    fn test_selecting_factory_precedence() {
        let registry = ConfigurerRegistry::builtin();

        let created = registry
            .create("build_tool", &options(json!({"tool": "maven"})), &cli(&[("tool", "gradle")]))
            .unwrap();
        assert_eq!(created.name(), "gradle");

        let created = registry
            .create("build_tool", &options(json!({"tool": "maven"})), &cli(&[]))
            .unwrap();
        assert_eq!(created.name(), "maven");

        let created = registry
            .create("build_tool", &options(json!({})), &cli(&[]))
            .unwrap();
        assert_eq!(created.name(), "maven");
    }

    #[test]
    fn test_selecting_factory_rejects_out_of_set_value() {
        let err = ConfigurerRegistry::builtin()
            .create("build_tool", &options(json!({"tool": "bazel"})), &cli(&[]))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ConfigurationError::InvalidEnumValue { ref value, .. } if value == "bazel"
        ));
    }

    #[tokio::test]
    async fn test_run_step_maps_failure() {
        let sandbox = ScriptedSandbox::default().reply("false", 3, "");
        let err = run_step("bash", &sandbox, "false", &EnvMap::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::ConfigurerSetupFailure { ref name, .. } if name == "bash"
        ));
        assert!(run_step("bash", &sandbox, "true", &EnvMap::new(), Duration::from_secs(1))
            .await
            .is_ok());
    }
}
