//! JVM build-tool setup (Maven or Gradle).
//!
//! Both concrete configurers delegate to [`run_build_setup`]; the
//! `build_tool` selecting factory picks between them on the `tool` option.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use super::{run_step, Configurer, DEFAULT_SETUP_TIMEOUT};
use crate::error::{ConfigurationError, ExecutionError};
use crate::options::{EnvMap, OptionEnum, OptionMap};
use crate::sandbox::Sandbox;

/// Supported build tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildTool {
    Maven,
    Gradle,
}

impl BuildTool {
    /// Dependency-resolution command used when none is configured.
    pub fn default_command(self) -> &'static str {
        match self {
            Self::Maven => "mvn -B -q dependency:go-offline",
            Self::Gradle => {
                "if [ -x ./gradlew ]; then ./gradlew --no-daemon -q dependencies; else gradle --no-daemon -q dependencies; fi"
            }
        }
    }
}

impl OptionEnum for BuildTool {
    fn choices() -> &'static [&'static str] {
        &["maven", "gradle"]
    }

    fn from_choice(value: &str) -> Option<Self> {
        match value {
            "maven" => Some(Self::Maven),
            "gradle" => Some(Self::Gradle),
            _ => None,
        }
    }
}

impl fmt::Display for BuildTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Maven => write!(f, "maven"),
            Self::Gradle => write!(f, "gradle"),
        }
    }
}

/// Installs an optional JDK, then resolves project dependencies.
#[derive(Debug, Clone)]
pub struct BuildToolConfigurer {
    tool: BuildTool,
    name: String,
    jvm_version: Option<String>,
    command: Option<String>,
    timeout: Duration,
}

impl BuildToolConfigurer {
    /// Options: `jvm_version`, `command`, `timeout_secs`.
    pub fn from_options(tool: BuildTool, options: &OptionMap) -> Result<Self, ConfigurationError> {
        let jvm_version = options.str("jvm_version")?.filter(|v| !v.trim().is_empty());
        if let Some(version) = &jvm_version {
            if !version.chars().all(|c| c.is_ascii_alphanumeric() || c == '.') {
                return Err(ConfigurationError::InvalidOption {
                    owner: options.owner().to_string(),
                    option: "jvm_version".to_string(),
                    message: format!("'{version}' is not a JDK version"),
                });
            }
        }
        Ok(Self {
            tool,
            name: tool.to_string(),
            jvm_version,
            command: options.str("command")?,
            timeout: options.timeout_secs("timeout_secs", DEFAULT_SETUP_TIMEOUT)?,
        })
    }

    pub fn tool(&self) -> BuildTool {
        self.tool
    }
}

pub(super) fn maven(options: &OptionMap) -> Result<Box<dyn Configurer>, ConfigurationError> {
    Ok(Box::new(BuildToolConfigurer::from_options(BuildTool::Maven, options)?))
}

pub(super) fn gradle(options: &OptionMap) -> Result<Box<dyn Configurer>, ConfigurationError> {
    Ok(Box::new(BuildToolConfigurer::from_options(BuildTool::Gradle, options)?))
}

/// Shell snippet installing a headless JDK unless `java` already reports it.
fn install_jdk_command(version: &str) -> String {
    format!(
        "java -version 2>&1 | grep -q '\"{version}' || \
         (apt-get update -qq && apt-get install -y -qq openjdk-{version}-jdk-headless > /dev/null)"
    )
}

/// Setup steps shared by every build-tool configurer.
pub async fn run_build_setup(
    name: &str,
    tool: BuildTool,
    sandbox: &dyn Sandbox,
    jvm_version: Option<&str>,
    command: Option<&str>,
    env: &EnvMap,
    timeout: Duration,
) -> Result<(), ExecutionError> {
    let mut env = env.clone();
    if let Some(version) = jvm_version {
        run_step(name, sandbox, &install_jdk_command(version), &env, timeout).await?;
        env.insert("JVM_VERSION".to_string(), version.to_string());
    }
    let command = command.unwrap_or_else(|| tool.default_command());
    run_step(name, sandbox, command, &env, timeout).await?;
    tracing::info!(configurer = name, tool = %tool, sandbox = sandbox.id(), "Build tool ready");
    Ok(())
}

#[async_trait]
impl Configurer for BuildToolConfigurer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn configure(&self, sandbox: &dyn Sandbox, env: &EnvMap) -> Result<(), ExecutionError> {
        run_build_setup(
            &self.name,
            self.tool,
            sandbox,
            self.jvm_version.as_deref(),
            self.command.as_deref(),
            env,
            self.timeout,
        )
        .await
    }
}
