//! Effective option values from CLI, YAML and built-in defaults.
//!
//! Scalar and selection options follow one precedence chain:
//!
//! ```text
//! CLI value (if present)  >  YAML value (after template resolution)  >  default
//! ```
//!
//! Map-valued options (env vars) are merged instead, see [`env`].

pub mod env;
pub mod map;

pub use env::{deserialize_env_map, merge_env, EnvLayers, EnvMap};
pub use map::OptionMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{ConfigurationError, HarnessError};
use crate::template::{resolve, ResolutionScope};

/// Where an effective option value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionSource {
    Cli,
    Yaml,
    Default,
}

/// An effective option value with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOption {
    pub value: String,
    pub source: OptionSource,
}

/// Closed set of values a discriminator option may take.
pub trait OptionEnum: Sized + Copy {
    /// Accepted spellings, in declaration order.
    fn choices() -> &'static [&'static str];

    /// Parses an accepted spelling.
    fn from_choice(value: &str) -> Option<Self>;
}

/// Computes the effective value of a single option.
///
/// This is the precedence rule in its pure form; `yaml_value` must already be
/// template-resolved.
pub fn resolve_option(
    cli_value: Option<&str>,
    yaml_value: Option<&str>,
    default_value: &str,
) -> ResolvedOption {
    match (cli_value, yaml_value) {
        (Some(cli), _) => ResolvedOption {
            value: cli.to_string(),
            source: OptionSource::Cli,
        },
        (None, Some(yaml)) => ResolvedOption {
            value: yaml.to_string(),
            source: OptionSource::Yaml,
        },
        (None, None) => ResolvedOption {
            value: default_value.to_string(),
            source: OptionSource::Default,
        },
    }
}

/// Resolves options against one scope, taking CLI values from `scope.cli`.
#[derive(Debug, Clone, Copy)]
pub struct OptionResolver<'a> {
    scope: &'a ResolutionScope,
}

impl<'a> OptionResolver<'a> {
    /// Creates a resolver bound to a scope.
    pub fn new(scope: &'a ResolutionScope) -> Self {
        Self { scope }
    }

    /// The scope options are resolved against.
    pub fn scope(&self) -> &'a ResolutionScope {
        self.scope
    }

    /// Resolves a scalar option. `yaml` may be any scalar YAML value.
    pub fn resolve(
        &self,
        name: &str,
        yaml: Option<&Value>,
        default: &str,
    ) -> Result<ResolvedOption, HarnessError> {
        let yaml_text = match yaml {
            Some(value) => scalar_text(name, value)?
                .map(|text| resolve(&text, self.scope))
                .transpose()?,
            None => None,
        };
        Ok(resolve_option(
            self.scope.cli_arg(name),
            yaml_text.as_deref(),
            default,
        ))
    }

    /// Resolves a discriminator option against its closed set of values.
    ///
    /// An out-of-set value is an error; it is never coerced to the default.
    pub fn resolve_enum<E: OptionEnum>(
        &self,
        name: &str,
        yaml: Option<&Value>,
        default: E,
        default_text: &str,
    ) -> Result<E, HarnessError> {
        let resolved = self.resolve(name, yaml, default_text)?;
        if resolved.source == OptionSource::Default {
            return Ok(default);
        }
        parse_choice(name, &resolved.value)
    }

    /// Resolves a boolean flag declared at several levels.
    ///
    /// `layers` are ordered least to most specific; the most specific declared
    /// value wins and a CLI value beats all of them. Flags are never merged.
    pub fn resolve_flag(
        &self,
        name: &str,
        layers: &[Option<&Value>],
        default: bool,
    ) -> Result<bool, HarnessError> {
        let most_specific = layers.iter().rev().find_map(|layer| *layer);
        let resolved = self.resolve(name, most_specific, if default { "true" } else { "false" })?;
        parse_bool(name, &resolved.value)
    }
}

/// Parses a value for a closed-set option.
pub fn parse_choice<E: OptionEnum>(name: &str, value: &str) -> Result<E, HarnessError> {
    E::from_choice(value).ok_or_else(|| {
        ConfigurationError::InvalidEnumValue {
            option: name.to_string(),
            value: value.to_string(),
            allowed: E::choices().iter().map(|c| c.to_string()).collect(),
        }
        .into()
    })
}

/// Parses common boolean spellings.
pub fn parse_bool(name: &str, value: &str) -> Result<bool, HarnessError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigurationError::InvalidOption {
            owner: name.to_string(),
            option: name.to_string(),
            message: format!("expected a boolean, got '{}'", other),
        }
        .into()),
    }
}

/// Text of a scalar YAML value; `null` is treated as not declared.
fn scalar_text(name: &str, value: &Value) -> Result<Option<String>, HarnessError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(ConfigurationError::InvalidOption {
            owner: name.to_string(),
            option: name.to_string(),
            message: "expected a scalar value".to_string(),
        }
        .into()),
    }
}
