//! Typed access to a resolved option mapping.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::ConfigurationError;

/// Resolved options for one configurer or evaluator.
///
/// Getters return `ConfigurationError` naming the owner, so a bad option in
/// one evaluator is reported against that evaluator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionMap {
    owner: String,
    values: Map<String, Value>,
}

impl OptionMap {
    /// Wraps a resolved JSON object.
    pub fn new(owner: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            owner: owner.into(),
            values,
        }
    }

    /// Wraps any JSON value; non-objects yield an error.
    pub fn from_value(owner: impl Into<String>, value: Value) -> Result<Self, ConfigurationError> {
        let owner = owner.into();
        match value {
            Value::Object(values) => Ok(Self { owner, values }),
            Value::Null => Ok(Self::new(owner, Map::new())),
            _ => Err(ConfigurationError::InvalidOption {
                owner,
                option: "options".to_string(),
                message: "expected a mapping".to_string(),
            }),
        }
    }

    /// Name of the component these options belong to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Raw value of an option.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    /// String option; scalars are accepted and stringified.
    pub fn str(&self, name: &str) -> Result<Option<String>, ConfigurationError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(self.invalid(name, "expected a string")),
        }
    }

    /// String option that must be present and non-empty.
    pub fn required_str(&self, name: &str) -> Result<String, ConfigurationError> {
        match self.str(name)? {
            Some(s) if !s.trim().is_empty() => Ok(s),
            _ => Err(ConfigurationError::MissingOption {
                owner: self.owner.clone(),
                option: name.to_string(),
            }),
        }
    }

    /// List of strings; a single string is accepted as a one-element list.
    pub fn string_list(&self, name: &str) -> Result<Vec<String>, ConfigurationError> {
        match self.get(name) {
            None => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(vec![s.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.clone()),
                    _ => Err(self.invalid(name, "expected a list of strings")),
                })
                .collect(),
            Some(_) => Err(self.invalid(name, "expected a list of strings")),
        }
    }

    /// Unsigned integer option; numeric strings are accepted.
    pub fn u64(&self, name: &str) -> Result<Option<u64>, ConfigurationError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.invalid(name, "expected a non-negative integer")),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(name, "expected a non-negative integer")),
            Some(_) => Err(self.invalid(name, "expected a non-negative integer")),
        }
    }

    /// List of integers (e.g. exit codes).
    pub fn i32_list(&self, name: &str) -> Result<Option<Vec<i32>>, ConfigurationError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_i64()
                        .and_then(|n| i32::try_from(n).ok())
                        .ok_or_else(|| self.invalid(name, "expected a list of integers"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(Value::Number(n)) => n
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .map(|n| Some(vec![n]))
                .ok_or_else(|| self.invalid(name, "expected a list of integers")),
            Some(_) => Err(self.invalid(name, "expected a list of integers")),
        }
    }

    /// Timeout option in seconds, with a fallback.
    pub fn timeout_secs(&self, name: &str, default: Duration) -> Result<Duration, ConfigurationError> {
        Ok(self.u64(name)?.map(Duration::from_secs).unwrap_or(default))
    }

    fn invalid(&self, name: &str, message: &str) -> ConfigurationError {
        ConfigurationError::InvalidOption {
            owner: self.owner.clone(),
            option: name.to_string(),
            message: message.to_string(),
        }
    }
}
