//! Error types for swe-eval operations.
//!
//! The taxonomy mirrors the three ways a benchmark run can go wrong:
//! - Template resolution against instance/env/CLI scopes
//! - Configuration (load-time validation, registry lookups, option values)
//! - Execution of configurers, sandboxes and evaluators
//!
//! `HarnessError` wraps all of them for call sites that can hit more than one.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while substituting placeholders in a template string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("Instance property '{path}' not found and no default given")]
    MissingProperty { path: String },

    /// Raised by `${VAR:?message}`; displays the user-supplied message verbatim.
    #[error("{message}")]
    MissingEnvRequired { var: String, message: String },

    #[error("CLI argument '{name}' not provided and no default given")]
    MissingCliArg { name: String },

    #[error("Unknown placeholder '{placeholder}': {reason}")]
    UnknownPlaceholderKind { placeholder: String, reason: String },
}

/// Errors in the declarative configuration itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Unknown configurer '{0}'")]
    UnknownConfigurerName(String),

    #[error("Unknown evaluator type '{0}'")]
    UnknownEvaluatorType(String),

    #[error("Invalid value '{value}' for option '{option}': expected one of {allowed:?}")]
    InvalidEnumValue {
        option: String,
        value: String,
        allowed: Vec<String>,
    },

    #[error("Duplicate evaluator name '{name}' in evaluation '{evaluation}'")]
    DuplicateEvaluatorName { evaluation: String, name: String },

    #[error("Reference to undeclared {kind} '{name}'")]
    UnresolvedEntityReference { kind: String, name: String },

    #[error("Missing required option '{option}' for '{owner}'")]
    MissingOption { owner: String, option: String },

    #[error("Invalid option '{option}' for '{owner}': {message}")]
    InvalidOption {
        owner: String,
        option: String,
        message: String,
    },

    #[error("Baseline results not found at '{0}'")]
    MissingBaseline(String),

    #[error("No entry for prediction '{prediction_id}' in {source_name}")]
    MissingPrediction {
        prediction_id: String,
        source_name: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while configuring a sandbox or running an evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Evaluator '{name}' timed out after {timeout:?}")]
    EvaluatorTimeout { name: String, timeout: Duration },

    #[error("Evaluator '{name}' failed: {message}")]
    EvaluatorRuntimeFailure { name: String, message: String },

    #[error("Configurer '{name}' setup failed: {message}")]
    ConfigurerSetupFailure { name: String, message: String },

    #[error("Sandbox error: {0}")]
    Sandbox(String),
}

/// Umbrella error for operations spanning several subsystems.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl HarnessError {
    /// True for errors that must abort a run before any evaluator executes.
    pub fn is_fatal_at_load(&self) -> bool {
        matches!(
            self,
            HarnessError::Resolution(_)
                | HarnessError::Configuration(_)
                | HarnessError::Yaml(_)
                | HarnessError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_env_required_displays_message() {
        let err = ResolutionError::MissingEnvRequired {
            var: "TOK".to_string(),
            message: "required".to_string(),
        };
        assert_eq!(err.to_string(), "required");
    }

    #[test]
    fn test_harness_error_from_conversions() {
        let err: HarnessError = ConfigurationError::UnknownEvaluatorType("x".into()).into();
        assert!(err.is_fatal_at_load());

        let err: HarnessError = ExecutionError::Sandbox("gone".into()).into();
        assert!(!err.is_fatal_at_load());
        assert_eq!(err.to_string(), "Sandbox error: gone");
    }
}
