//! YAML loading and load-time validation.

use std::collections::HashSet;
use std::path::Path;

use serde_json::{Map, Value};

use super::entity::resolve_agents;
use super::schema::HarnessConfig;
use crate::configurer::ConfigurerRegistry;
use crate::error::{ConfigurationError, HarnessError};
use crate::evaluator::EvaluatorRegistry;
use crate::options::EnvMap;
use crate::pipeline::EvaluationPipeline;
use crate::template::validate_value;

/// Configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load a configuration document from a file.
    ///
    /// Relative dataset, prediction and baseline paths resolve against the
    /// file's directory.
    pub fn load_file(path: impl AsRef<Path>) -> Result<HarnessConfig, HarnessError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&content)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        tracing::debug!(path = %path.display(), evaluations = config.evaluations.len(), "Loaded configuration");
        Ok(config)
    }

    /// Parse a configuration document.
    pub fn from_yaml_str(content: &str) -> Result<HarnessConfig, HarnessError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Validate configuration after loading.
    ///
    /// Every error reported here is fatal to the run.
    pub fn validate(
        config: &HarnessConfig,
        configurers: &ConfigurerRegistry,
        evaluators: &EvaluatorRegistry,
    ) -> Result<(), HarnessError> {
        if config.evaluations.is_empty() {
            return Err(invalid("at least one evaluation is required"));
        }
        if config.concurrency == 0 {
            return Err(invalid("concurrency must be at least 1"));
        }

        // Template syntax
        validate_value(&Value::String(config.dataset.path.clone()))?;
        validate_value(&Value::String(config.report.path.clone()))?;
        validate_value(&Value::Object(config.environment.sandbox.options.clone()))?;
        validate_env(&config.environment.sandbox.env)?;
        if let Some(predictions) = &config.predictions {
            validate_value(&Value::String(predictions.path.clone()))?;
            validate_env(&predictions.env)?;
        }
        for agent in &config.agents {
            validate_value(&Value::String(agent.command.clone()))?;
            if let Some(image) = &agent.image {
                validate_value(&Value::String(image.clone()))?;
            }
            validate_env(&agent.env)?;
            validate_value(&Value::Object(agent.options.clone()))?;
        }

        // Configurers
        for spec in &config.environment.configurers {
            if !configurers.contains(&spec.name) {
                return Err(ConfigurationError::UnknownConfigurerName(spec.name.clone()).into());
            }
            validate_value(&Value::Object(spec.options.clone()))?;
            validate_env(&spec.env)?;
        }

        // Evaluations
        let mut names = HashSet::new();
        for evaluation in &config.evaluations {
            if !names.insert(evaluation.name.as_str()) {
                return Err(invalid(format!("duplicate evaluation '{}'", evaluation.name)));
            }
            validate_env(&evaluation.env)?;
            resolve_agents(&evaluation.agents, &config.agents)?;

            for spec in &evaluation.evaluators {
                if !evaluators.contains(&spec.kind) {
                    return Err(ConfigurationError::UnknownEvaluatorType(spec.kind.clone()).into());
                }
                if !spec.max_score.is_finite() || spec.max_score < 0.0 {
                    return Err(ConfigurationError::InvalidOption {
                        owner: spec.name.clone(),
                        option: "max_score".to_string(),
                        message: format!("{} is not a non-negative number", spec.max_score),
                    }
                    .into());
                }
                if spec.timeout_secs == 0 {
                    return Err(ConfigurationError::InvalidOption {
                        owner: spec.name.clone(),
                        option: "timeout_secs".to_string(),
                        message: "must be at least 1 second".to_string(),
                    }
                    .into());
                }
                validate_value(&Value::Object(spec.options.clone()))?;
            }
        }

        let pipelines = config.pipelines()?;
        for pipeline in &pipelines {
            let declared: HashSet<&str> = pipeline.evaluators().iter().map(|e| e.name.as_str()).collect();
            if let Some(name) = pipeline
                .scoring()
                .referenced_evaluators()
                .find(|name| !declared.contains(name))
            {
                return Err(invalid(format!(
                    "scoring of evaluation '{}' references undeclared evaluator '{}'",
                    pipeline.name(),
                    name
                )));
            }
        }

        Ok(())
    }
}

impl HarnessConfig {
    /// Builds one pipeline per declared evaluation.
    pub fn pipelines(&self) -> Result<Vec<EvaluationPipeline>, ConfigurationError> {
        self.evaluations
            .iter()
            .map(|e| EvaluationPipeline::new(e.name.clone(), e.evaluators.clone(), e.scoring.clone()))
            .collect()
    }
}

fn invalid(message: impl Into<String>) -> HarnessError {
    ConfigurationError::Invalid(message.into()).into()
}

fn validate_env(env: &EnvMap) -> Result<(), HarnessError> {
    let map: Map<String, Value> = env
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    validate_value(&Value::Object(map))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolutionError;
    use std::io::Write;

    const MINIMAL: &str = r#"
dataset:
  path: data/instances.jsonl
evaluations:
  - name: default
    evaluators:
      - { name: build, type: command, options: { command: "mvn -q compile" } }
"#;

    fn check(yaml: &str) -> Result<(), HarnessError> {
        let config = ConfigLoader::from_yaml_str(yaml)?;
        ConfigLoader::validate(&config, &ConfigurerRegistry::builtin(), &EvaluatorRegistry::builtin())
    }

    #[test]
    fn test_minimal_config_is_valid() {
        check(MINIMAL).unwrap();
    }

    #[test]
    fn test_load_file_sets_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.yaml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(MINIMAL.as_bytes())
            .unwrap();

        let config = ConfigLoader::load_file(&path).unwrap();
        assert_eq!(config.base_dir, dir.path());
        assert_eq!(
            config.resolve_path(&config.dataset.path),
            dir.path().join("data/instances.jsonl")
        );
    }

    #[test]
    fn test_duplicate_evaluator_name() {
        let err = check(
            r#"
dataset: { path: d.jsonl }
evaluations:
  - name: default
    evaluators:
      - { name: build, type: command, options: { command: a } }
      - { name: build, type: command, options: { command: b } }
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Configuration(ConfigurationError::DuplicateEvaluatorName { ref name, .. }) if name == "build"
        ));
    }

    #[test]
    fn test_unknown_evaluator_type() {
        let err = check(
            r#"
dataset: { path: d.jsonl }
evaluations:
  - name: default
    evaluators:
      - { name: x, type: telepathy }
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Configuration(ConfigurationError::UnknownEvaluatorType(ref t)) if t == "telepathy"
        ));
    }

    #[test]
    fn test_unknown_configurer() {
        let err = check(
            r#"
dataset: { path: d.jsonl }
environment:
  configurers:
    - { name: ansible }
evaluations:
  - name: default
    evaluators: [{ name: x, type: command }]
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Configuration(ConfigurationError::UnknownConfigurerName(_))
        ));
    }

    #[test]
    fn test_undeclared_agent_reference() {
        let err = check(
            r#"
dataset: { path: d.jsonl }
agents:
  - { name: claude, command: "claude -p hi" }
evaluations:
  - name: default
    agents: [codex]
    evaluators: [{ name: x, type: run_agent }]
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Configuration(ConfigurationError::UnresolvedEntityReference { ref name, .. }) if name == "codex"
        ));
    }

    #[test]
    fn test_scoring_references_undeclared_evaluator() {
        let err = check(
            r#"
dataset: { path: d.jsonl }
evaluations:
  - name: default
    evaluators: [{ name: x, type: command }]
    scoring: { method: sum, evaluators: [test_gold] }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(ConfigurationError::Invalid(_))));
    }

    #[test]
    fn test_malformed_template_is_rejected() {
        let err = check(
            r#"
dataset: { path: d.jsonl }
evaluations:
  - name: default
    evaluators:
      - { name: x, type: command, options: { command: "echo {instance.unterminated" } }
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Resolution(ResolutionError::UnknownPlaceholderKind { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_concurrency_and_empty_evaluations() {
        assert!(check("dataset: { path: d.jsonl }\nevaluations: []\n").is_err());
        let zero = format!("{MINIMAL}concurrency: 0\n");
        assert!(check(&zero).is_err());
    }

    #[test]
    fn test_rejects_negative_max_score() {
        let err = check(
            r#"
dataset: { path: d.jsonl }
evaluations:
  - name: default
    evaluators: [{ name: x, type: command, max_score: -1 }]
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Configuration(ConfigurationError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = check(
            r#"
dataset: { path: d.jsonl }
evaluations:
  - name: default
    evaluators: [{ name: x, type: command, timeout_secs: 0, options: { command: "true" } }]
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Configuration(ConfigurationError::InvalidOption { ref option, .. })
                if option == "timeout_secs"
        ));
    }
}
