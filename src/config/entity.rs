//! Declarative entity override for agent lists.
//!
//! An evaluation lists agents either by bare name (the top-level declaration
//! is used unmodified) or as a structured entry with the same name whose set
//! fields replace the declared ones. The env map is merged key by key instead.

use serde_json::Value;

use super::schema::{AgentRef, AgentSpec};
use crate::error::{ConfigurationError, ResolutionError};
use crate::options::merge_env;
use crate::template::{resolve, resolve_value, ResolutionScope};

/// Resolves agent references against the top-level declarations.
pub fn resolve_agents(
    refs: &[AgentRef],
    declared: &[AgentSpec],
) -> Result<Vec<AgentSpec>, ConfigurationError> {
    refs.iter().map(|r| resolve_agent(r, declared)).collect()
}

/// Resolves a single reference.
pub fn resolve_agent(
    reference: &AgentRef,
    declared: &[AgentSpec],
) -> Result<AgentSpec, ConfigurationError> {
    let base = declared
        .iter()
        .find(|a| a.name == reference.name())
        .ok_or_else(|| ConfigurationError::UnresolvedEntityReference {
            kind: "agent".to_string(),
            name: reference.name().to_string(),
        })?;

    let AgentRef::Override(over) = reference else {
        return Ok(base.clone());
    };

    Ok(AgentSpec {
        name: base.name.clone(),
        command: over.command.clone().unwrap_or_else(|| base.command.clone()),
        image: over.image.clone().or_else(|| base.image.clone()),
        env: merge_env([&base.env, &over.env]),
        timeout_secs: over.timeout_secs.or(base.timeout_secs),
        options: over.options.clone().unwrap_or_else(|| base.options.clone()),
    })
}

impl AgentSpec {
    /// Returns a copy with every template in the agent resolved.
    pub fn resolve(&self, scope: &ResolutionScope) -> Result<AgentSpec, ResolutionError> {
        let options = match resolve_value(&Value::Object(self.options.clone()), scope)? {
            Value::Object(map) => map,
            _ => self.options.clone(),
        };
        Ok(AgentSpec {
            name: self.name.clone(),
            command: resolve(&self.command, scope)?,
            image: self
                .image
                .as_deref()
                .map(|image| resolve(image, scope))
                .transpose()?,
            env: self
                .env
                .iter()
                .map(|(k, v)| resolve(v, scope).map(|v| (k.clone(), v)))
                .collect::<Result<_, _>>()?,
            timeout_secs: self.timeout_secs,
            options,
        })
    }
}
