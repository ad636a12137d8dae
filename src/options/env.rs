//! Environment variable merging across nested scopes.
//!
//! Env maps are never replaced wholesale: layers are applied from least to
//! most specific (sandbox → configurer/evaluation → prediction → agent) and
//! a key in a later layer overwrites the same key from an earlier one.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ResolutionError;
use crate::template::{resolve, ResolutionScope};

/// Environment map with deterministic key order.
pub type EnvMap = BTreeMap<String, String>;

/// Merges env layers ordered least to most specific.
pub fn merge_env<'a, I>(layers: I) -> EnvMap
where
    I: IntoIterator<Item = &'a EnvMap>,
{
    let mut merged = EnvMap::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Ordered stack of raw (unresolved) env layers.
#[derive(Debug, Clone, Default)]
pub struct EnvLayers {
    layers: Vec<(String, EnvMap)>,
}

impl EnvLayers {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a more specific layer on top of the stack.
    pub fn push(mut self, label: impl Into<String>, layer: &EnvMap) -> Self {
        self.layers.push((label.into(), layer.clone()));
        self
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// True if no layers were pushed.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Resolves templates in every value, then merges.
    ///
    /// Values are resolved per layer against the same scope, so a value in a
    /// specific layer cannot observe values from a less specific one.
    pub fn resolve(&self, scope: &ResolutionScope) -> Result<EnvMap, ResolutionError> {
        let mut resolved = Vec::with_capacity(self.layers.len());
        for (_, layer) in &self.layers {
            let mut out = EnvMap::new();
            for (key, value) in layer {
                out.insert(key.clone(), resolve(value, scope)?);
            }
            resolved.push(out);
        }
        Ok(merge_env(&resolved))
    }
}

/// Deserializes a YAML/JSON env mapping, stringifying scalar values.
///
/// `PORT: 8080` and `DEBUG: true` are accepted; nested maps and lists are not.
pub fn deserialize_env_map<'de, D>(deserializer: D) -> Result<EnvMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    let mut env = EnvMap::new();
    for (key, value) in raw.unwrap_or_default() {
        let text = match value {
            Value::Null => String::new(),
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            _ => {
                return Err(serde::de::Error::custom(format!(
                    "env var '{}' must be a scalar value",
                    key
                )))
            }
        };
        env.insert(key, text);
    }
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_merge_overrides_key_by_key() {
        let base = map(&[("A", "1"), ("B", "1")]);
        let over = map(&[("B", "2"), ("C", "3")]);
        let merged = merge_env([&base, &over]);
        assert_eq!(merged, map(&[("A", "1"), ("B", "2"), ("C", "3")]));
    }

    #[test]
    fn test_merge_three_layers_most_specific_wins() {
        let sandbox = map(&[("A", "sandbox"), ("KEEP", "yes")]);
        let configurer = map(&[("A", "configurer"), ("B", "configurer")]);
        let prediction = map(&[("B", "prediction")]);
        let merged = merge_env([&sandbox, &configurer, &prediction]);
        assert_eq!(merged["A"], "configurer");
        assert_eq!(merged["B"], "prediction");
        assert_eq!(merged["KEEP"], "yes");
    }

    #[test]
    fn test_layers_resolve_templates() {
        let scope = ResolutionScope::new().with_instance(json!({"jdk": "21"}));
        let layers = EnvLayers::new()
            .push("sandbox", &map(&[("JAVA_VERSION", "{instance.jdk}")]))
            .push("configurer", &map(&[("MODE", "${MODE:-fast}")]));
        let env = layers.resolve(&scope).unwrap();
        assert_eq!(env["JAVA_VERSION"], "21");
        assert_eq!(env["MODE"], "fast");
        assert_eq!(layers.len(), 2);
    }

    #[test]
    fn test_layers_resolution_failure_propagates() {
        let layers = EnvLayers::new().push("sandbox", &map(&[("TOKEN", "${TOKEN:?token missing}")]));
        let err = layers.resolve(&ResolutionScope::new()).unwrap_err();
        assert_eq!(err.to_string(), "token missing");
    }

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "deserialize_env_map")]
        env: EnvMap,
    }

    #[test]
    fn test_deserialize_env_scalars() {
        let holder: Holder = serde_yaml::from_str("env:\n  PORT: 8080\n  DEBUG: true\n  NAME: x\n").unwrap();
        assert_eq!(holder.env["PORT"], "8080");
        assert_eq!(holder.env["DEBUG"], "true");
        assert_eq!(holder.env["NAME"], "x");

        let holder: Holder = serde_yaml::from_str("{}").unwrap();
        assert!(holder.env.is_empty());

        assert!(serde_yaml::from_str::<Holder>("env:\n  BAD: [1, 2]\n").is_err());
    }
}
