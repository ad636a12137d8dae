//! Lookup scopes for template resolution.

use std::collections::BTreeMap;

use serde_json::Value;

/// Read-only bundle of the three lookup sources a template can reference.
///
/// A scope is built once per resolution context (one dataset instance, or the
/// run as a whole) and never mutated while strings are being resolved.
#[derive(Debug, Clone, Default)]
pub struct ResolutionScope {
    /// Dataset instance record, addressed by `{instance.<dotted.path>}`.
    pub instance: Value,
    /// Environment variables, addressed by `${VAR}` forms.
    pub env: BTreeMap<String, String>,
    /// CLI overrides, addressed by `{cli.<name>}`.
    pub cli: BTreeMap<String, String>,
}

impl ResolutionScope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the instance record.
    pub fn with_instance(mut self, instance: Value) -> Self {
        self.instance = instance;
        self
    }

    /// Sets the environment mapping.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Sets the CLI mapping.
    pub fn with_cli(mut self, cli: BTreeMap<String, String>) -> Self {
        self.cli = cli;
        self
    }

    /// Snapshot of the current process environment.
    pub fn process_env() -> BTreeMap<String, String> {
        std::env::vars().collect()
    }

    /// Looks up a dotted path in the instance record.
    ///
    /// Objects are walked by key and arrays by numeric index. `null` is
    /// treated as absent so that defaults apply.
    pub fn lookup_instance(&self, path: &str) -> Option<String> {
        let mut current = &self.instance;
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        value_to_text(current)
    }

    /// Returns an environment variable, if set.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }

    /// Returns an environment variable only if it is set to a non-empty value.
    pub fn env_var_non_empty(&self, name: &str) -> Option<&str> {
        self.env_var(name).filter(|v| !v.is_empty())
    }

    /// Returns a CLI argument, if provided.
    pub fn cli_arg(&self, name: &str) -> Option<&str> {
        self.cli.get(name).map(String::as_str)
    }
}

/// Renders a JSON value as the text substituted into a template.
fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_nested_and_indexed() {
        let scope = ResolutionScope::new().with_instance(json!({
            "repo": {"name": "acme/widgets", "stars": 42},
            "tests": ["a", "b"],
            "flag": true,
            "nothing": null
        }));

        assert_eq!(scope.lookup_instance("repo.name").as_deref(), Some("acme/widgets"));
        assert_eq!(scope.lookup_instance("repo.stars").as_deref(), Some("42"));
        assert_eq!(scope.lookup_instance("tests.1").as_deref(), Some("b"));
        assert_eq!(scope.lookup_instance("flag").as_deref(), Some("true"));
        assert_eq!(scope.lookup_instance("tests").as_deref(), Some(r#"["a","b"]"#));
        assert!(scope.lookup_instance("nothing").is_none());
        assert!(scope.lookup_instance("repo.missing").is_none());
        assert!(scope.lookup_instance("tests.9").is_none());
    }

    #[test]
    fn test_env_non_empty() {
        let mut env = BTreeMap::new();
        env.insert("EMPTY".to_string(), String::new());
        env.insert("SET".to_string(), "1".to_string());
        let scope = ResolutionScope::new().with_env(env);

        assert_eq!(scope.env_var("EMPTY"), Some(""));
        assert!(scope.env_var_non_empty("EMPTY").is_none());
        assert_eq!(scope.env_var_non_empty("SET"), Some("1"));
    }
}
