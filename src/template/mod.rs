//! Template resolution for configuration strings.
//!
//! Any string field in the harness configuration may contain placeholders
//! that are substituted from a [`ResolutionScope`]:
//!
//! | Form | Meaning |
//! |---|---|
//! | `{instance.path}` / `{instance.path:default}` | dotted lookup in the instance record |
//! | `${VAR}` | env var, empty if unset |
//! | `${VAR:-default}` | env var, `default` if unset or empty |
//! | `${VAR:?message}` | env var, fails with `message` if unset or empty |
//! | `${VAR:+value}` | `value` if the var is set and non-empty, else empty |
//! | `{cli.name}` / `{cli.name:default}` | CLI override |
//!
//! Resolution is single-pass and all-or-nothing: substituted text is never
//! rescanned, and any failing placeholder fails the whole string.
//!
//! # Example
//!
//! ```ignore
//! use swe_eval::template::{resolve, ResolutionScope};
//!
//! let scope = ResolutionScope::new().with_instance(json!({"jvm_version": "21"}));
//! assert_eq!(resolve("{instance.jvm_version:24}", &scope)?, "21");
//! ```

pub mod parser;
pub mod scope;

pub use parser::{EnvOp, Segment};
pub use scope::ResolutionScope;

use serde_json::Value;

use crate::error::ResolutionError;

/// A parsed template expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parses an expression without resolving it.
    pub fn parse(expr: &str) -> Result<Self, ResolutionError> {
        Ok(Self {
            segments: parser::parse(expr)?,
        })
    }

    /// Returns true if the template contains no placeholders.
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Returns the parsed segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Renders the template against a scope.
    pub fn render(&self, scope: &ResolutionScope) -> Result<String, ResolutionError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Instance { path, default } => {
                    match (scope.lookup_instance(path), default) {
                        (Some(value), _) => out.push_str(&value),
                        (None, Some(default)) => out.push_str(default),
                        (None, None) => {
                            return Err(ResolutionError::MissingProperty { path: path.clone() })
                        }
                    }
                }
                Segment::Cli { name, default } => match (scope.cli_arg(name), default) {
                    (Some(value), _) => out.push_str(value),
                    (None, Some(default)) => out.push_str(default),
                    (None, None) => {
                        return Err(ResolutionError::MissingCliArg { name: name.clone() })
                    }
                },
                Segment::Env { var, op } => out.push_str(&render_env(var, op, scope)?),
            }
        }
        Ok(out)
    }
}

fn render_env(var: &str, op: &EnvOp, scope: &ResolutionScope) -> Result<String, ResolutionError> {
    let value = scope.env_var_non_empty(var);
    match op {
        EnvOp::Plain => Ok(scope.env_var(var).unwrap_or_default().to_string()),
        EnvOp::Default(default) => Ok(value.unwrap_or(default).to_string()),
        EnvOp::Required(message) => match value {
            Some(v) => Ok(v.to_string()),
            None => Err(ResolutionError::MissingEnvRequired {
                var: var.to_string(),
                message: if message.is_empty() {
                    format!("{} is required", var)
                } else {
                    message.clone()
                },
            }),
        },
        EnvOp::Alternate(alt) => Ok(if value.is_some() {
            alt.clone()
        } else {
            String::new()
        }),
    }
}

/// Resolves every placeholder in `expr`.
pub fn resolve(expr: &str, scope: &ResolutionScope) -> Result<String, ResolutionError> {
    if !expr.contains('{') {
        return Ok(expr.to_string());
    }
    Template::parse(expr)?.render(scope)
}

/// Resolves every string leaf of a JSON value. Object keys are left untouched.
pub fn resolve_value(value: &Value, scope: &ResolutionScope) -> Result<Value, ResolutionError> {
    match value {
        Value::String(s) => Ok(Value::String(resolve(s, scope)?)),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), resolve_value(item, scope)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Checks placeholder syntax of every string leaf without resolving.
pub fn validate_value(value: &Value) -> Result<(), ResolutionError> {
    match value {
        Value::String(s) => Template::parse(s).map(|_| ()),
        Value::Array(items) => items.iter().try_for_each(validate_value),
        Value::Object(map) => map.values().try_for_each(validate_value),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_instance_default_and_override() {
        let empty = ResolutionScope::new().with_instance(json!({}));
        assert_eq!(resolve("{instance.jvm_version:24}", &empty).unwrap(), "24");

        let set = ResolutionScope::new().with_instance(json!({"jvm_version": "21"}));
        assert_eq!(resolve("{instance.jvm_version:24}", &set).unwrap(), "21");
    }

    #[test]
    fn test_instance_missing_without_default_fails() {
        let scope = ResolutionScope::new().with_instance(json!({}));
        let err = resolve("{instance.repo.name}", &scope).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::MissingProperty {
                path: "repo.name".into()
            }
        );
    }

    #[test]
    fn test_env_forms() {
        let scope = ResolutionScope::new().with_env(env(&[("SET", "v"), ("EMPTY", "")]));

        assert_eq!(resolve("${SET}", &scope).unwrap(), "v");
        assert_eq!(resolve("${UNSET}", &scope).unwrap(), "");
        assert_eq!(resolve("${UNSET:-fallback}", &scope).unwrap(), "fallback");
        assert_eq!(resolve("${EMPTY:-fallback}", &scope).unwrap(), "fallback");
        assert_eq!(resolve("${SET:-fallback}", &scope).unwrap(), "v");
        assert_eq!(resolve("${SET:+on}", &scope).unwrap(), "on");
        assert_eq!(resolve("${EMPTY:+on}", &scope).unwrap(), "");
        assert_eq!(resolve("${UNSET:+on}", &scope).unwrap(), "");
    }

    #[test]
    fn test_env_default_with_empty_scope() {
        let scope = ResolutionScope::new();
        assert_eq!(resolve("${TOK:-default}", &scope).unwrap(), "default");
    }

    #[test]
    fn test_env_required_fails_with_message() {
        let scope = ResolutionScope::new();
        let err = resolve("${TOK:?required}", &scope).unwrap_err();
        assert_eq!(err.to_string(), "required");
        assert!(matches!(err, ResolutionError::MissingEnvRequired { ref var, .. } if var == "TOK"));
    }

    #[test]
    fn test_cli_lookup() {
        let scope = ResolutionScope::new().with_cli(env(&[("run_id", "r1")]));
        assert_eq!(resolve("out/{cli.run_id}", &scope).unwrap(), "out/r1");
        assert_eq!(resolve("{cli.tag:dev}", &scope).unwrap(), "dev");
        let err = resolve("{cli.missing}", &scope).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::MissingCliArg {
                name: "missing".into()
            }
        );
    }

    #[test]
    fn test_multiple_placeholders_left_to_right() {
        let scope = ResolutionScope::new()
            .with_instance(json!({"repo": "acme/app", "sha": "abc"}))
            .with_env(env(&[("REG", "ghcr.io")]))
            .with_cli(env(&[("tag", "v1")]));
        let out = resolve("${REG}/{instance.repo}@{instance.sha}:{cli.tag}", &scope).unwrap();
        assert_eq!(out, "ghcr.io/acme/app@abc:v1");
    }

    #[test]
    fn test_single_pass_no_rescan() {
        let scope = ResolutionScope::new()
            .with_instance(json!({"evil": "${SECRET:?boom}", "nested": "{instance.other}"}));
        assert_eq!(resolve("{instance.evil}", &scope).unwrap(), "${SECRET:?boom}");
        assert_eq!(resolve("{instance.nested}", &scope).unwrap(), "{instance.other}");
    }

    #[test]
    fn test_idempotent_on_resolved_strings() {
        let scope = ResolutionScope::new().with_instance(json!({"a": "x"}));
        let once = resolve("prefix-{instance.a}-suffix", &scope).unwrap();
        let twice = resolve(&once, &scope).unwrap();
        assert_eq!(once, twice);
        assert_eq!(resolve("plain text", &scope).unwrap(), "plain text");
    }

    #[test]
    fn test_failure_is_all_or_nothing() {
        let scope = ResolutionScope::new().with_instance(json!({"a": "x"}));
        assert!(resolve("{instance.a}-{instance.b}", &scope).is_err());
    }

    #[test]
    fn test_resolve_value_tree() {
        let scope = ResolutionScope::new().with_instance(json!({"cls": "FooTest"}));
        let value = json!({
            "{instance.cls}": "{instance.cls}",
            "tests": ["mvn test -Dtest={instance.cls}"],
            "max": 3
        });
        let resolved = resolve_value(&value, &scope).unwrap();
        assert_eq!(resolved["{instance.cls}"], "FooTest");
        assert_eq!(resolved["tests"][0], "mvn test -Dtest=FooTest");
        assert_eq!(resolved["max"], 3);
    }

    #[test]
    fn test_validate_value_catches_bad_syntax() {
        assert!(validate_value(&json!({"a": ["ok {instance.x}"]})).is_ok());
        assert!(validate_value(&json!({"a": ["bad {nope.x}"]})).is_err());
    }
}
