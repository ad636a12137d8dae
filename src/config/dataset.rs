//! Loading dataset instances and predictions.
//!
//! Both files are JSON Lines (one object per line) or a single JSON array.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde_json::Value;

use super::schema::{DatasetSpec, PredictionSpec};
use crate::error::{ConfigurationError, HarnessError};
use crate::options::EnvMap;

/// One dataset record.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: String,
    pub record: Value,
}

/// A candidate solution for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub instance_id: String,
    pub patch: Option<String>,
    pub record: Value,
}

/// All predictions from one source, keyed by instance id.
#[derive(Debug, Clone, Default)]
pub struct PredictionSet {
    pub id: String,
    pub env: EnvMap,
    by_instance: HashMap<String, Prediction>,
}

impl PredictionSet {
    /// Builds a set from already-parsed predictions.
    pub fn new(id: impl Into<String>, env: EnvMap, predictions: Vec<Prediction>) -> Self {
        Self {
            id: id.into(),
            env,
            by_instance: predictions
                .into_iter()
                .map(|p| (p.instance_id.clone(), p))
                .collect(),
        }
    }

    /// Prediction for an instance, if any.
    pub fn get(&self, instance_id: &str) -> Option<&Prediction> {
        self.by_instance.get(instance_id)
    }

    pub fn len(&self) -> usize {
        self.by_instance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_instance.is_empty()
    }
}

/// Loads dataset instances, applying the id filter and limit.
///
/// `extra_ids` (from the CLI) narrows the selection further.
pub fn load_instances(
    spec: &DatasetSpec,
    path: &Path,
    extra_ids: &[String],
) -> Result<Vec<Instance>, HarnessError> {
    let records = read_records(path)?;
    let mut seen = HashSet::new();
    let mut instances = Vec::with_capacity(records.len());

    for (index, record) in records.into_iter().enumerate() {
        let id = record_id(&record, &spec.id_field).ok_or_else(|| {
            ConfigurationError::Invalid(format!(
                "{}: record {} has no '{}' field",
                path.display(),
                index + 1,
                spec.id_field
            ))
        })?;
        if !seen.insert(id.clone()) {
            return Err(ConfigurationError::Invalid(format!(
                "{}: duplicate instance id '{}'",
                path.display(),
                id
            ))
            .into());
        }
        instances.push(Instance { id, record });
    }

    let selected = instances
        .into_iter()
        .filter(|i| spec.instance_ids.is_empty() || spec.instance_ids.contains(&i.id))
        .filter(|i| extra_ids.is_empty() || extra_ids.contains(&i.id));

    Ok(match spec.limit {
        Some(limit) => selected.take(limit).collect(),
        None => selected.collect(),
    })
}

/// Loads a prediction file.
pub fn load_predictions(spec: &PredictionSpec, path: &Path) -> Result<PredictionSet, HarnessError> {
    let mut predictions = Vec::new();
    for (index, record) in read_records(path)?.into_iter().enumerate() {
        let instance_id = record_id(&record, &spec.id_field).ok_or_else(|| {
            ConfigurationError::Invalid(format!(
                "{}: prediction {} has no '{}' field",
                path.display(),
                index + 1,
                spec.id_field
            ))
        })?;
        let patch = record
            .get(&spec.patch_field)
            .and_then(Value::as_str)
            .map(str::to_string);
        predictions.push(Prediction {
            instance_id,
            patch,
            record,
        });
    }
    tracing::debug!(source = %spec.id, count = predictions.len(), "Loaded predictions");
    Ok(PredictionSet::new(spec.id.clone(), spec.env.clone(), predictions))
}

fn read_records(path: &Path) -> Result<Vec<Value>, HarnessError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        HarnessError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;

    if content.trim_start().starts_with('[') {
        let records: Vec<Value> = serde_json::from_str(&content)?;
        return records
            .into_iter()
            .map(|r| require_object(r, path))
            .collect();
    }

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let value: Value = serde_json::from_str(line)?;
            require_object(value, path)
        })
        .collect()
}

fn require_object(value: Value, path: &Path) -> Result<Value, HarnessError> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(ConfigurationError::Invalid(format!(
            "{}: every record must be a JSON object",
            path.display()
        ))
        .into())
    }
}

fn record_id(record: &Value, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn dataset(instance_ids: &[&str], limit: Option<usize>) -> DatasetSpec {
        DatasetSpec {
            path: String::new(),
            id_field: "instance_id".into(),
            instance_ids: instance_ids.iter().map(|s| s.to_string()).collect(),
            limit,
        }
    }

    #[test]
    fn test_load_jsonl_with_filter_and_limit() {
        let file = write_temp(
            "{\"instance_id\": \"a\", \"x\": 1}\n\n{\"instance_id\": \"b\"}\n{\"instance_id\": \"c\"}\n",
        );
        let all = load_instances(&dataset(&[], None), file.path(), &[]).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].record["x"], 1);

        let limited = load_instances(&dataset(&[], Some(2)), file.path(), &[]).unwrap();
        assert_eq!(limited.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);

        let filtered =
            load_instances(&dataset(&["a", "c"], None), file.path(), &["c".to_string()]).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "c");
    }

    #[test]
    fn test_load_json_array_numeric_ids() {
        let file = write_temp(r#"[{"instance_id": 7}, {"instance_id": "eight"}]"#);
        let all = load_instances(&dataset(&[], None), file.path(), &[]).unwrap();
        assert_eq!(all[0].id, "7");
        assert_eq!(all[1].id, "eight");
    }

    #[test]
    fn test_missing_and_duplicate_ids_rejected() {
        let file = write_temp("{\"id\": \"a\"}\n");
        assert!(load_instances(&dataset(&[], None), file.path(), &[]).is_err());

        let file = write_temp("{\"instance_id\": \"a\"}\n{\"instance_id\": \"a\"}\n");
        assert!(load_instances(&dataset(&[], None), file.path(), &[]).is_err());
    }

    #[test]
    fn test_load_predictions() {
        let file = write_temp(
            "{\"instance_id\": \"a\", \"patch\": \"diff --git a/x b/x\"}\n{\"instance_id\": \"b\"}\n",
        );
        let spec = PredictionSpec {
            id: "gold".into(),
            path: String::new(),
            env: EnvMap::new(),
            id_field: "instance_id".into(),
            patch_field: "patch".into(),
        };
        let set = load_predictions(&spec, file.path()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("a").and_then(|p| p.patch.as_deref()), Some("diff --git a/x b/x"));
        assert!(set.get("b").unwrap().patch.is_none());
        assert!(set.get("zzz").is_none());
    }
}
