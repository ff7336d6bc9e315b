//! Structured-data merge primitives
//!
//! Raw metadata is YAML (`serde_yaml::Value`). Inheritance and adjust
//! payloads both merge mappings over mappings, honoring the trailing `+`
//! merge marker on keys: `tag+` appends to the inherited list instead of
//! replacing it. After a merge no marker survives.

use crate::error::SemanticError;
use serde_yaml::{Mapping, Value};

/// Trailing marker denoting "append/merge with the inherited value".
pub const MERGE_MARKER: char = '+';

/// Merge `child` over `parent`, consuming merge markers in `child` keys.
///
/// Plain keys replace the inherited value; `key+` combines it with the
/// inherited one via [`merge_plus`]. Keys are processed in `child`'s
/// declaration order.
pub fn merge_data(child: &Mapping, parent: &Mapping) -> Result<Mapping, SemanticError> {
    let mut merged = parent.clone();
    for (key, value) in child {
        let Some(name) = key.as_str() else {
            // Non-string keys cannot carry markers; last writer wins.
            merged.insert(key.clone(), value.clone());
            continue;
        };
        match name.strip_suffix(MERGE_MARKER) {
            Some(base) => {
                let base_key = Value::String(base.to_string());
                let combined = match merged.get(&base_key) {
                    Some(inherited) => merge_plus(base, inherited, value)?,
                    None => value.clone(),
                };
                merged.insert(base_key, combined);
            }
            None => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(merged)
}

/// Combine an inherited value with an appended one.
///
/// Lists concatenate (inherited first), mappings merge recursively with
/// the appended side winning, strings concatenate, numbers add. Anything
/// else is a merge conflict.
pub fn merge_plus(key: &str, inherited: &Value, appended: &Value) -> Result<Value, SemanticError> {
    match (inherited, appended) {
        (Value::Sequence(old), Value::Sequence(new)) => {
            let mut items = old.clone();
            items.extend(new.iter().cloned());
            Ok(Value::Sequence(items))
        }
        // Appending a scalar to a list is the list-of-one shorthand.
        (Value::Sequence(old), new) if !new.is_mapping() => {
            let mut items = old.clone();
            items.push(new.clone());
            Ok(Value::Sequence(items))
        }
        (Value::Mapping(old), Value::Mapping(new)) => merge_data(new, old).map(Value::Mapping),
        (Value::String(old), Value::String(new)) => Ok(Value::String(format!("{old}{new}"))),
        (Value::Number(old), Value::Number(new)) => {
            if let (Some(a), Some(b)) = (old.as_i64(), new.as_i64()) {
                Ok(Value::Number((a + b).into()))
            } else if let (Some(a), Some(b)) = (old.as_f64(), new.as_f64()) {
                Ok(Value::Number(serde_yaml::Number::from(a + b)))
            } else {
                Err(SemanticError::MergeConflict {
                    key: key.to_string(),
                    reason: "cannot add mixed number kinds".to_string(),
                })
            }
        }
        (old, new) => Err(SemanticError::MergeConflict {
            key: key.to_string(),
            reason: format!(
                "cannot append {} to {}",
                value_kind(new),
                value_kind(old)
            ),
        }),
    }
}

/// Expand the list-of-one shorthand: a scalar becomes a one-element list.
pub fn to_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Sequence(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// Human-readable kind name for diagnostics.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

/// Project a YAML value into plain JSON data (used for template
/// bindings). Non-string mapping keys are stringified; tagged values
/// lose their tag.
pub fn yaml_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(flag) => serde_json::Value::Bool(*flag),
        Value::Number(number) => {
            if let Some(n) = number.as_i64() {
                serde_json::Value::Number(n.into())
            } else if let Some(n) = number.as_u64() {
                serde_json::Value::Number(n.into())
            } else {
                number
                    .as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
        }
        Value::String(text) => serde_json::Value::String(text.clone()),
        Value::Sequence(items) => {
            serde_json::Value::Array(items.iter().map(yaml_to_json).collect())
        }
        Value::Mapping(mapping) => serde_json::Value::Object(
            mapping
                .iter()
                .map(|(key, value)| {
                    let key = match key {
                        Value::String(text) => text.clone(),
                        other => serde_yaml::to_string(other)
                            .map(|s| s.trim_end().to_string())
                            .unwrap_or_default(),
                    };
                    (key, yaml_to_json(value))
                })
                .collect(),
        ),
        Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

/// Fetch a string-keyed entry from a mapping.
pub fn get<'a>(mapping: &'a Mapping, key: &str) -> Option<&'a Value> {
    mapping.get(Value::String(key.to_string()))
}

/// Build a YAML string value.
pub fn string(text: impl Into<String>) -> Value {
    Value::String(text.into())
}
