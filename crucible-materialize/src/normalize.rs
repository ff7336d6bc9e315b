//! Normalization of raw nodes into typed tests

use crucible_core::{
    data, parse_duration, Check, CrucibleResult, Framework, Link, LinkRelation,
    ResultInterpretation, SchemaError, SourceTag, Test,
};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// Caller-supplied key values layered over the node before normalization.
///
/// Precedence is CLI over environment over node data over built-in
/// defaults; both override layers are tagged `cli` on the resulting test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyOverrides {
    pub cli: BTreeMap<String, Value>,
    pub env: BTreeMap<String, Value>,
}

impl KeyOverrides {
    pub fn is_empty(&self) -> bool {
        self.cli.is_empty() && self.env.is_empty()
    }

    /// Pick up plugin-option override variables for one step/plugin pair
    /// (`CRUCIBLE_PLUGIN_<STEP>_<PLUGIN>_<OPTION>`).
    pub fn from_env(step: &str, plugin: &str) -> Self {
        Self {
            cli: BTreeMap::new(),
            env: crate::config::plugin_option_overrides(step, plugin),
        }
    }
}

/// Normalize a raw (already adjusted) node into a typed test.
pub fn normalize_test(
    name: &str,
    node: &Mapping,
    overrides: &KeyOverrides,
) -> CrucibleResult<Test> {
    let mut test = Test::new(name)?;

    let mut apply = |key: &str, value: &Value, tag: SourceTag| -> Result<(), SchemaError> {
        set_key(&mut test, key, value)?;
        test.set_source(key, tag);
        Ok(())
    };

    for (key, value) in node {
        let Some(key) = key.as_str() else {
            return Err(SchemaError::InvalidValue {
                key: format!("{key:?}"),
                reason: "top-level keys must be strings".to_string(),
            }
            .into());
        };
        // `name` is fixed at load; a literal `adjust` key means the
        // adjuster was skipped and the rules are dead weight here.
        if key == "name" || key == "adjust" {
            continue;
        }
        if overrides.cli.contains_key(key) || overrides.env.contains_key(key) {
            continue;
        }
        apply(key, value, SourceTag::Fmf)?;
    }
    for (key, value) in &overrides.env {
        if overrides.cli.contains_key(key) {
            continue;
        }
        apply(key, value, SourceTag::Cli)?;
    }
    for (key, value) in &overrides.cli {
        apply(key, value, SourceTag::Cli)?;
    }

    Ok(test)
}

/// Normalize one value per its key's schema and store it on the test.
///
/// Unknown keys are preserved as-is in the `extra` sidecar. The policy
/// engine uses the same entry point, so a rewritten value faces exactly
/// the checks the loader applies.
pub fn set_key(test: &mut Test, key: &str, value: &Value) -> Result<(), SchemaError> {
    match key {
        "test" => test.test = Some(expect_string(key, value)?),
        "path" => test.path = Some(expect_string(key, value)?),
        "id" => test.id = Some(expect_string(key, value)?),
        "framework" => test.framework = Framework::from(expect_string(key, value)?),
        "duration" => {
            test.duration = match value {
                Value::Number(number) => {
                    number.as_u64().ok_or_else(|| SchemaError::InvalidDuration(
                        number.to_string(),
                    ))?
                }
                Value::String(text) => parse_duration(text)?,
                other => {
                    return Err(mismatch(key, "duration string", other));
                }
            }
        }
        "tag" | "contact" | "require" | "recommend" => {
            let items = string_list(key, value)?;
            match key {
                "tag" => test.tag = items,
                "contact" => test.contact = items,
                "require" => test.require = items,
                _ => test.recommend = items,
            }
        }
        "environment" => {
            let Value::Mapping(mapping) = value else {
                return Err(mismatch(key, "mapping", value));
            };
            let mut environment = BTreeMap::new();
            for (name, item) in mapping {
                let Some(name) = name.as_str() else {
                    return Err(SchemaError::InvalidValue {
                        key: key.to_string(),
                        reason: "environment variable names must be strings".to_string(),
                    });
                };
                environment.insert(name.to_string(), scalar_text(key, item)?);
            }
            test.environment = environment;
        }
        "enabled" => {
            let Value::Bool(flag) = value else {
                return Err(mismatch(key, "boolean", value));
            };
            test.enabled = *flag;
        }
        "result" => {
            test.result = expect_string(key, value)?.parse::<ResultInterpretation>()?;
        }
        "check" => {
            let mut checks = Vec::new();
            for item in data::to_list(value) {
                checks.push(parse_check(&item)?);
            }
            test.check = checks;
        }
        "link" => {
            let mut links = Vec::new();
            for item in data::to_list(value) {
                links.push(parse_link(&item)?);
            }
            test.link = links;
        }
        "name" => {
            return Err(SchemaError::InvalidValue {
                key: key.to_string(),
                reason: "test names are immutable after loading".to_string(),
            });
        }
        other => {
            test.extra
                .insert(Value::String(other.to_string()), value.clone());
        }
    }
    Ok(())
}

fn parse_check(value: &Value) -> Result<Check, SchemaError> {
    match value {
        // Plain name shorthand: `check: dmesg`.
        Value::String(how) => Ok(Check {
            how: how.clone(),
            ..Check::default()
        }),
        Value::Mapping(_) => {
            serde_yaml::from_value(value.clone()).map_err(|err| SchemaError::InvalidValue {
                key: "check".to_string(),
                reason: err.to_string(),
            })
        }
        other => Err(mismatch("check", "check name or mapping", other)),
    }
}

fn parse_link(value: &Value) -> Result<Link, SchemaError> {
    match value {
        // Bare target shorthand: a generic `relates` link.
        Value::String(target) => Ok(Link::new(LinkRelation::Relates, target.clone())),
        Value::Mapping(mapping) => {
            // Explicit form first: {relation: ..., target: ...}.
            if let Some(target) = data::get(mapping, "target") {
                let relation = match data::get(mapping, "relation") {
                    Some(Value::String(name)) => LinkRelation::from(name.clone()),
                    Some(other) => {
                        return Err(mismatch("link", "relation name", other));
                    }
                    None => LinkRelation::default(),
                };
                let mut link = Link::new(relation, expect_string("link", target)?);
                if let Some(Value::String(note)) = data::get(mapping, "note") {
                    link.note = Some(note.clone());
                }
                return Ok(link);
            }
            // Relation-keyed shorthand: {verifies: URL, note: ...}.
            for (key, target) in mapping {
                let Some(name) = key.as_str() else { continue };
                if name == "note" {
                    continue;
                }
                let mut link =
                    Link::new(LinkRelation::from(name.to_string()), expect_string("link", target)?);
                if let Some(Value::String(note)) = data::get(mapping, "note") {
                    link.note = Some(note.clone());
                }
                return Ok(link);
            }
            Err(SchemaError::InvalidValue {
                key: "link".to_string(),
                reason: "link mapping carries no relation".to_string(),
            })
        }
        other => Err(mismatch("link", "link target or mapping", other)),
    }
}

fn string_list(key: &str, value: &Value) -> Result<Vec<String>, SchemaError> {
    data::to_list(value)
        .iter()
        .map(|item| expect_string(key, item))
        .collect()
}

fn expect_string(key: &str, value: &Value) -> Result<String, SchemaError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        other => Err(mismatch(key, "string", other)),
    }
}

/// Environment values tolerate scalar shorthand (numbers, booleans).
fn scalar_text(key: &str, value: &Value) -> Result<String, SchemaError> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(mismatch(key, "scalar", other)),
    }
}

fn mismatch(key: &str, expected: &str, got: &Value) -> SchemaError {
    SchemaError::TypeMismatch {
        key: key.to_string(),
        expected: expected.to_string(),
        got: data::value_kind(got).to_string(),
    }
}
