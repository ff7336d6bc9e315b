//! Policy engine: template-driven metadata rewriting

use crate::config::PolicyLocation;
use crate::normalize::set_key;
use crucible_core::{data, CrucibleResult, RenderError, ResolutionError, SemanticError, Test};
use crucible_dsl::template::{Bindings, Template};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Key holding the test rules inside a policy document.
const TEST_POLICY_KEY: &str = "test-policy";

/// One policy rule: an ordered set of `key: template` rewrites.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyRule {
    pub rewrites: Vec<(String, String)>,
}

/// A loaded policy document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Policy {
    pub rules: Vec<PolicyRule>,
}

impl Policy {
    /// Parse a policy document: a mapping with a `test-policy` list of
    /// rule mappings, each mapping test keys to template strings.
    pub fn from_value(document: &Value) -> CrucibleResult<Self> {
        let Value::Mapping(mapping) = document else {
            return Err(SemanticError::InvalidConstraint {
                reason: format!(
                    "policy document must be a mapping, got {}",
                    data::value_kind(document)
                ),
            }
            .into());
        };
        let Some(rules_value) = data::get(mapping, TEST_POLICY_KEY) else {
            return Err(SemanticError::InvalidConstraint {
                reason: format!("policy document is missing '{TEST_POLICY_KEY}'"),
            }
            .into());
        };
        let Value::Sequence(rule_items) = rules_value else {
            return Err(SemanticError::InvalidConstraint {
                reason: format!("'{TEST_POLICY_KEY}' must be a list of rule mappings"),
            }
            .into());
        };
        let mut rules = Vec::new();
        for item in rule_items {
            let Value::Mapping(rule) = item else {
                return Err(SemanticError::InvalidConstraint {
                    reason: format!(
                        "policy rule must be a mapping, got {}",
                        data::value_kind(item)
                    ),
                }
                .into());
            };
            let mut rewrites = Vec::new();
            for (key, template) in rule {
                let (Some(key), Some(template)) = (key.as_str(), template.as_str()) else {
                    return Err(SemanticError::InvalidConstraint {
                        reason: "policy rules map key names to template strings".to_string(),
                    }
                    .into());
                };
                rewrites.push((key.to_string(), template.to_string()));
            }
            rules.push(PolicyRule { rewrites });
        }
        Ok(Self { rules })
    }

    /// Parse policy text (YAML).
    pub fn from_str(text: &str, origin: &str) -> CrucibleResult<Self> {
        let document: Value =
            serde_yaml::from_str(text).map_err(|err| ResolutionError::Unparsable {
                path: origin.to_string(),
                reason: err.to_string(),
            })?;
        Self::from_value(&document)
    }

    /// Resolve and load the configured policy, if any.
    pub fn load(location: &PolicyLocation) -> CrucibleResult<Option<Self>> {
        let Some(path) = resolve(location)? else {
            return Ok(None);
        };
        let text = std::fs::read_to_string(&path).map_err(|err| ResolutionError::Unreadable {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Ok(Some(Self::from_str(&text, &path.display().to_string())?))
    }

    /// Rewrite a test in place.
    ///
    /// Rules apply in order; within a rule, keys rewrite in declaration
    /// order. Each rendered template is re-parsed as YAML, normalized per
    /// the key's schema, substituted, and tagged `policy`. Failures name
    /// the rule and the key, and are fatal for this test only.
    pub fn apply(&self, test: &mut Test, deadline: Option<Instant>) -> CrucibleResult<()> {
        for (index, rule) in self.rules.iter().enumerate() {
            for (key, template) in &rule.rewrites {
                rewrite_key(test, index, key, template, deadline)?;
            }
        }
        Ok(())
    }
}

fn rewrite_key(
    test: &mut Test,
    rule: usize,
    key: &str,
    template: &str,
    deadline: Option<Instant>,
) -> CrucibleResult<()> {
    let fail = |reason: String| RenderError {
        rule,
        key: key.to_string(),
        reason,
    };

    let template = Template::parse(template).map_err(|err| fail(err.to_string()))?;

    let mut bindings = Bindings::new();
    bindings.insert(
        "VALUE".to_string(),
        data::yaml_to_json(&test.key_value(key)),
    );
    bindings.insert(
        "VALUE_SOURCE".to_string(),
        serde_json::Value::String(test.source(key).to_string()),
    );
    bindings.insert("TEST".to_string(), data::yaml_to_json(&test.to_value()));

    let rendered = template
        .render(&bindings, deadline)
        .map_err(|err| fail(err.to_string()))?;

    // A rule rendering to nothing opts out: the key keeps its value and
    // its source tag.
    if rendered.trim().is_empty() {
        return Ok(());
    }

    let value: Value = serde_yaml::from_str(&rendered)
        .map_err(|err| fail(format!("rendered value does not parse: {err}")))?;

    set_key(test, key, &value).map_err(|err| fail(err.to_string()))?;
    test.set_source(key, crucible_core::SourceTag::Policy);
    Ok(())
}

/// Resolve the policy location to a concrete path.
///
/// With a root configured, every resolved path must lie under it.
/// Symbolic names map dots to directory separators: `ci.checks` becomes
/// `<root>/ci/checks.yaml`.
fn resolve(location: &PolicyLocation) -> CrucibleResult<Option<PathBuf>> {
    if let Some(file) = &location.file {
        if let Some(root) = &location.root {
            ensure_under_root(file, root)?;
        }
        return Ok(Some(file.clone()));
    }
    let Some(name) = &location.name else {
        return Ok(None);
    };
    let Some(root) = &location.root else {
        return Err(ResolutionError::RootRequired { name: name.clone() }.into());
    };
    let relative: PathBuf = name.split('.').collect();
    let path = root.join(relative).with_extension("yaml");
    if !path.is_file() {
        return Err(ResolutionError::NameNotFound {
            name: name.clone(),
            root: root.display().to_string(),
        }
        .into());
    }
    ensure_under_root(&path, root)?;
    Ok(Some(path))
}

fn ensure_under_root(path: &Path, root: &Path) -> CrucibleResult<()> {
    let canonical_path = path.canonicalize().map_err(|err| ResolutionError::Unreadable {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    let canonical_root = root.canonicalize().map_err(|err| ResolutionError::Unreadable {
        path: root.display().to_string(),
        reason: err.to_string(),
    })?;
    if !canonical_path.starts_with(&canonical_root) {
        return Err(ResolutionError::OutsideRoot {
            path: path.display().to_string(),
            root: root.display().to_string(),
        }
        .into());
    }
    Ok(())
}
