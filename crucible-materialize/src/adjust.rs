//! Context-conditional adjustment of raw nodes

use crucible_core::{data, Context, CrucibleResult, SemanticError, Warning};
use crucible_dsl::{evaluate, parse};
use serde_yaml::{Mapping, Value};

/// Reserved keys of an adjust rule; everything else is the payload.
const RESERVED: &[&str] = &["when", "continue", "because"];

/// One conditional rewrite rule.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustRule {
    /// Condition over the context; required.
    pub when: String,
    /// Whether later rules still apply once this one fired.
    pub continue_: bool,
    /// Free-form justification, used for diagnostics only.
    pub because: Option<String>,
    /// Metadata merged into the node when the rule fires.
    pub payload: Mapping,
}

/// Parse the value of an `adjust` key: a rule mapping or a list of them.
pub fn parse_rules(value: &Value) -> Result<Vec<AdjustRule>, SemanticError> {
    match value {
        Value::Mapping(rule) => Ok(vec![parse_rule(rule)?]),
        Value::Sequence(rules) => rules
            .iter()
            .map(|item| match item {
                Value::Mapping(rule) => parse_rule(rule),
                other => Err(SemanticError::InvalidAdjustRule {
                    reason: format!("expected a rule mapping, got {}", data::value_kind(other)),
                }),
            })
            .collect(),
        other => Err(SemanticError::InvalidAdjustRule {
            reason: format!(
                "expected a rule mapping or a list of them, got {}",
                data::value_kind(other)
            ),
        }),
    }
}

fn parse_rule(rule: &Mapping) -> Result<AdjustRule, SemanticError> {
    let when = match data::get(rule, "when") {
        Some(Value::String(when)) => when.clone(),
        Some(other) => {
            return Err(SemanticError::InvalidAdjustRule {
                reason: format!("'when' must be a string, got {}", data::value_kind(other)),
            });
        }
        None => {
            return Err(SemanticError::InvalidAdjustRule {
                reason: "rule is missing the 'when' condition".to_string(),
            });
        }
    };
    let continue_ = match data::get(rule, "continue") {
        Some(Value::Bool(flag)) => *flag,
        Some(other) => {
            return Err(SemanticError::InvalidAdjustRule {
                reason: format!(
                    "'continue' must be a boolean, got {}",
                    data::value_kind(other)
                ),
            });
        }
        None => true,
    };
    let because = match data::get(rule, "because") {
        Some(Value::String(text)) => Some(text.clone()),
        _ => None,
    };
    let mut payload = Mapping::new();
    for (key, value) in rule {
        let reserved = key
            .as_str()
            .is_some_and(|name| RESERVED.contains(&name));
        if !reserved {
            payload.insert(key.clone(), value.clone());
        }
    }
    Ok(AdjustRule {
        when,
        continue_,
        because,
        payload,
    })
}

/// Apply a node's adjust rules against the context.
///
/// Rules run in declaration order; a firing rule merges its payload into
/// the node (merge markers honored) and `continue: false` stops further
/// processing. The `adjust` key is consumed. A malformed `when`
/// expression is fatal for the node.
pub fn adjust_node(
    node: &Mapping,
    context: &Context,
) -> CrucibleResult<(Mapping, Vec<Warning>)> {
    let mut warnings = Vec::new();
    let Some(adjust) = data::get(node, "adjust") else {
        return Ok((node.clone(), warnings));
    };
    let rules = parse_rules(adjust)?;

    let mut current = node.clone();
    current.remove(Value::String("adjust".to_string()));

    let mut stopped_at: Option<usize> = None;
    for (index, rule) in rules.iter().enumerate() {
        if let Some(stop) = stopped_at {
            warnings.push(Warning::new(
                None,
                format!(
                    "adjust rule #{index} ('{}') skipped: rule #{stop} stopped processing",
                    rule.when
                ),
            ));
            continue;
        }
        let expr = parse(&rule.when)?;
        if !evaluate(&expr, context)? {
            continue;
        }
        tracing::debug!(
            when = %rule.when,
            because = rule.because.as_deref().unwrap_or(""),
            "adjust rule fired"
        );
        current = data::merge_data(&rule.payload, &current)?;
        if !rule.continue_ {
            stopped_at = Some(index);
        }
    }

    Ok((current, warnings))
}
