//! Template rendering over plain structured data

use super::ast::*;
use super::parser::parse;
use crate::parser::ParseError;
use crucible_core::pattern;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Instant;
use thiserror::Error;

/// Template failure: parse or render.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TemplateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Render(String),

    #[error("Rendering exceeded the time budget")]
    Timeout,
}

/// Root bindings visible to a template (`VALUE`, `VALUE_SOURCE`, `TEST`).
pub type Bindings = BTreeMap<String, Value>;

/// A parsed, reusable template.
///
/// Templates are pure: no I/O, no environment access, no side effects.
/// The only external input is the bindings map passed at render time.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            nodes: parse(source)?,
        })
    }

    /// Render with the given bindings. `deadline` is a cooperative time
    /// budget: rendering checks it between nodes and loop iterations and
    /// fails with [`TemplateError::Timeout`] once exceeded.
    pub fn render(
        &self,
        bindings: &Bindings,
        deadline: Option<Instant>,
    ) -> Result<String, TemplateError> {
        let mut out = String::new();
        let mut scope = Scope {
            bindings,
            locals: Vec::new(),
            deadline,
        };
        render_nodes(&self.nodes, &mut scope, &mut out)?;
        Ok(out)
    }
}

struct Scope<'a> {
    bindings: &'a Bindings,
    locals: Vec<(String, Value)>,
    deadline: Option<Instant>,
}

impl Scope<'_> {
    fn lookup(&self, name: &str) -> Result<Value, TemplateError> {
        for (local, value) in self.locals.iter().rev() {
            if local == name {
                return Ok(value.clone());
            }
        }
        self.bindings
            .get(name)
            .cloned()
            .ok_or_else(|| TemplateError::Render(format!("Undefined variable '{name}'")))
    }

    fn check_budget(&self) -> Result<(), TemplateError> {
        match self.deadline {
            Some(deadline) if Instant::now() > deadline => Err(TemplateError::Timeout),
            _ => Ok(()),
        }
    }
}

fn render_nodes(nodes: &[Node], scope: &mut Scope, out: &mut String) -> Result<(), TemplateError> {
    for node in nodes {
        scope.check_budget()?;
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Output(expr) => {
                let value = eval(expr, scope)?;
                let _ = write!(out, "{}", stringify(&value));
            }
            Node::If { arms, else_body } => {
                let mut taken = false;
                for (condition, body) in arms {
                    if truthy(&eval(condition, scope)?) {
                        render_nodes(body, scope, out)?;
                        taken = true;
                        break;
                    }
                }
                if !taken {
                    render_nodes(else_body, scope, out)?;
                }
            }
            Node::For {
                var,
                iterable,
                body,
            } => {
                let items = iterate(&eval(iterable, scope)?)?;
                for item in items {
                    scope.check_budget()?;
                    scope.locals.push((var.clone(), item));
                    let result = render_nodes(body, scope, out);
                    scope.locals.pop();
                    result?;
                }
            }
        }
    }
    Ok(())
}

fn iterate(value: &Value) -> Result<Vec<Value>, TemplateError> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => Ok(map.keys().cloned().map(Value::String).collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(TemplateError::Render(format!(
            "Cannot iterate over {}",
            kind(other)
        ))),
    }
}

fn eval(expr: &Expr, scope: &Scope) -> Result<Value, TemplateError> {
    match expr {
        Expr::Str(text) => Ok(Value::String(text.clone())),
        Expr::Int(number) => Ok(Value::Number((*number).into())),
        Expr::Bool(flag) => Ok(Value::Bool(*flag)),
        Expr::Var(name) => scope.lookup(name),
        Expr::Attr(inner, name) => {
            let value = eval(inner, scope)?;
            Ok(match value {
                Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            })
        }
        Expr::Index(inner, index) => {
            let value = eval(inner, scope)?;
            Ok(match value {
                Value::Array(items) => {
                    let i = normalize_index(*index, items.len());
                    i.and_then(|i| items.get(i)).cloned().unwrap_or(Value::Null)
                }
                _ => Value::Null,
            })
        }
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, scope)?))),
        Expr::And(left, right) => {
            let left = eval(left, scope)?;
            if !truthy(&left) {
                return Ok(left);
            }
            eval(right, scope)
        }
        Expr::Or(left, right) => {
            let left = eval(left, scope)?;
            if truthy(&left) {
                return Ok(left);
            }
            eval(right, scope)
        }
        Expr::Eq(left, right) => Ok(Value::Bool(eval(left, scope)? == eval(right, scope)?)),
        Expr::Ne(left, right) => Ok(Value::Bool(eval(left, scope)? != eval(right, scope)?)),
        Expr::In {
            needle,
            haystack,
            negated,
        } => {
            let needle = eval(needle, scope)?;
            let haystack = eval(haystack, scope)?;
            let contains = match &haystack {
                Value::Array(items) => items.contains(&needle),
                Value::String(text) => match &needle {
                    Value::String(sub) => text.contains(sub.as_str()),
                    _ => false,
                },
                Value::Object(map) => match &needle {
                    Value::String(key) => map.contains_key(key),
                    _ => false,
                },
                _ => {
                    return Err(TemplateError::Render(format!(
                        "Cannot test membership in {}",
                        kind(&haystack)
                    )));
                }
            };
            Ok(Value::Bool(contains != *negated))
        }
        Expr::Filter { input, name, args } => {
            let input = eval(input, scope)?;
            let args: Vec<(Option<String>, Value)> = args
                .iter()
                .map(|arg| Ok((arg.name.clone(), eval(&arg.value, scope)?)))
                .collect::<Result<_, TemplateError>>()?;
            apply_filter(name, input, &args)
        }
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    if index >= 0 {
        Some(index as usize)
    } else {
        len.checked_sub(index.unsigned_abs() as usize)
    }
}

// ============================================================================
// FILTERS
// ============================================================================

fn apply_filter(
    name: &str,
    input: Value,
    args: &[(Option<String>, Value)],
) -> Result<Value, TemplateError> {
    match name {
        "default" => {
            let fallback = positional(args, 0)
                .ok_or_else(|| render_error("'default' needs a fallback argument"))?;
            Ok(if input == Value::Null {
                fallback.clone()
            } else {
                input
            })
        }
        "lower" => Ok(Value::String(as_text(&input).to_lowercase())),
        "upper" => Ok(Value::String(as_text(&input).to_uppercase())),
        "match" => {
            let pattern = positional(args, 0)
                .ok_or_else(|| render_error("'match' needs a pattern argument"))?;
            let found = pattern::search(&as_text(pattern), &as_text(&input))
                .map_err(|err| TemplateError::Render(err.to_string()))?;
            Ok(Value::Bool(found))
        }
        "map" => {
            let attribute = keyword(args, "attribute")
                .ok_or_else(|| render_error("'map' needs an attribute= argument"))?;
            let key = as_text(attribute);
            let items = match input {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => {
                    return Err(render_error(&format!("Cannot map over {}", kind(&other))));
                }
            };
            Ok(Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Value::Object(map) => map.get(&key).cloned().unwrap_or(Value::Null),
                        _ => Value::Null,
                    })
                    .collect(),
            ))
        }
        "enumerate" => {
            let items = match input {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => {
                    return Err(render_error(&format!(
                        "Cannot enumerate {}",
                        kind(&other)
                    )));
                }
            };
            Ok(Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| Value::Array(vec![Value::Number(i.into()), item]))
                    .collect(),
            ))
        }
        "join" => {
            let separator = positional(args, 0).map(as_text).unwrap_or_default();
            let items = match input {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => {
                    return Err(render_error(&format!("Cannot join {}", kind(&other))));
                }
            };
            let parts: Vec<String> = items.iter().map(stringify).collect();
            Ok(Value::String(parts.join(&separator)))
        }
        "length" => {
            let length = match &input {
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::String(text) => text.chars().count(),
                other => {
                    return Err(render_error(&format!(
                        "Cannot take the length of {}",
                        kind(other)
                    )));
                }
            };
            Ok(Value::Number(length.into()))
        }
        "first" => Ok(match input {
            Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
            _ => Value::Null,
        }),
        "last" => Ok(match input {
            Value::Array(items) => items.into_iter().next_back().unwrap_or(Value::Null),
            _ => Value::Null,
        }),
        other => Err(render_error(&format!("Unknown filter '{other}'"))),
    }
}

fn positional<'a>(args: &'a [(Option<String>, Value)], index: usize) -> Option<&'a Value> {
    args.iter()
        .filter(|(name, _)| name.is_none())
        .nth(index)
        .map(|(_, value)| value)
}

fn keyword<'a>(args: &'a [(Option<String>, Value)], name: &str) -> Option<&'a Value> {
    args.iter()
        .find(|(arg, _)| arg.as_deref() == Some(name))
        .map(|(_, value)| value)
}

fn render_error(message: &str) -> TemplateError {
    TemplateError::Render(message.to_string())
}

// ============================================================================
// VALUE HELPERS
// ============================================================================

/// Text form used when a value lands in the output. Compound values emit
/// JSON, which re-parses cleanly as YAML.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        compound => serde_json::to_string(compound).unwrap_or_default(),
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => stringify(other),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
