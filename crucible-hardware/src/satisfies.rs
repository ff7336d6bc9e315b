//! Three-valued satisfies predicate over hardware descriptions

use crate::constraint::*;
use crate::quantity::Quantity;
use crucible_core::pattern;
use serde_yaml::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Three-valued verdict: missing facts yield `Unknown`, not a guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    Yes,
    No,
    Unknown,
}

/// Concrete hardware facts: dotted path → value.
///
/// The provisioner owns how this is gathered; the constraint language
/// only reads it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HardwareDescription {
    facts: BTreeMap<String, Value>,
}

impl HardwareDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: &str, value: Value) {
        self.facts.insert(path.to_string(), value);
    }

    pub fn get(&self, path: &LeafPath) -> Option<&Value> {
        self.facts.get(&path.to_string())
    }
}

impl<const N: usize> From<[(&str, Value); N]> for HardwareDescription {
    fn from(entries: [(&str, Value); N]) -> Self {
        let mut description = Self::new();
        for (path, value) in entries {
            description.set(path, value);
        }
        description
    }
}

/// Evaluate a constraint tree against a hardware description.
///
/// `and` is `No` if any child is `No`, else `Unknown` if any child is
/// `Unknown`, else `Yes`; `or` is the dual. A leaf over a missing or
/// unrecognized fact is `Unknown`.
pub fn satisfies(tree: &ConstraintTree, hardware: &HardwareDescription) -> Truth {
    match tree {
        ConstraintTree::Leaf(leaf) => satisfies_leaf(leaf, hardware),
        ConstraintTree::And(children) => {
            let mut verdict = Truth::Yes;
            for child in children {
                match satisfies(child, hardware) {
                    Truth::No => return Truth::No,
                    Truth::Unknown => verdict = Truth::Unknown,
                    Truth::Yes => {}
                }
            }
            verdict
        }
        ConstraintTree::Or(children) => {
            let mut verdict = Truth::No;
            for child in children {
                match satisfies(child, hardware) {
                    Truth::Yes => return Truth::Yes,
                    Truth::Unknown => verdict = Truth::Unknown,
                    Truth::No => {}
                }
            }
            verdict
        }
    }
}

fn satisfies_leaf(leaf: &Constraint, hardware: &HardwareDescription) -> Truth {
    if leaf.kind == LeafKind::Unknown {
        // Whether to drop or keep unknown leaves is the caller's policy;
        // the predicate itself cannot decide them.
        return Truth::Unknown;
    }
    let Some(fact) = hardware.get(&leaf.path) else {
        return Truth::Unknown;
    };
    match &leaf.value {
        LeafValue::Quantity(rhs) => {
            let Some(lhs) = fact_quantity(fact) else {
                return Truth::Unknown;
            };
            let Some(ordering) = lhs.partial_cmp(rhs) else {
                return Truth::Unknown;
            };
            verdict(ordering_matches(leaf.op, ordering))
        }
        LeafValue::Flag(rhs) => {
            let Some(lhs) = fact_flag(fact) else {
                return Truth::Unknown;
            };
            match leaf.op {
                Operator::Eq => verdict(lhs == *rhs),
                _ => verdict(lhs != *rhs),
            }
        }
        LeafValue::Text(rhs) => {
            let Some(lhs) = fact_text(fact) else {
                return Truth::Unknown;
            };
            match leaf.op {
                Operator::Eq => verdict(lhs == *rhs),
                Operator::Ne => verdict(lhs != *rhs),
                Operator::Match | Operator::NotMatch => match pattern::search(rhs, &lhs) {
                    Ok(found) => verdict(found == (leaf.op == Operator::Match)),
                    Err(_) => Truth::Unknown,
                },
                _ => Truth::Unknown,
            }
        }
        LeafValue::Version(rhs) => {
            let Some(lhs) = fact_text(fact) else {
                return Truth::Unknown;
            };
            let ordering = compare_versions(&lhs, rhs);
            verdict(ordering_matches(leaf.op, ordering))
        }
    }
}

fn verdict(holds: bool) -> Truth {
    if holds {
        Truth::Yes
    } else {
        Truth::No
    }
}

fn ordering_matches(op: Operator, ordering: Ordering) -> bool {
    match op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Le => ordering != Ordering::Greater,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Ge => ordering != Ordering::Less,
        Operator::Match | Operator::NotMatch => false,
    }
}

fn fact_quantity(fact: &Value) -> Option<Quantity> {
    match fact {
        Value::Number(number) => number.as_f64().map(Quantity::count),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

fn fact_flag(fact: &Value) -> Option<bool> {
    match fact {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => match text.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn fact_text(fact: &Value) -> Option<String> {
    match fact {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Segment-wise version comparison: numeric where both segments are
/// numbers, lexical otherwise; a shorter version sorts before its
/// extensions.
fn compare_versions(left: &str, right: &str) -> Ordering {
    let left_parts: Vec<&str> = left.split('.').collect();
    let right_parts: Vec<&str> = right.split('.').collect();
    for (l, r) in left_parts.iter().zip(right_parts.iter()) {
        let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => l.cmp(r),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    left_parts.len().cmp(&right_parts.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn tree(yaml: &str) -> ConstraintTree {
        parse(&serde_yaml::from_str(yaml).unwrap()).unwrap()
    }

    #[test]
    fn test_quantity_comparison() {
        let hardware = HardwareDescription::from([("memory", Value::Number(2_147_483_648u64.into()))]);
        assert_eq!(satisfies(&tree("memory: '< 4 GB'"), &hardware), Truth::Yes);
        assert_eq!(satisfies(&tree("memory: '>= 4 GB'"), &hardware), Truth::No);
        assert_eq!(satisfies(&tree("memory: '= 2 GiB'"), &hardware), Truth::Yes);
    }

    #[test]
    fn test_missing_fact_is_unknown() {
        let hardware = HardwareDescription::new();
        assert_eq!(
            satisfies(&tree("memory: '>= 4 GB'"), &hardware),
            Truth::Unknown
        );
    }

    #[test]
    fn test_or_with_exhaustive_branches() {
        let constraint = tree("or:\n- memory: '>= 4 GB'\n- memory: '< 4 GB'");
        let present = HardwareDescription::from([("memory", Value::Number(2_147_483_648u64.into()))]);
        assert_eq!(satisfies(&constraint, &present), Truth::Yes);
        assert_eq!(
            satisfies(&constraint, &HardwareDescription::new()),
            Truth::Unknown
        );
    }

    #[test]
    fn test_and_no_dominates_unknown() {
        let constraint = tree("and:\n- memory: '>= 4 GB'\n- cpu.cores: '>= 2'");
        let hardware = HardwareDescription::from([("memory", Value::String("2 GB".into()))]);
        assert_eq!(satisfies(&constraint, &hardware), Truth::No);
    }

    #[test]
    fn test_text_and_regex() {
        let hardware =
            HardwareDescription::from([("cpu.model-name", Value::String("AMD EPYC 7543".into()))]);
        assert_eq!(
            satisfies(&tree("cpu.model-name: '~ EPYC'"), &hardware),
            Truth::Yes
        );
        assert_eq!(
            satisfies(&tree("cpu.model-name: '!~ Xeon'"), &hardware),
            Truth::Yes
        );
        assert_eq!(
            satisfies(&tree("cpu.model-name: '= AMD EPYC 7543'"), &hardware),
            Truth::Yes
        );
    }

    #[test]
    fn test_version_comparison() {
        let hardware = HardwareDescription::from([("tpm.version", Value::String("2.0".into()))]);
        assert_eq!(
            satisfies(&tree("tpm.version: '>= 2.0'"), &hardware),
            Truth::Yes
        );
        assert_eq!(
            satisfies(&tree("tpm.version: '> 2.0'"), &hardware),
            Truth::No
        );
        assert_eq!(
            satisfies(&tree("tpm.version: '< 2.0.1'"), &hardware),
            Truth::Yes
        );
    }

    #[test]
    fn test_unknown_leaf_is_unknown() {
        let hardware = HardwareDescription::from([("gpu.vendor", Value::String("nvidia".into()))]);
        assert_eq!(
            satisfies(&tree("gpu.vendor: nvidia"), &hardware),
            Truth::Unknown
        );
    }

    #[test]
    fn test_empty_composites() {
        let hardware = HardwareDescription::new();
        assert_eq!(
            satisfies(&ConstraintTree::And(Vec::new()), &hardware),
            Truth::Yes
        );
        assert_eq!(
            satisfies(&ConstraintTree::Or(Vec::new()), &hardware),
            Truth::No
        );
    }

    #[test]
    fn test_flag() {
        let hardware =
            HardwareDescription::from([("virtualization.is-virtualized", Value::Bool(false))]);
        assert_eq!(
            satisfies(&tree("virtualization.is-virtualized: 'false'"), &hardware),
            Truth::Yes
        );
        assert_eq!(
            satisfies(&tree("virtualization.is-virtualized: '!= false'"), &hardware),
            Truth::No
        );
    }
}
