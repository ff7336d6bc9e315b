//! Parsing hardware requirement documents into constraint trees

use crate::constraint::*;
use crate::quantity::Quantity;
use crucible_core::{data, CrucibleResult, SemanticError};
use once_cell::sync::Lazy;
use serde_yaml::Value;
use std::collections::HashMap;

/// Known leaf families and their kinds. Unknown families are accepted as
/// opaque constraints so newer metadata keeps parsing.
static LEAF_KINDS: Lazy<HashMap<&'static str, LeafKind>> = Lazy::new(|| {
    HashMap::from([
        ("arch", LeafKind::Text),
        ("memory", LeafKind::Size),
        ("hostname", LeafKind::Text),
        ("cpu.family", LeafKind::Count),
        ("cpu.model", LeafKind::Count),
        ("cpu.model-name", LeafKind::Text),
        ("cpu.cores", LeafKind::Count),
        ("cpu.threads", LeafKind::Count),
        ("cpu.stepping", LeafKind::Count),
        ("cpu.flag", LeafKind::Text),
        ("virtualization.is-virtualized", LeafKind::Flag),
        ("virtualization.hypervisor", LeafKind::Text),
        ("tpm.version", LeafKind::Version),
        ("disk.size", LeafKind::Size),
        ("disk.model-name", LeafKind::Text),
        ("network.type", LeafKind::Text),
        ("compatible.distro", LeafKind::Text),
        ("boot.method", LeafKind::Text),
    ])
});

/// Kind of a leaf family; `Unknown` for families outside the registry.
pub fn leaf_kind(path: &LeafPath) -> LeafKind {
    LEAF_KINDS
        .get(path.family().as_str())
        .copied()
        .unwrap_or(LeafKind::Unknown)
}

/// Parse a hardware requirement document.
///
/// The document is a mapping of leaf constraints, or a mapping with
/// exactly one `and:`/`or:` key holding a list of sub-documents. Mixing
/// the two shapes at one level is a hard error.
pub fn parse(document: &Value) -> CrucibleResult<ConstraintTree> {
    let Value::Mapping(mapping) = document else {
        return Err(SemanticError::InvalidConstraint {
            reason: format!("expected a mapping, got {}", data::value_kind(document)),
        }
        .into());
    };

    let has_operator = ["and", "or"]
        .iter()
        .any(|op| data::get(mapping, op).is_some());
    if has_operator {
        if mapping.len() != 1 {
            let operator = if data::get(mapping, "and").is_some() {
                "and"
            } else {
                "or"
            };
            return Err(SemanticError::MixedConstraintBlock {
                operator: operator.to_string(),
            }
            .into());
        }
        let (key, value) = mapping.iter().next().expect("mapping has one entry");
        let operator = key.as_str().unwrap_or_default();
        let Value::Sequence(items) = value else {
            return Err(SemanticError::InvalidConstraint {
                reason: format!("'{operator}' expects a list of sub-documents"),
            }
            .into());
        };
        let children: Vec<ConstraintTree> =
            items.iter().map(parse).collect::<CrucibleResult<_>>()?;
        return Ok(match operator {
            "and" => ConstraintTree::And(children),
            _ => ConstraintTree::Or(children),
        });
    }

    let mut leaves = Vec::new();
    for (key, value) in mapping {
        let Some(path_text) = key.as_str() else {
            return Err(SemanticError::InvalidConstraint {
                reason: "constraint keys must be strings".to_string(),
            }
            .into());
        };
        leaves.push(ConstraintTree::Leaf(parse_leaf(path_text, value)?));
    }
    Ok(match leaves.len() {
        1 => leaves.pop().expect("one leaf"),
        _ => ConstraintTree::And(leaves),
    })
}

/// Parse one `path: '[OP] RHS'` entry.
pub fn parse_leaf(path_text: &str, value: &Value) -> CrucibleResult<Constraint> {
    let path: LeafPath = path_text.parse()?;
    let kind = leaf_kind(&path);
    if kind == LeafKind::Unknown {
        tracing::warn!(path = path_text, "unknown hardware constraint, kept as opaque");
    }

    let text = match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => {
            return Err(SemanticError::InvalidConstraint {
                reason: format!(
                    "constraint '{path_text}' expects a string value, got {}",
                    data::value_kind(other)
                ),
            }
            .into());
        }
    };

    let (op, rhs) = split_operator(&text);
    if !kind.allows(op) {
        return Err(SemanticError::UnsupportedOperator {
            operator: op.as_str().to_string(),
            path: path_text.to_string(),
        }
        .into());
    }

    if matches!(op, Operator::Match | Operator::NotMatch) {
        // Validate the pattern here so satisfies() never has to guess.
        crucible_core::pattern::compile(rhs)?;
    }

    let value = match kind {
        LeafKind::Size | LeafKind::Count => LeafValue::Quantity(rhs.parse::<Quantity>()?),
        LeafKind::Flag => match rhs {
            "true" => LeafValue::Flag(true),
            "false" => LeafValue::Flag(false),
            other => {
                return Err(SemanticError::InvalidConstraint {
                    reason: format!("flag '{path_text}' expects true/false, got '{other}'"),
                }
                .into());
            }
        },
        LeafKind::Version => LeafValue::Version(rhs.to_string()),
        LeafKind::Text | LeafKind::Unknown => LeafValue::Text(rhs.to_string()),
    };

    Ok(Constraint {
        path,
        kind,
        op,
        value,
    })
}

/// Split `[OP] RHS`; the operator defaults to `=`. Whitespace around the
/// right-hand side is stripped.
fn split_operator(text: &str) -> (Operator, &str) {
    let text = text.trim();
    for (symbol, op) in [
        (">=", Operator::Ge),
        ("<=", Operator::Le),
        ("!=", Operator::Ne),
        ("!~", Operator::NotMatch),
        (">", Operator::Gt),
        ("<", Operator::Lt),
        ("=", Operator::Eq),
        ("~", Operator::Match),
    ] {
        if let Some(rest) = text.strip_prefix(symbol) {
            return (op, rest.trim());
        }
    }
    (Operator::Eq, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_core::CrucibleError;

    fn document(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_single_leaf() {
        let tree = parse(&document("memory: '>= 4 GB'")).unwrap();
        match tree {
            ConstraintTree::Leaf(leaf) => {
                assert_eq!(leaf.op, Operator::Ge);
                assert_eq!(leaf.kind, LeafKind::Size);
            }
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_default_operator_is_equality() {
        let tree = parse(&document("memory: '8 GB'")).unwrap();
        let ConstraintTree::Leaf(leaf) = tree else {
            panic!("expected leaf");
        };
        assert_eq!(leaf.op, Operator::Eq);
        assert_eq!(
            leaf.value,
            LeafValue::Quantity("8 GB".parse().unwrap())
        );
    }

    #[test]
    fn test_multiple_leaves_become_and() {
        let tree = parse(&document("memory: '8 GB'\narch: x86_64")).unwrap();
        assert!(matches!(tree, ConstraintTree::And(children) if children.len() == 2));
    }

    #[test]
    fn test_nested_composites() {
        let tree = parse(&document(
            "or:\n- memory: '>= 4 GB'\n- and:\n  - memory: '< 4 GB'\n  - cpu.cores: '>= 2'",
        ))
        .unwrap();
        let ConstraintTree::Or(children) = tree else {
            panic!("expected or");
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(children[1], ConstraintTree::And(_)));
    }

    #[test]
    fn test_mixed_block_rejected() {
        let err = parse(&document("and:\n- memory: '8 GB'\narch: x86_64")).unwrap_err();
        assert!(matches!(
            err,
            CrucibleError::Semantic(SemanticError::MixedConstraintBlock { .. })
        ));
    }

    #[test]
    fn test_unsupported_operator_rejected() {
        let err = parse(&document("memory: '~ 8 GB'")).unwrap_err();
        assert!(matches!(
            err,
            CrucibleError::Semantic(SemanticError::UnsupportedOperator { .. })
        ));
        let err = parse(&document("cpu.model-name: '>= AMD'")).unwrap_err();
        assert!(matches!(
            err,
            CrucibleError::Semantic(SemanticError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn test_unknown_leaf_accepted() {
        let tree = parse(&document("gpu.vendor: nvidia")).unwrap();
        let ConstraintTree::Leaf(leaf) = tree else {
            panic!("expected leaf");
        };
        assert_eq!(leaf.kind, LeafKind::Unknown);
    }

    #[test]
    fn test_flag_values() {
        let tree = parse(&document("virtualization.is-virtualized: 'true'")).unwrap();
        let ConstraintTree::Leaf(leaf) = tree else {
            panic!("expected leaf");
        };
        assert_eq!(leaf.value, LeafValue::Flag(true));
        assert!(parse(&document("virtualization.is-virtualized: maybe")).is_err());
    }

    #[test]
    fn test_indexed_disk_path() {
        let tree = parse(&document("disk[0].size: '>= 40 GB'")).unwrap();
        let ConstraintTree::Leaf(leaf) = tree else {
            panic!("expected leaf");
        };
        assert_eq!(leaf.kind, LeafKind::Size);
        assert_eq!(leaf.path.to_string(), "disk[0].size");
    }
}
