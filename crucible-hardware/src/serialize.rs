//! Canonical re-serialization of constraint trees
//!
//! The canonical text form writes every leaf as `path: 'OP RHS'` with an
//! explicit operator and a single-quoted value, and composites as an
//! `and:`/`or:` mapping over a block list. The writer is deterministic,
//! so canonical text is a fixed point of parse → serialize.

use crate::constraint::*;
use serde_yaml::{Mapping, Value};
use std::fmt::Write as _;

/// Render the canonical textual form.
pub fn to_canonical_string(tree: &ConstraintTree) -> String {
    let mut out = String::new();
    write_tree(tree, 0, &mut out);
    out
}

/// Emit the tree as structured data (leaf values keep the explicit
/// operator form).
pub fn to_value(tree: &ConstraintTree) -> Value {
    match tree {
        ConstraintTree::Leaf(leaf) => {
            let mut mapping = Mapping::new();
            mapping.insert(
                Value::String(leaf.path.to_string()),
                Value::String(leaf_text(leaf)),
            );
            Value::Mapping(mapping)
        }
        ConstraintTree::And(children) => composite_value("and", children),
        ConstraintTree::Or(children) => composite_value("or", children),
    }
}

fn composite_value(operator: &str, children: &[ConstraintTree]) -> Value {
    let mut mapping = Mapping::new();
    mapping.insert(
        Value::String(operator.to_string()),
        Value::Sequence(children.iter().map(to_value).collect()),
    );
    Value::Mapping(mapping)
}

fn leaf_text(leaf: &Constraint) -> String {
    format!("{} {}", leaf.op, leaf.value)
}

/// Single-quote a scalar the YAML way: double any embedded quote.
fn quoted(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn write_tree(tree: &ConstraintTree, indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    match tree {
        ConstraintTree::Leaf(leaf) => {
            let _ = writeln!(out, "{pad}{}: {}", leaf.path, quoted(&leaf_text(leaf)));
        }
        ConstraintTree::And(children) => {
            if children.is_empty() {
                let _ = writeln!(out, "{pad}and: []");
                return;
            }
            let _ = writeln!(out, "{pad}and:");
            for child in children {
                write_item(child, indent, out);
            }
        }
        ConstraintTree::Or(children) => {
            if children.is_empty() {
                let _ = writeln!(out, "{pad}or: []");
                return;
            }
            let _ = writeln!(out, "{pad}or:");
            for child in children {
                write_item(child, indent, out);
            }
        }
    }
}

fn write_item(tree: &ConstraintTree, indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    match tree {
        ConstraintTree::Leaf(leaf) => {
            let _ = writeln!(out, "{pad}- {}: {}", leaf.path, quoted(&leaf_text(leaf)));
        }
        ConstraintTree::And(children) => {
            if children.is_empty() {
                let _ = writeln!(out, "{pad}- and: []");
                return;
            }
            let _ = writeln!(out, "{pad}- and:");
            for child in children {
                write_item(child, indent + 2, out);
            }
        }
        ConstraintTree::Or(children) => {
            if children.is_empty() {
                let _ = writeln!(out, "{pad}- or: []");
                return;
            }
            let _ = writeln!(out, "{pad}- or:");
            for child in children {
                write_item(child, indent + 2, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn tree(yaml: &str) -> ConstraintTree {
        parse(&serde_yaml::from_str(yaml).unwrap()).unwrap()
    }

    #[test]
    fn test_leaf_gets_explicit_operator() {
        assert_eq!(
            to_canonical_string(&tree("memory: '8 GB'")),
            "memory: '= 8 GB'\n"
        );
    }

    #[test]
    fn test_composite_layout() {
        let text = to_canonical_string(&tree(
            "or:\n- memory: '>= 4 GB'\n- and:\n  - memory: '< 4 GB'\n  - cpu.cores: '>= 2'",
        ));
        assert_eq!(
            text,
            "or:\n- memory: '>= 4 GB'\n- and:\n  - memory: '< 4 GB'\n  - cpu.cores: '>= 2'\n"
        );
    }

    #[test]
    fn test_canonical_form_is_fixed_point() {
        let documents = [
            "memory: '8 GB'",
            "arch: x86_64",
            "and:\n- memory: '>= 4 GB'\n- disk[0].size: '>= 40 GB'",
            "or:\n- cpu.model-name: '~ EPYC'\n- virtualization.is-virtualized: 'false'",
        ];
        for document in documents {
            let first = to_canonical_string(&tree(document));
            let second = to_canonical_string(&tree(&first));
            assert_eq!(first, second, "round-trip diverged for {document}");
        }
    }

    #[test]
    fn test_to_value_round_trips_through_parse() {
        let original = tree("and:\n- memory: '>= 4 GB'\n- tpm.version: '>= 2.0'");
        let reparsed = parse(&to_value(&original)).unwrap();
        assert_eq!(original, reparsed);
    }
}
