//! Constraint tree simplification

use crate::constraint::ConstraintTree;

/// Flatten trivially-nested boolean nodes.
///
/// Same-operator nesting flattens (`and` inside `and`), and a composite
/// with a single child reduces to that child. Empty composites are kept:
/// an empty `and` is trivially satisfied, an empty `or` unsatisfiable,
/// and the satisfies predicate gives them exactly those meanings.
pub fn simplify(tree: &ConstraintTree) -> ConstraintTree {
    match tree {
        ConstraintTree::Leaf(leaf) => ConstraintTree::Leaf(leaf.clone()),
        ConstraintTree::And(children) => rebuild(children, true),
        ConstraintTree::Or(children) => rebuild(children, false),
    }
}

fn rebuild(children: &[ConstraintTree], conjunction: bool) -> ConstraintTree {
    let mut flat = Vec::new();
    for child in children {
        let child = simplify(child);
        match child {
            ConstraintTree::And(grandchildren) if conjunction => flat.extend(grandchildren),
            ConstraintTree::Or(grandchildren) if !conjunction => flat.extend(grandchildren),
            other => flat.push(other),
        }
    }
    if flat.len() == 1 {
        return flat.pop().expect("single child");
    }
    if conjunction {
        ConstraintTree::And(flat)
    } else {
        ConstraintTree::Or(flat)
    }
}
