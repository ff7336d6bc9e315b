//! Property-Based Tests for the `when` Expression Language
//!
//! Property: printing a parsed expression and parsing it again SHALL
//! produce the same AST, and evaluation SHALL be a pure function of
//! (expression, context).

use crucible_core::Context;
use crucible_dsl::{evaluate, parse, CompareOp, WhenExpr};
use proptest::collection::vec;
use proptest::prelude::*;

// ============================================================================
// GENERATORS
// ============================================================================

fn arb_dimension() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("distro".to_string()),
        Just("arch".to_string()),
        Just("component".to_string()),
        Just("trigger".to_string()),
    ]
}

fn arb_literal() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("fedora-33".to_string()),
        Just("fedora-40".to_string()),
        Just("centos-stream-9".to_string()),
        Just("x86_64".to_string()),
        Just("bash".to_string()),
    ]
}

fn arb_op() -> impl Strategy<Value = CompareOp> {
    prop_oneof![
        Just(CompareOp::Eq),
        Just(CompareOp::Ne),
        Just(CompareOp::Lt),
        Just(CompareOp::Le),
        Just(CompareOp::Gt),
        Just(CompareOp::Ge),
        Just(CompareOp::Match),
        Just(CompareOp::NotMatch),
    ]
}

fn arb_primary() -> impl Strategy<Value = WhenExpr> {
    prop_oneof![
        (arb_dimension(), arb_op(), arb_literal()).prop_map(|(dimension, op, literal)| {
            WhenExpr::Comparison {
                dimension,
                op,
                literal,
            }
        }),
        (arb_dimension(), any::<bool>()).prop_map(|(dimension, negated)| WhenExpr::Defined {
            dimension,
            negated,
        }),
    ]
}

fn arb_expr() -> impl Strategy<Value = WhenExpr> {
    arb_primary().prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| WhenExpr::Not(Box::new(e))),
            vec(inner.clone(), 2..4).prop_map(WhenExpr::And),
            vec(inner, 2..4).prop_map(WhenExpr::Or),
        ]
    })
}

fn arb_context() -> impl Strategy<Value = Context> {
    (
        proptest::option::of(prop_oneof![
            Just("fedora-32"),
            Just("fedora-40"),
            Just("centos-stream-9"),
        ]),
        proptest::option::of(vec(
            prop_oneof![Just("x86_64"), Just("aarch64"), Just("s390x")],
            1..3,
        )),
    )
        .prop_map(|(distro, arch)| {
            let mut context = Context::new();
            if let Some(distro) = distro {
                context.add("distro", distro);
            }
            for value in arch.unwrap_or_default() {
                context.add("arch", value);
            }
            context
        })
}

/// Print an expression in the surface syntax, fully parenthesized.
fn print(expr: &WhenExpr) -> String {
    match expr {
        WhenExpr::Comparison {
            dimension,
            op,
            literal,
        } => format!("{dimension} {op} '{literal}'"),
        WhenExpr::Defined { dimension, negated } => {
            if *negated {
                format!("{dimension} is not defined")
            } else {
                format!("{dimension} is defined")
            }
        }
        WhenExpr::Not(inner) => format!("not ({})", print(inner)),
        WhenExpr::And(terms) => {
            let parts: Vec<String> = terms.iter().map(|t| format!("({})", print(t))).collect();
            parts.join(" and ")
        }
        WhenExpr::Or(terms) => {
            let parts: Vec<String> = terms.iter().map(|t| format!("({})", print(t))).collect();
            parts.join(" or ")
        }
    }
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn print_then_parse_is_identity(expr in arb_expr()) {
        let printed = print(&expr);
        let reparsed = parse(&printed).expect("printed expression parses");
        prop_assert_eq!(reparsed, expr);
    }

    #[test]
    fn evaluation_is_deterministic(expr in arb_expr(), context in arb_context()) {
        let first = evaluate(&expr, &context);
        let second = evaluate(&expr, &context);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn not_flips_the_verdict(expr in arb_expr(), context in arb_context()) {
        let plain = evaluate(&expr, &context).expect("valid expression");
        let negated = evaluate(&WhenExpr::Not(Box::new(expr)), &context)
            .expect("valid expression");
        prop_assert_eq!(negated, !plain);
    }
}
