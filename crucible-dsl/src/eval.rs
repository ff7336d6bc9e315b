//! Evaluation of `when` expressions against a context

use crate::parser::{CompareOp, WhenExpr};
use crucible_core::{pattern, CompareOutcome, Context, DimensionValue, ExpressionError};
use std::cmp::Ordering;

/// Evaluate a parsed `when` expression against a context.
///
/// A dimension absent from the context makes every comparison over it
/// false; only `is not defined` observes the absence positively. A
/// dimension with multiple values matches when any value satisfies the
/// predicate.
pub fn evaluate(expr: &WhenExpr, context: &Context) -> Result<bool, ExpressionError> {
    match expr {
        WhenExpr::Not(inner) => Ok(!evaluate(inner, context)?),
        WhenExpr::And(terms) => {
            for term in terms {
                if !evaluate(term, context)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        WhenExpr::Or(terms) => {
            for term in terms {
                if evaluate(term, context)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        WhenExpr::Defined { dimension, negated } => {
            Ok(context.is_defined(dimension) != *negated)
        }
        WhenExpr::Comparison {
            dimension,
            op,
            literal,
        } => {
            let Some(values) = context.values(dimension) else {
                return Ok(false);
            };
            for value in values {
                if compare(value, *op, literal)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

/// Parse and evaluate in one step.
pub fn evaluate_str(source: &str, context: &Context) -> Result<bool, ExpressionError> {
    let expr = crate::parser::parse(source)?;
    evaluate(&expr, context)
}

fn compare(value: &DimensionValue, op: CompareOp, literal: &str) -> Result<bool, ExpressionError> {
    match op {
        CompareOp::Match => pattern::search(literal, value.as_str()),
        CompareOp::NotMatch => Ok(!pattern::search(literal, value.as_str())?),
        _ => {
            let rhs = DimensionValue::parse(literal);
            let outcome = value.compare(&rhs);
            Ok(match op {
                CompareOp::Eq => matches!(outcome, CompareOutcome::Ordered(Ordering::Equal)),
                CompareOp::Ne => !matches!(outcome, CompareOutcome::Ordered(Ordering::Equal)),
                CompareOp::Lt => matches!(outcome, CompareOutcome::Ordered(Ordering::Less)),
                CompareOp::Le => matches!(
                    outcome,
                    CompareOutcome::Ordered(Ordering::Less | Ordering::Equal)
                ),
                CompareOp::Gt => matches!(outcome, CompareOutcome::Ordered(Ordering::Greater)),
                CompareOp::Ge => matches!(
                    outcome,
                    CompareOutcome::Ordered(Ordering::Greater | Ordering::Equal)
                ),
                CompareOp::Match | CompareOp::NotMatch => unreachable!(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context {
        Context::from_pairs([
            ("distro", vec!["fedora-33"]),
            ("arch", vec!["x86_64", "aarch64"]),
        ])
    }

    fn eval(source: &str) -> bool {
        evaluate_str(source, &context()).unwrap()
    }

    #[test]
    fn test_version_comparison() {
        assert!(eval("distro < fedora-40"));
        assert!(eval("distro >= fedora-33"));
        assert!(!eval("distro > fedora-33"));
    }

    #[test]
    fn test_name_mismatch_never_orders() {
        assert!(!eval("distro < centos-9"));
        assert!(!eval("distro >= centos-9"));
        assert!(eval("distro != centos-9"));
    }

    #[test]
    fn test_multi_value_any_match() {
        assert!(eval("arch == aarch64"));
        assert!(eval("arch == x86_64"));
        assert!(!eval("arch == s390x"));
        // Any-match applies to != as well: some value differs.
        assert!(eval("arch != x86_64"));
    }

    #[test]
    fn test_undefined_dimension() {
        assert!(!eval("component == bash"));
        assert!(!eval("component != bash"));
        assert!(!eval("component ~ ba.h"));
        assert!(!eval("component !~ ba.h"));
        assert!(eval("component is not defined"));
        assert!(!eval("component is defined"));
        assert!(eval("distro is defined"));
    }

    #[test]
    fn test_regex_search_semantics() {
        assert!(eval("distro ~ fedora"));
        assert!(eval("distro ~ 'fedora-\\d+'"));
        assert!(!eval("distro ~ '^33'"));
        assert!(eval("distro !~ centos"));
    }

    #[test]
    fn test_boolean_composition() {
        assert!(eval("distro == fedora-33 and arch == x86_64"));
        assert!(eval("distro == centos-8 or arch == x86_64"));
        assert!(eval("not distro == centos-8"));
        assert!(eval("not (distro == centos-8 and arch == x86_64)"));
    }

    #[test]
    fn test_not_versus_negated_comparison() {
        // With 'component' undefined, `!=` is false but `not ==` is true.
        let context = Context::new();
        assert!(!evaluate_str("component != bash", &context).unwrap());
        assert!(evaluate_str("not component == bash", &context).unwrap());
    }

    #[test]
    fn test_invalid_pattern_raises() {
        assert!(evaluate_str("distro ~ 'fed(ora'", &context()).is_err());
    }
}
