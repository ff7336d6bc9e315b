//! Crucible Materialize - The Metadata Pipeline
//!
//! Turns raw metadata nodes into frozen, typed objects: context-driven
//! adjustment, schema normalization, policy rewriting, and finally result
//! merging once tests have run. Each test materializes in isolation; one
//! bad test never takes its siblings down.

pub mod adjust;
pub mod config;
pub mod merge;
pub mod normalize;
pub mod policy;

use crucible_core::{data, Context, CrucibleError, CrucibleResult, Plan, Test, Tree, Warning};
use serde_yaml::{Mapping, Value};
use std::time::{Duration, Instant};

pub use adjust::{adjust_node, AdjustRule};
pub use config::{plugin_option_overrides, PolicyLocation};
pub use merge::{
    escalate_check_failures, interpret_outcome, merge_test_results, RunObservation,
};
pub use normalize::{normalize_test, KeyOverrides};
pub use policy::{Policy, PolicyRule};

/// Knobs for a materialization run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializeOptions {
    /// CLI / environment key overrides layered over node data.
    pub overrides: KeyOverrides,
    /// Cooperative time budget for template rendering, per test.
    pub render_budget: Option<Duration>,
}

/// A failure scoped to one test; siblings keep materializing.
#[derive(Debug, Clone, PartialEq)]
pub struct TestFailure {
    pub name: String,
    pub error: CrucibleError,
}

/// Outcome of materializing a whole tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializedRun {
    pub tests: Vec<Test>,
    pub failures: Vec<TestFailure>,
    pub warnings: Vec<Warning>,
}

/// Materialize a single raw node into a frozen test.
pub fn materialize_node(
    name: &str,
    node: &Mapping,
    context: &Context,
    policy: Option<&Policy>,
    options: &MaterializeOptions,
) -> CrucibleResult<(Test, Vec<Warning>)> {
    let (adjusted, warnings) = adjust_node(node, context)?;
    let mut test = normalize_test(name, &adjusted, &options.overrides)?;
    if let Some(policy) = policy {
        let deadline = options.render_budget.map(|budget| Instant::now() + budget);
        policy.apply(&mut test, deadline)?;
    }
    Ok((test, warnings))
}

/// Materialize every test in a tree.
///
/// Test nodes are the leaves carrying a `test` key. Per-test failures are
/// collected, not propagated; warnings are both returned and logged.
pub fn materialize_tree(
    tree: &Tree,
    context: &Context,
    policy: Option<&Policy>,
    options: &MaterializeOptions,
) -> MaterializedRun {
    let mut run = MaterializedRun::default();
    for (name, node) in tree.leaves() {
        if data::get(node, "test").is_none() {
            continue;
        }
        match materialize_node(name, node, context, policy, options) {
            Ok((test, warnings)) => {
                run.tests.push(test);
                run.warnings.extend(warnings);
            }
            Err(error) => {
                tracing::warn!(test = name, %error, "failed to materialize");
                run.failures.push(TestFailure {
                    name: name.to_string(),
                    error,
                });
            }
        }
    }
    for warning in &run.warnings {
        tracing::warn!("{warning}");
    }
    run
}

/// Materialize a plan node: adjustment, then the plan-level slices the
/// core owns (environment, context pins, hardware requirements).
///
/// The hardware document is validated here so a broken constraint
/// surfaces at materialization time, but the plan keeps the raw document;
/// provisioning decides what to do with it.
pub fn materialize_plan(
    name: &str,
    node: &Mapping,
    context: &Context,
) -> CrucibleResult<(Plan, Vec<Warning>)> {
    let (adjusted, warnings) = adjust_node(node, context)?;
    let mut plan = Plan::new(name)?;

    for (key, value) in &adjusted {
        let Some(key) = key.as_str() else { continue };
        match key {
            "environment" => {
                if let Value::Mapping(mapping) = value {
                    for (name, item) in mapping {
                        if let (Some(name), Some(text)) = (name.as_str(), scalar_text(item)) {
                            plan.environment.insert(name.to_string(), text);
                        }
                    }
                }
            }
            "context" => {
                if let Value::Mapping(mapping) = value {
                    for (dimension, values) in mapping {
                        let Some(dimension) = dimension.as_str() else {
                            continue;
                        };
                        for item in data::to_list(values) {
                            if let Some(text) = scalar_text(&item) {
                                plan.context.add(dimension, &text);
                            }
                        }
                    }
                }
            }
            "provision" => {
                if let Value::Mapping(provision) = value {
                    if let Some(hardware) = data::get(provision, "hardware") {
                        crucible_hardware::parse(hardware)?;
                        plan.hardware = Some(hardware.clone());
                    }
                }
                plan.extra
                    .insert(Value::String(key.to_string()), value.clone());
            }
            other => {
                plan.extra
                    .insert(Value::String(other.to_string()), value.clone());
            }
        }
    }

    Ok((plan, warnings))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn fedora32() -> Context {
        Context::from_pairs([("distro", vec!["fedora-32"])])
    }

    #[test]
    fn test_pipeline_adjust_then_normalize() {
        let node = mapping(
            "test: ./run.sh\nenabled: true\nadjust:\n- when: distro < fedora-33\n  enabled: false\n  because: too old",
        );
        let (test, _) = materialize_node(
            "/old",
            &node,
            &fedora32(),
            None,
            &MaterializeOptions::default(),
        )
        .unwrap();
        assert!(!test.enabled);
        assert_eq!(test.test.as_deref(), Some("./run.sh"));
    }

    #[test]
    fn test_tree_failures_do_not_cascade() {
        let tree = Tree::from_nodes([
            ("/good".to_string(), mapping("test: ./good.sh")),
            ("/bad".to_string(), mapping("test: ./bad.sh\nenabled: '1'")),
        ])
        .unwrap();
        let run = materialize_tree(
            &tree,
            &fedora32(),
            None,
            &MaterializeOptions::default(),
        );
        assert_eq!(run.tests.len(), 1);
        assert_eq!(run.tests[0].name, "/good");
        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].name, "/bad");
    }

    #[test]
    fn test_non_test_nodes_skipped() {
        let tree = Tree::from_nodes([
            ("/docs".to_string(), mapping("summary: not a test")),
            ("/real".to_string(), mapping("test: ./run.sh")),
        ])
        .unwrap();
        let run = materialize_tree(
            &tree,
            &fedora32(),
            None,
            &MaterializeOptions::default(),
        );
        assert_eq!(run.tests.len(), 1);
    }

    #[test]
    fn test_plan_materialization() {
        let node = mapping(
            "environment:\n  STAGE: prod\ncontext:\n  component: bash\nprovision:\n  how: virtual\n  hardware:\n    memory: '>= 4 GB'",
        );
        let (plan, _) = materialize_plan("/plans/ci", &node, &fedora32()).unwrap();
        assert_eq!(plan.environment["STAGE"], "prod");
        assert!(plan.context.is_defined("component"));
        assert!(plan.hardware.is_some());
    }

    #[test]
    fn test_plan_with_broken_hardware_fails() {
        let node = mapping("provision:\n  hardware:\n    memory: '~ fast'");
        assert!(materialize_plan("/plans/ci", &node, &fedora32()).is_err());
    }
}
