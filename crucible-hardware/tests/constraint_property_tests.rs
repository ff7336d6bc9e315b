//! Property-Based Tests for the Hardware Constraint Language
//!
//! Property: canonical text is a fixed point of parse → serialize, and
//! simplification never changes what a constraint tree means under the
//! three-valued satisfies predicate.

use crucible_hardware::{
    parse, parse_leaf, satisfies, simplify, to_canonical_string, ConstraintTree,
    HardwareDescription,
};
use proptest::collection::vec;
use proptest::prelude::*;
use serde_yaml::Value;

// ============================================================================
// GENERATORS
// ============================================================================

fn leaf(path: &str, text: String) -> ConstraintTree {
    ConstraintTree::Leaf(parse_leaf(path, &Value::String(text)).expect("valid leaf"))
}

fn arb_size_leaf() -> impl Strategy<Value = ConstraintTree> {
    (
        prop_oneof![Just("memory"), Just("disk[0].size")],
        prop_oneof![
            Just("="),
            Just("!="),
            Just("<"),
            Just("<="),
            Just(">"),
            Just(">=")
        ],
        1u64..1024,
        prop_oneof![Just("B"), Just("MB"), Just("GB"), Just("MiB"), Just("GiB")],
    )
        .prop_map(|(path, op, magnitude, unit)| leaf(path, format!("{op} {magnitude} {unit}")))
}

fn arb_count_leaf() -> impl Strategy<Value = ConstraintTree> {
    (
        prop_oneof![Just("="), Just("<"), Just(">="),],
        1u64..64,
    )
        .prop_map(|(op, count)| leaf("cpu.cores", format!("{op} {count}")))
}

fn arb_flag_leaf() -> impl Strategy<Value = ConstraintTree> {
    (prop_oneof![Just("="), Just("!=")], any::<bool>())
        .prop_map(|(op, flag)| leaf("virtualization.is-virtualized", format!("{op} {flag}")))
}

fn arb_text_leaf() -> impl Strategy<Value = ConstraintTree> {
    (
        prop_oneof![Just("arch"), Just("cpu.model-name"), Just("hostname")],
        prop_oneof![Just("="), Just("!="), Just("~"), Just("!~")],
        "[a-z][a-z0-9_]{0,11}",
    )
        .prop_map(|(path, op, word)| leaf(path, format!("{op} {word}")))
}

fn arb_version_leaf() -> impl Strategy<Value = ConstraintTree> {
    (
        prop_oneof![Just("="), Just("<"), Just(">="),],
        1u64..4,
        0u64..10,
    )
        .prop_map(|(op, major, minor)| leaf("tpm.version", format!("{op} {major}.{minor}")))
}

fn arb_leaf() -> impl Strategy<Value = ConstraintTree> {
    prop_oneof![
        arb_size_leaf(),
        arb_count_leaf(),
        arb_flag_leaf(),
        arb_text_leaf(),
        arb_version_leaf(),
    ]
}

fn arb_tree() -> impl Strategy<Value = ConstraintTree> {
    arb_leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            vec(inner.clone(), 0..4).prop_map(ConstraintTree::And),
            vec(inner, 0..4).prop_map(ConstraintTree::Or),
        ]
    })
}

fn arb_hardware() -> impl Strategy<Value = HardwareDescription> {
    (
        proptest::option::of(1u64..(16 << 30)),
        proptest::option::of(1u64..64),
        proptest::option::of(any::<bool>()),
        proptest::option::of("[a-z][a-z0-9_]{0,11}"),
        proptest::option::of((1u64..4, 0u64..10)),
        proptest::option::of(1u64..(4 << 40)),
    )
        .prop_map(|(memory, cores, virtualized, arch, tpm, disk)| {
            let mut hardware = HardwareDescription::new();
            if let Some(memory) = memory {
                hardware.set("memory", Value::Number(memory.into()));
            }
            if let Some(cores) = cores {
                hardware.set("cpu.cores", Value::Number(cores.into()));
            }
            if let Some(virtualized) = virtualized {
                hardware.set("virtualization.is-virtualized", Value::Bool(virtualized));
            }
            if let Some(arch) = arch {
                hardware.set("arch", Value::String(arch.clone()));
                hardware.set("cpu.model-name", Value::String(arch.clone()));
                hardware.set("hostname", Value::String(arch));
            }
            if let Some((major, minor)) = tpm {
                hardware.set("tpm.version", Value::String(format!("{major}.{minor}")));
            }
            if let Some(disk) = disk {
                hardware.set("disk[0].size", Value::Number(disk.into()));
            }
            hardware
        })
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn canonical_form_is_a_fixed_point(tree in arb_tree()) {
        let first = to_canonical_string(&tree);
        let document: Value = serde_yaml::from_str(&first).expect("canonical text is YAML");
        let reparsed = parse(&document).expect("canonical text parses");
        let second = to_canonical_string(&reparsed);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn simplification_preserves_satisfies(
        tree in arb_tree(),
        hardware in arb_hardware(),
    ) {
        let simplified = simplify(&tree);
        prop_assert_eq!(
            satisfies(&simplified, &hardware),
            satisfies(&tree, &hardware)
        );
    }

    #[test]
    fn simplification_is_idempotent(tree in arb_tree()) {
        let once = simplify(&tree);
        let twice = simplify(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn reparse_preserves_satisfies(
        tree in arb_tree(),
        hardware in arb_hardware(),
    ) {
        let document: Value =
            serde_yaml::from_str(&to_canonical_string(&tree)).expect("canonical text is YAML");
        let reparsed = parse(&document).expect("canonical text parses");
        prop_assert_eq!(
            satisfies(&reparsed, &hardware),
            satisfies(&tree, &hardware)
        );
    }
}
