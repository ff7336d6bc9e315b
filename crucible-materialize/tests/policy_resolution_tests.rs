//! Policy document resolution: paths, symbolic names, root containment

use crucible_core::{CrucibleError, ResolutionError};
use crucible_materialize::{Policy, PolicyLocation};
use std::fs;

const POLICY_TEXT: &str = "test-policy:\n- tag: '[managed]'\n";

#[test]
fn load_by_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.yaml");
    fs::write(&path, POLICY_TEXT).unwrap();

    let policy = Policy::load(&PolicyLocation::from_file(&path))
        .unwrap()
        .unwrap();
    assert_eq!(policy.rules.len(), 1);
}

#[test]
fn load_by_symbolic_name_under_root() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("ci")).unwrap();
    fs::write(dir.path().join("ci/checks.yaml"), POLICY_TEXT).unwrap();

    // Dotted name segments map to directories.
    let policy = Policy::load(&PolicyLocation::from_name("ci.checks", dir.path()))
        .unwrap()
        .unwrap();
    assert_eq!(policy.rules.len(), 1);
}

#[test]
fn name_without_root_is_rejected() {
    let location = PolicyLocation {
        name: Some("ci.checks".to_string()),
        ..Default::default()
    };
    let err = Policy::load(&location).unwrap_err();
    assert!(matches!(
        err,
        CrucibleError::Resolution(ResolutionError::RootRequired { .. })
    ));
}

#[test]
fn missing_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = Policy::load(&PolicyLocation::from_name("nope", dir.path())).unwrap_err();
    assert!(matches!(
        err,
        CrucibleError::Resolution(ResolutionError::NameNotFound { .. })
    ));
}

#[test]
fn file_outside_root_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    let path = elsewhere.path().join("policy.yaml");
    fs::write(&path, POLICY_TEXT).unwrap();

    let location = PolicyLocation {
        file: Some(path),
        root: Some(root.path().to_path_buf()),
        ..Default::default()
    };
    let err = Policy::load(&location).unwrap_err();
    assert!(matches!(
        err,
        CrucibleError::Resolution(ResolutionError::OutsideRoot { .. })
    ));
}

#[test]
fn name_escaping_the_root_is_rejected() {
    let outer = tempfile::tempdir().unwrap();
    let root = outer.path().join("policies");
    fs::create_dir(&root).unwrap();
    fs::write(outer.path().join("escape.yaml"), POLICY_TEXT).unwrap();

    let err = Policy::load(&PolicyLocation::from_name("...escape", &root)).unwrap_err();
    assert!(matches!(err, CrucibleError::Resolution(_)));
}

#[test]
fn unconfigured_location_loads_nothing() {
    assert_eq!(Policy::load(&PolicyLocation::default()).unwrap(), None);
}

#[test]
fn unparsable_policy_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    fs::write(&path, "test-policy: {not: [a, list").unwrap();
    let err = Policy::load(&PolicyLocation::from_file(&path)).unwrap_err();
    assert!(matches!(
        err,
        CrucibleError::Resolution(ResolutionError::Unparsable { .. })
    ));
}
