//! Merging per-test custom results into the plan's results document

use chrono::{DateTime, FixedOffset};
use crucible_core::{
    format_duration, FmfId, GuestIdentity, Outcome, ResultError, ResultInterpretation,
    ResultRecord, Test,
};
use std::path::{Component, Path, PathBuf};

/// What the runner observed while executing one test.
#[derive(Debug, Clone, PartialEq)]
pub struct RunObservation {
    pub outcome: Outcome,
    pub start_time: Option<DateTime<FixedOffset>>,
    pub end_time: Option<DateTime<FixedOffset>>,
    /// Wall-clock duration in seconds.
    pub duration: Option<u64>,
    pub serial_number: u64,
    pub guest: Option<GuestIdentity>,
    pub fmf_id: Option<FmfId>,
}

/// Apply the test's outcome-interpretation policy to a raw outcome.
pub fn interpret_outcome(outcome: Outcome, interpretation: ResultInterpretation) -> Outcome {
    match interpretation {
        ResultInterpretation::Respect => outcome,
        ResultInterpretation::Xfail => match outcome {
            Outcome::Pass => Outcome::Fail,
            Outcome::Fail => Outcome::Pass,
            other => other,
        },
        ResultInterpretation::Pass => Outcome::Pass,
        ResultInterpretation::Fail => Outcome::Fail,
        ResultInterpretation::Info => Outcome::Info,
    }
}

/// Escalate per-check failures into the test-level outcome.
///
/// A failing check fails the test even when the test command itself
/// passed; this also makes check failures visible to `exit-first`
/// execution, which only watches test-level outcomes.
pub fn escalate_check_failures(record: &mut ResultRecord) {
    let outcomes = std::iter::once(record.result)
        .chain(record.check.iter().map(|check| check.result));
    if let Some(worst) = Outcome::reduce(outcomes) {
        record.result = worst;
    }
}

/// Merge one test's results into final records.
///
/// Without a custom file a single record is synthesized from the runner
/// observation. With one, every entry contributes a record: `name: /`
/// stands for the test itself, any other name is prefixed with the
/// test's name. Identity fields always come from the runner; the parent
/// entry's timing does too, while sub-entries keep their own. Log paths
/// are resolved against `data_dir` and re-expressed relative to
/// `results_dir`.
pub fn merge_test_results(
    test: &Test,
    observation: &RunObservation,
    custom: Option<Vec<ResultRecord>>,
    data_dir: &Path,
    results_dir: &Path,
) -> Result<Vec<ResultRecord>, ResultError> {
    let Some(entries) = custom else {
        let mut record = ResultRecord::new(
            &test.name,
            interpret_outcome(observation.outcome, test.result),
        );
        overwrite_identity(&mut record, observation);
        overwrite_timing(&mut record, observation);
        return Ok(vec![record]);
    };

    if entries.is_empty() {
        return Err(ResultError::Malformed {
            path: data_dir.display().to_string(),
            reason: "custom results file contains no entries".to_string(),
        });
    }

    let mut records = Vec::new();
    for mut record in entries {
        if !record.name.starts_with('/') {
            return Err(ResultError::Malformed {
                path: data_dir.display().to_string(),
                reason: format!("result name '{}' must start with '/'", record.name),
            });
        }
        let is_parent = record.name == "/";
        record.name = if is_parent {
            test.name.clone()
        } else {
            format!("{}{}", test.name, record.name.trim_end_matches('/'))
        };
        overwrite_identity(&mut record, observation);
        if is_parent {
            overwrite_timing(&mut record, observation);
        }
        record.log = record
            .log
            .iter()
            .map(|log| rewrite_log_path(log, data_dir, results_dir))
            .collect();
        records.push(record);
    }
    Ok(records)
}

fn overwrite_identity(record: &mut ResultRecord, observation: &RunObservation) {
    record.serial_number = Some(observation.serial_number);
    record.guest = observation.guest.clone();
    record.fmf_id = observation.fmf_id.clone();
}

fn overwrite_timing(record: &mut ResultRecord, observation: &RunObservation) {
    record.start_time = observation.start_time;
    record.end_time = observation.end_time;
    record.duration = observation.duration.map(format_duration);
}

/// Resolve a log path against the test data directory, then express it
/// relative to the results-file directory. Purely lexical; no filesystem
/// access.
fn rewrite_log_path(log: &str, data_dir: &Path, results_dir: &Path) -> String {
    let absolute = data_dir.join(log);
    relative_to(&absolute, results_dir)
        .unwrap_or(absolute)
        .display()
        .to_string()
}

fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    let mut path_parts = path.components().peekable();
    let mut base_parts = base.components().peekable();
    while let (Some(a), Some(b)) = (path_parts.peek(), base_parts.peek()) {
        if a != b {
            break;
        }
        path_parts.next();
        base_parts.next();
    }
    let mut relative = PathBuf::new();
    for part in base_parts {
        match part {
            Component::Normal(_) => relative.push(".."),
            Component::CurDir => {}
            _ => return None,
        }
    }
    relative.extend(path_parts);
    Some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_core::parse_hms;

    fn test_object() -> Test {
        Test::new("/t").unwrap()
    }

    fn observation() -> RunObservation {
        RunObservation {
            outcome: Outcome::Pass,
            start_time: "2026-08-01T10:00:00+00:00".parse().ok(),
            end_time: "2026-08-01T10:00:30+00:00".parse().ok(),
            duration: Some(30),
            serial_number: 7,
            guest: Some(GuestIdentity {
                name: Some("default-0".to_string()),
                role: None,
            }),
            fmf_id: None,
        }
    }

    fn record(yaml: &str) -> Vec<ResultRecord> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_synthesized_without_custom_file() {
        let records = merge_test_results(
            &test_object(),
            &observation(),
            None,
            Path::new("/run/plan/execute/data/t"),
            Path::new("/run/plan/execute"),
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "/t");
        assert_eq!(records[0].result, Outcome::Pass);
        assert_eq!(records[0].duration.as_deref(), Some("00:00:30"));
        assert_eq!(records[0].serial_number, Some(7));
    }

    #[test]
    fn test_xfail_interpretation() {
        let mut test = test_object();
        test.result = ResultInterpretation::Xfail;
        let mut failed = observation();
        failed.outcome = Outcome::Fail;
        let records = merge_test_results(
            &test,
            &failed,
            None,
            Path::new("/data"),
            Path::new("/results"),
        )
        .unwrap();
        assert_eq!(records[0].result, Outcome::Pass);
    }

    #[test]
    fn test_custom_entries_prefixed_and_overwritten() {
        let custom = record(
            "- name: /\n  result: pass\n  duration: '00:99:99'\n- name: /sub\n  result: fail\n",
        );
        let records = merge_test_results(
            &test_object(),
            &observation(),
            Some(custom),
            Path::new("/data"),
            Path::new("/results"),
        )
        .unwrap();
        assert_eq!(records.len(), 2);

        // Parent entry: result kept, timing overwritten.
        assert_eq!(records[0].name, "/t");
        assert_eq!(records[0].result, Outcome::Pass);
        assert_eq!(records[0].duration.as_deref(), Some("00:00:30"));
        assert_eq!(parse_hms(records[0].duration.as_deref().unwrap()).unwrap(), 30);

        // Sub-entry: identity injected, timing left alone.
        assert_eq!(records[1].name, "/t/sub");
        assert_eq!(records[1].result, Outcome::Fail);
        assert_eq!(records[1].serial_number, Some(7));
        assert!(records[1].guest.is_some());
        assert!(records[1].duration.is_none());
    }

    #[test]
    fn test_sub_entry_keeps_own_timing() {
        let custom = record("- name: /sub\n  result: pass\n  duration: '00:01:00'\n");
        let records = merge_test_results(
            &test_object(),
            &observation(),
            Some(custom),
            Path::new("/data"),
            Path::new("/results"),
        )
        .unwrap();
        assert_eq!(records[0].duration.as_deref(), Some("00:01:00"));
    }

    #[test]
    fn test_log_paths_rewritten() {
        let custom = record("- name: /\n  result: pass\n  log: [output.txt, logs/dmesg.txt]\n");
        let records = merge_test_results(
            &test_object(),
            &observation(),
            Some(custom),
            Path::new("/run/plan/execute/data/t"),
            Path::new("/run/plan/execute"),
        )
        .unwrap();
        assert_eq!(
            records[0].log,
            vec!["data/t/output.txt", "data/t/logs/dmesg.txt"]
        );
    }

    #[test]
    fn test_invalid_entry_name() {
        let custom = record("- name: sub\n  result: pass\n");
        let err = merge_test_results(
            &test_object(),
            &observation(),
            Some(custom),
            Path::new("/data"),
            Path::new("/results"),
        )
        .unwrap_err();
        assert!(matches!(err, ResultError::Malformed { .. }));
    }

    #[test]
    fn test_empty_custom_file_rejected() {
        let err = merge_test_results(
            &test_object(),
            &observation(),
            Some(Vec::new()),
            Path::new("/data"),
            Path::new("/results"),
        )
        .unwrap_err();
        assert!(matches!(err, ResultError::Malformed { .. }));
    }

    #[test]
    fn test_check_failures_escalate() {
        let mut record = record(
            "- name: /t\n  result: pass\n  check:\n  - how: avc\n    result: fail\n",
        )
        .remove(0);
        escalate_check_failures(&mut record);
        assert_eq!(record.result, Outcome::Fail);
    }
}
