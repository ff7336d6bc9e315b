//! Execution results: outcomes, aggregation, and the on-disk record

use crate::error::ResultError;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Final outcome of a test (or of a whole plan/run after reduction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Info,
    Warn,
    Error,
    Skip,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pass => "pass",
            Outcome::Fail => "fail",
            Outcome::Info => "info",
            Outcome::Warn => "warn",
            Outcome::Error => "error",
            Outcome::Skip => "skip",
        }
    }

    /// Position in the `pass < info < warn < fail < error` chain.
    /// `skip` sits outside the chain and is handled by [`Outcome::reduce`].
    fn severity(&self) -> u8 {
        match self {
            Outcome::Pass => 0,
            Outcome::Info => 1,
            Outcome::Warn => 2,
            Outcome::Fail => 3,
            Outcome::Error => 4,
            Outcome::Skip => 0,
        }
    }

    /// Reduce a sequence of outcomes to the aggregate one.
    ///
    /// The worst non-skip outcome wins; `skip` is absorbing only when
    /// every entry is a skip. An empty sequence reduces to `None`.
    pub fn reduce<I>(outcomes: I) -> Option<Outcome>
    where
        I: IntoIterator<Item = Outcome>,
    {
        let mut worst: Option<Outcome> = None;
        let mut any = false;
        for outcome in outcomes {
            any = true;
            if outcome == Outcome::Skip {
                continue;
            }
            worst = Some(match worst {
                Some(current) if current.severity() >= outcome.severity() => current,
                _ => outcome,
            });
        }
        match (any, worst) {
            (false, _) => None,
            (true, None) => Some(Outcome::Skip),
            (true, Some(outcome)) => Some(outcome),
        }
    }
}

impl FromStr for Outcome {
    type Err = ResultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pass" => Ok(Outcome::Pass),
            "fail" => Ok(Outcome::Fail),
            "info" => Ok(Outcome::Info),
            "warn" => Ok(Outcome::Warn),
            "error" => Ok(Outcome::Error),
            "skip" => Ok(Outcome::Skip),
            other => Err(ResultError::InvalidOutcome(other.to_string())),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Exit code for a whole run.
///
/// `0` at least one pass, no fail/warn/error; `1` fail or warn, no error;
/// `2` error occurred; `3` no results produced; `4` all results skipped.
pub fn exit_code(outcomes: &[Outcome]) -> i32 {
    if outcomes.is_empty() {
        return 3;
    }
    if outcomes.iter().all(|o| *o == Outcome::Skip) {
        return 4;
    }
    if outcomes.contains(&Outcome::Error) {
        return 2;
    }
    if outcomes
        .iter()
        .any(|o| matches!(o, Outcome::Fail | Outcome::Warn))
    {
        return 1;
    }
    0
}

/// Identity of the guest a test ran on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Identity of the metadata node a result belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FmfId {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub name: String,
}

/// Result of a single check attached to a test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub how: String,
    pub result: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<String>,
    #[serde(flatten)]
    pub extra: Mapping,
}

/// One record of the plan's results file.
///
/// Unknown fields are preserved across read-modify-write via `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub name: String,
    pub result: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ids: BTreeMap<String, String>,
    #[serde(
        default,
        rename = "start-time",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_time: Option<DateTime<FixedOffset>>,
    #[serde(default, rename = "end-time", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<FixedOffset>>,
    /// Wall-clock duration as `hh:mm:ss`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(
        default,
        rename = "serial-number",
        skip_serializing_if = "Option::is_none"
    )]
    pub serial_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest: Option<GuestIdentity>,
    #[serde(default, rename = "data-path", skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fmf_id: Option<FmfId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub check: Vec<CheckResult>,
    #[serde(flatten)]
    pub extra: Mapping,
}

impl ResultRecord {
    pub fn new(name: impl Into<String>, result: Outcome) -> Self {
        Self {
            name: name.into(),
            result,
            note: None,
            log: Vec::new(),
            ids: BTreeMap::new(),
            start_time: None,
            end_time: None,
            duration: None,
            serial_number: None,
            guest: None,
            data_path: None,
            fmf_id: None,
            check: Vec::new(),
            extra: Mapping::new(),
        }
    }
}

/// Load a results file; format chosen by extension (`.json` vs YAML).
pub fn load_results(path: &Path) -> Result<Vec<ResultRecord>, ResultError> {
    let text = std::fs::read_to_string(path).map_err(|err| ResultError::Malformed {
        path: path.display().to_string(),
        reason: err.to_string(),
    })?;
    parse_results(&text, path)
}

/// Parse results text; format chosen by the path's extension.
pub fn parse_results(text: &str, path: &Path) -> Result<Vec<ResultRecord>, ResultError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let records: Vec<ResultRecord> = if is_json {
        serde_json::from_str(text).map_err(|err| ResultError::Malformed {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?
    } else {
        serde_yaml::from_str(text).map_err(|err| ResultError::Malformed {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?
    };
    Ok(records)
}

/// Save a results file; format chosen by extension (`.json` vs YAML).
pub fn save_results(path: &Path, records: &[ResultRecord]) -> Result<(), ResultError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let text = if is_json {
        serde_json::to_string_pretty(records).map_err(|err| ResultError::WriteFailed {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?
    } else {
        serde_yaml::to_string(records).map_err(|err| ResultError::WriteFailed {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?
    };
    std::fs::write(path, text).map_err(|err| ResultError::WriteFailed {
        path: path.display().to_string(),
        reason: err.to_string(),
    })
}

/// Format seconds as `hh:mm:ss`.
pub fn format_duration(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Parse a `hh:mm:ss` duration into seconds. Out-of-range minute/second
/// parts are accepted and carried over (`00:99:99` is 6039 seconds).
pub fn parse_hms(text: &str) -> Result<u64, ResultError> {
    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() != 3 {
        return Err(ResultError::Malformed {
            path: String::new(),
            reason: format!("invalid duration '{text}'"),
        });
    }
    let mut total: u64 = 0;
    for part in parts {
        let value: u64 = part.parse().map_err(|_| ResultError::Malformed {
            path: String::new(),
            reason: format!("invalid duration '{text}'"),
        })?;
        total = total * 60 + value;
    }
    Ok(total)
}
