//! Environment-variable configuration

use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Explicit policy file path.
pub const ENV_POLICY_FILE: &str = "CRUCIBLE_POLICY_FILE";
/// Symbolic policy name, resolved under the policy root.
pub const ENV_POLICY_NAME: &str = "CRUCIBLE_POLICY_NAME";
/// Directory every resolved policy path must lie under.
pub const ENV_POLICY_ROOT: &str = "CRUCIBLE_POLICY_ROOT";
/// Prefix of plugin-option override variables:
/// `CRUCIBLE_PLUGIN_<STEP>_<PLUGIN>_<OPTION>`.
pub const ENV_PLUGIN_PREFIX: &str = "CRUCIBLE_PLUGIN_";

/// Where to find the policy document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyLocation {
    pub file: Option<PathBuf>,
    pub name: Option<String>,
    pub root: Option<PathBuf>,
}

impl PolicyLocation {
    /// Read the location from the environment.
    pub fn from_env() -> Self {
        Self {
            file: std::env::var(ENV_POLICY_FILE).ok().map(PathBuf::from),
            name: std::env::var(ENV_POLICY_NAME).ok(),
            root: std::env::var(ENV_POLICY_ROOT).ok().map(PathBuf::from),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn from_name(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: Some(name.into()),
            root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Whether anything points at a policy at all.
    pub fn is_configured(&self) -> bool {
        self.file.is_some() || self.name.is_some()
    }
}

/// Collect plugin-option overrides for one step/plugin pair from the
/// environment: `CRUCIBLE_PLUGIN_DISCOVER_FMF_DIST_GIT=1` yields
/// `dist-git` for step `discover`, plugin `fmf`. Option names are
/// lowercased with underscores mapped to dashes; values are parsed as
/// YAML so `true` and `5` keep their types.
pub fn plugin_option_overrides(step: &str, plugin: &str) -> BTreeMap<String, Value> {
    let prefix = format!(
        "{ENV_PLUGIN_PREFIX}{}_{}_",
        step.to_uppercase(),
        plugin.to_uppercase()
    );
    let mut overrides = BTreeMap::new();
    for (name, value) in std::env::vars() {
        let Some(option) = name.strip_prefix(&prefix) else {
            continue;
        };
        if option.is_empty() {
            continue;
        }
        let key = option.to_lowercase().replace('_', "-");
        let parsed = serde_yaml::from_str(&value).unwrap_or(Value::String(value));
        overrides.insert(key, parsed);
    }
    overrides
}
