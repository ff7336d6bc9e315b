//! Execution context: named dimensions and versioned value comparison

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Dimension names with well-known meaning. Arbitrary dimensions are
/// accepted as well; this set only drives documentation and diagnostics.
pub const WELL_KNOWN_DIMENSIONS: &[&str] = &[
    "distro",
    "arch",
    "component",
    "trigger",
    "collection",
    "initiator",
];

/// Outcome of comparing two dimension values.
///
/// Ordering predicates (`<`, `<=`, `>`, `>=`) only hold for `Ordered`;
/// a name mismatch or an undecidable pair never satisfies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOutcome {
    Ordered(Ordering),
    /// Values carry different name prefixes (`fedora-33` vs `centos-8`).
    NameMismatch,
    /// At least one side carries no version, so only equality is defined.
    CannotDecide,
}

/// A single context dimension value, e.g. `fedora-33` or `x86_64`.
///
/// The value is split into a name prefix and an optional dotted-numeric
/// version suffix: `fedora-33` parses as name `fedora`, version `[33]`;
/// `centos-stream-9.3` as name `centos-stream`, version `[9, 3]`.
/// Values without a numeric suffix compare with equality only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DimensionValue {
    raw: String,
    name: String,
    version: Vec<u64>,
}

impl DimensionValue {
    /// Parse a dimension value. Input is lowercased; the trailing
    /// dash-separated token becomes the version when it is dotted-numeric.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_lowercase();
        let (name, version) = match raw.rsplit_once('-') {
            Some((prefix, last)) => match parse_version(last) {
                Some(version) => (prefix.to_string(), version),
                None => (raw.clone(), Vec::new()),
            },
            None => match parse_version(&raw) {
                // A bare version such as `9.3` compares against anything
                // with an empty name prefix.
                Some(version) => (String::new(), version),
                None => (raw.clone(), Vec::new()),
            },
        };
        Self { raw, name, version }
    }

    /// The full original value, lowercased.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The name prefix (full value when no version was recognized).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Numeric version segments; empty when the value is not versioned.
    pub fn version(&self) -> &[u64] {
        &self.version
    }

    /// Compare against another value with version-aware semantics.
    pub fn compare(&self, other: &DimensionValue) -> CompareOutcome {
        if self.name != other.name {
            return CompareOutcome::NameMismatch;
        }
        if self.version.is_empty() || other.version.is_empty() {
            if self.version.is_empty() && other.version.is_empty() {
                // Plain strings: equality is still meaningful.
                return if self.raw == other.raw {
                    CompareOutcome::Ordered(Ordering::Equal)
                } else {
                    CompareOutcome::CannotDecide
                };
            }
            return CompareOutcome::CannotDecide;
        }
        CompareOutcome::Ordered(compare_segments(&self.version, &other.version))
    }

    /// Version-aware equality: same name and same version segments, or
    /// identical raw text for unversioned values.
    pub fn matches(&self, other: &DimensionValue) -> bool {
        matches!(self.compare(other), CompareOutcome::Ordered(Ordering::Equal))
    }
}

fn parse_version(text: &str) -> Option<Vec<u64>> {
    if text.is_empty() {
        return None;
    }
    text.split('.').map(|s| s.parse::<u64>().ok()).collect()
}

fn compare_segments(left: &[u64], right: &[u64]) -> Ordering {
    for (l, r) in left.iter().zip(right.iter()) {
        match l.cmp(r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    // `9` < `9.3`: a shorter version is the older one when prefixes match.
    left.len().cmp(&right.len())
}

impl fmt::Display for DimensionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl From<String> for DimensionValue {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<DimensionValue> for String {
    fn from(value: DimensionValue) -> Self {
        value.raw
    }
}

impl From<&str> for DimensionValue {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// Mapping from dimension name to one or more values.
///
/// Multiple values per dimension are disjunctive: a predicate over the
/// dimension holds when any value satisfies it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    dimensions: BTreeMap<String, Vec<DimensionValue>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from `(dimension, values)` pairs. Names are
    /// lowercased; empty value lists are dropped.
    pub fn from_pairs<I, N, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, Vec<V>)>,
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let mut context = Self::new();
        for (name, values) in pairs {
            for value in values {
                context.add(name.as_ref(), value.as_ref());
            }
        }
        context
    }

    /// Add a value to a dimension, creating the dimension if needed.
    pub fn add(&mut self, dimension: &str, value: &str) {
        self.dimensions
            .entry(dimension.trim().to_lowercase())
            .or_default()
            .push(DimensionValue::parse(value));
    }

    /// Replace all values of a dimension.
    pub fn set(&mut self, dimension: &str, values: Vec<DimensionValue>) {
        self.dimensions
            .insert(dimension.trim().to_lowercase(), values);
    }

    /// Values of a dimension, or `None` when undefined.
    pub fn values(&self, dimension: &str) -> Option<&[DimensionValue]> {
        self.dimensions
            .get(&dimension.to_lowercase())
            .map(Vec::as_slice)
            .filter(|values| !values.is_empty())
    }

    pub fn is_defined(&self, dimension: &str) -> bool {
        self.values(dimension).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Iterate over `(dimension, values)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[DimensionValue])> {
        self.dimensions
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Merge another context over this one; dimensions present in `other`
    /// replace the local values wholesale.
    pub fn update(&mut self, other: &Context) {
        for (name, values) in &other.dimensions {
            self.dimensions.insert(name.clone(), values.clone());
        }
    }
}
