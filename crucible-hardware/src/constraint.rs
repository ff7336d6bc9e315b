//! Constraint tree model

use crate::quantity::Quantity;
use crucible_core::SemanticError;
use std::fmt;
use std::str::FromStr;

/// One segment of a leaf path: a name with an optional sequence index
/// (`disk[0]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    pub name: String,
    pub index: Option<usize>,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{}]", self.name, index),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Dotted navigation path of a leaf constraint (`cpu.model-name`,
/// `disk[0].size`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeafPath {
    pub segments: Vec<Segment>,
}

impl LeafPath {
    /// The path with indices stripped: the *family* used for type lookup
    /// (`disk[0].size` and `disk[1].size` are both `disk.size`).
    pub fn family(&self) -> String {
        self.segments
            .iter()
            .map(|segment| segment.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl FromStr for LeafPath {
    type Err = SemanticError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        for part in text.split('.') {
            let part = part.trim();
            if part.is_empty() {
                return Err(SemanticError::InvalidConstraint {
                    reason: format!("empty path segment in '{text}'"),
                });
            }
            let segment = match part.split_once('[') {
                Some((name, rest)) => {
                    let Some(index_text) = rest.strip_suffix(']') else {
                        return Err(SemanticError::InvalidConstraint {
                            reason: format!("unterminated index in '{text}'"),
                        });
                    };
                    let index =
                        index_text
                            .parse::<usize>()
                            .map_err(|_| SemanticError::InvalidConstraint {
                                reason: format!("invalid index '{index_text}' in '{text}'"),
                            })?;
                    Segment {
                        name: name.to_string(),
                        index: Some(index),
                    }
                }
                None => Segment {
                    name: part.to_string(),
                    index: None,
                },
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for LeafPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(Segment::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Constraint operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    NotMatch,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Match => "~",
            Operator::NotMatch => "!~",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Semantic type of a leaf, deciding value parsing and allowed operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    /// Byte quantity with units (`memory`, `disk.size`).
    Size,
    /// Dimensionless number (`cpu.cores`).
    Count,
    /// Boolean flag (`virtualization.is-virtualized`).
    Flag,
    /// Free-form string (`cpu.model-name`, `hostname`).
    Text,
    /// Version-like string with segment-wise comparison (`tpm.version`).
    Version,
    /// Leaf family this release does not know; kept opaque.
    Unknown,
}

impl LeafKind {
    /// Operators a leaf of this kind accepts.
    pub fn allows(&self, op: Operator) -> bool {
        match self {
            LeafKind::Size | LeafKind::Count | LeafKind::Version => !matches!(
                op,
                Operator::Match | Operator::NotMatch
            ),
            LeafKind::Flag => matches!(op, Operator::Eq | Operator::Ne),
            LeafKind::Text => matches!(
                op,
                Operator::Eq | Operator::Ne | Operator::Match | Operator::NotMatch
            ),
            LeafKind::Unknown => true,
        }
    }
}

/// Typed right-hand side of a leaf constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum LeafValue {
    Quantity(Quantity),
    Flag(bool),
    Text(String),
    Version(String),
}

impl fmt::Display for LeafValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafValue::Quantity(quantity) => write!(f, "{quantity}"),
            LeafValue::Flag(flag) => write!(f, "{flag}"),
            LeafValue::Text(text) => write!(f, "{text}"),
            LeafValue::Version(version) => write!(f, "{version}"),
        }
    }
}

/// A single leaf constraint: `path OP value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub path: LeafPath,
    pub kind: LeafKind,
    pub op: Operator,
    pub value: LeafValue,
}

/// Boolean composition of constraints.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintTree {
    /// All children must hold. Empty `and` is trivially satisfied.
    And(Vec<ConstraintTree>),
    /// At least one child must hold. Empty `or` is unsatisfiable.
    Or(Vec<ConstraintTree>),
    Leaf(Constraint),
}
