//! Error types for Crucible operations

use thiserror::Error;

/// A value violates a key's declared type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Invalid value for '{key}': expected {expected}, got {got}")]
    TypeMismatch {
        key: String,
        expected: String,
        got: String,
    },

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// A constraint string, `when` expression, or template cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("Failed to parse '{expression}' at line {line}, column {column}: {message}")]
    Syntax {
        expression: String,
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Well-formed input that is internally inconsistent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SemanticError {
    #[error("Constraint block mixes '{operator}' with leaf constraints")]
    MixedConstraintBlock { operator: String },

    #[error("Operator '{operator}' is not supported for '{path}'")]
    UnsupportedOperator { operator: String, path: String },

    #[error("Invalid constraint document: {reason}")]
    InvalidConstraint { reason: String },

    #[error("Invalid adjust rule: {reason}")]
    InvalidAdjustRule { reason: String },

    #[error("Cannot merge '{key}': {reason}")]
    MergeConflict { key: String, reason: String },
}

/// Policy file lookup failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Policy '{path}' lies outside policy root '{root}'")]
    OutsideRoot { path: String, root: String },

    #[error("Policy '{name}' not found under root '{root}'")]
    NameNotFound { name: String, root: String },

    #[error("Policy root is required to resolve policy name '{name}'")]
    RootRequired { name: String },

    #[error("Failed to read policy '{path}': {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Failed to parse policy '{path}': {reason}")]
    Unparsable { path: String, reason: String },
}

/// Template evaluation failure inside a policy rule.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Policy rule #{rule} failed to rewrite '{key}': {reason}")]
pub struct RenderError {
    /// Index of the offending rule within the policy document.
    pub rule: usize,
    /// Test key the rule was rewriting.
    pub key: String,
    pub reason: String,
}

/// Custom result file malformed or violates the results schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResultError {
    #[error("Malformed results file '{path}': {reason}")]
    Malformed { path: String, reason: String },

    #[error("Invalid result outcome '{0}'")]
    InvalidOutcome(String),

    #[error("Result entry is missing the 'name' field")]
    MissingName,

    #[error("Failed to write results file '{path}': {reason}")]
    WriteFailed { path: String, reason: String },
}

/// Errors raised while loading a metadata tree from disk.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("Failed to read '{path}': {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Failed to parse '{path}': {reason}")]
    Unparsable { path: String, reason: String },

    #[error("Node '{0}' not found in tree")]
    NodeNotFound(String),

    #[error("Node file '{path}' must contain a mapping")]
    NotAMapping { path: String },
}

/// Top-level error for all Crucible operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CrucibleError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Result(#[from] ResultError),

    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Result type alias for Crucible operations.
pub type CrucibleResult<T> = Result<T, CrucibleError>;

/// A recoverable oddity collected during materialization.
///
/// Warnings never fail the run; they are reported alongside results so the
/// caller can surface them (impossible constraints, unused adjust rules,
/// unknown hardware leaf paths).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// Node or test the warning concerns, when known.
    pub subject: Option<String>,
    pub message: String,
}

impl Warning {
    pub fn new(subject: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.map(str::to_owned),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.subject {
            Some(subject) => write!(f, "{}: {}", subject, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display() {
        let err = SchemaError::TypeMismatch {
            key: "enabled".into(),
            expected: "boolean".into(),
            got: "string".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for 'enabled': expected boolean, got string"
        );
    }

    #[test]
    fn test_render_error_names_rule_and_key() {
        let err = RenderError {
            rule: 2,
            key: "check".into(),
            reason: "unexpected token".into(),
        };
        let text = err.to_string();
        assert!(text.contains("#2"));
        assert!(text.contains("'check'"));
    }

    #[test]
    fn test_unified_error_from_kinds() {
        let err: CrucibleError = SemanticError::MixedConstraintBlock {
            operator: "and".into(),
        }
        .into();
        assert!(matches!(err, CrucibleError::Semantic(_)));
    }
}
