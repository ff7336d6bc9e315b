//! AST of the `when` expression language

use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operators usable against a context dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Match,
    NotMatch,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Match => "~",
            CompareOp::NotMatch => "!~",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed `when` expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WhenExpr {
    /// `dimension OP literal`
    Comparison {
        dimension: String,
        op: CompareOp,
        literal: String,
    },
    /// `dimension is defined` / `dimension is not defined`
    Defined { dimension: String, negated: bool },
    Not(Box<WhenExpr>),
    And(Vec<WhenExpr>),
    Or(Vec<WhenExpr>),
}

/// Parse error with line/column information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parse error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}
