//! Recursive descent parser for `when` expressions

use super::ast::*;
use crate::lexer::*;
use crucible_core::ExpressionError;

/// Parse a `when` expression into its AST.
///
/// The error carries the offending expression text so callers can surface
/// it verbatim (a malformed rule is fatal for its node).
pub fn parse(source: &str) -> Result<WhenExpr, ExpressionError> {
    let tokens = Lexer::new(source)
        .tokenize()
        .map_err(|err| ExpressionError::Syntax {
            expression: source.to_string(),
            message: err.message,
            line: err.line,
            column: err.column,
        })?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse().map_err(|err| ExpressionError::Syntax {
        expression: source.to_string(),
        message: err.message,
        line: err.line,
        column: err.column,
    })?;
    Ok(expr)
}

/// Parser for the `when` expression language.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse the tokens into a single expression.
    pub fn parse(&mut self) -> Result<WhenExpr, ParseError> {
        let expr = self.parse_or()?;
        if !self.check(&TokenKind::Eof) {
            return Err(self.error("Expected end of expression"));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<WhenExpr, ParseError> {
        let first = self.parse_and()?;
        if !self.check(&TokenKind::Or) {
            return Ok(first);
        }
        let mut terms = vec![first];
        while self.check(&TokenKind::Or) {
            self.advance();
            terms.push(self.parse_and()?);
        }
        Ok(WhenExpr::Or(terms))
    }

    fn parse_and(&mut self) -> Result<WhenExpr, ParseError> {
        let first = self.parse_unary()?;
        if !self.check(&TokenKind::And) {
            return Ok(first);
        }
        let mut terms = vec![first];
        while self.check(&TokenKind::And) {
            self.advance();
            terms.push(self.parse_unary()?);
        }
        Ok(WhenExpr::And(terms))
    }

    fn parse_unary(&mut self) -> Result<WhenExpr, ParseError> {
        if self.check(&TokenKind::Not) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(WhenExpr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<WhenExpr, ParseError> {
        if self.check(&TokenKind::LParen) {
            self.advance();
            let expr = self.parse_or()?;
            self.expect(TokenKind::RParen)?;
            return Ok(expr);
        }

        let dimension = match &self.current().kind {
            TokenKind::Word(name) => name.clone(),
            _ => return Err(self.error("Expected dimension name")),
        };
        self.advance();

        if self.check(&TokenKind::Is) {
            self.advance();
            let negated = if self.check(&TokenKind::Not) {
                self.advance();
                true
            } else {
                false
            };
            self.expect(TokenKind::Defined)?;
            return Ok(WhenExpr::Defined { dimension, negated });
        }

        let op = match &self.current().kind {
            TokenKind::Eq => CompareOp::Eq,
            TokenKind::Ne => CompareOp::Ne,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Le => CompareOp::Le,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Ge => CompareOp::Ge,
            TokenKind::Match => CompareOp::Match,
            TokenKind::NotMatch => CompareOp::NotMatch,
            _ => return Err(self.error("Expected comparison operator or 'is'")),
        };
        self.advance();

        let literal = match &self.current().kind {
            TokenKind::Word(word) => word.clone(),
            TokenKind::Str(text) => text.clone(),
            _ => return Err(self.error("Expected literal value")),
        };
        self.advance();

        Ok(WhenExpr::Comparison {
            dimension,
            op,
            literal,
        })
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("Expected {kind}, found {}", self.current().kind)))
        }
    }

    fn error(&self, message: &str) -> ParseError {
        let token = self.current();
        ParseError {
            message: message.to_string(),
            line: token.line,
            column: token.column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_comparison() {
        let expr = parse("distro < fedora-33").unwrap();
        assert_eq!(
            expr,
            WhenExpr::Comparison {
                dimension: "distro".into(),
                op: CompareOp::Lt,
                literal: "fedora-33".into(),
            }
        );
    }

    #[test]
    fn test_precedence_not_before_and_before_or() {
        let expr = parse("not a == x and b == y or c == z").unwrap();
        // ((not a == x) and (b == y)) or (c == z)
        match expr {
            WhenExpr::Or(terms) => {
                assert_eq!(terms.len(), 2);
                match &terms[0] {
                    WhenExpr::And(inner) => {
                        assert!(matches!(inner[0], WhenExpr::Not(_)));
                        assert!(matches!(inner[1], WhenExpr::Comparison { .. }));
                    }
                    other => panic!("expected And, got {other:?}"),
                }
            }
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn test_parens_override_precedence() {
        let expr = parse("a == x and (b == y or c == z)").unwrap();
        match expr {
            WhenExpr::And(terms) => assert!(matches!(terms[1], WhenExpr::Or(_))),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_is_defined_forms() {
        assert_eq!(
            parse("component is defined").unwrap(),
            WhenExpr::Defined {
                dimension: "component".into(),
                negated: false,
            }
        );
        assert_eq!(
            parse("component is not defined").unwrap(),
            WhenExpr::Defined {
                dimension: "component".into(),
                negated: true,
            }
        );
    }

    #[test]
    fn test_quoted_literal() {
        let expr = parse("distro ~ 'fedora-\\d+'").unwrap();
        assert_eq!(
            expr,
            WhenExpr::Comparison {
                dimension: "distro".into(),
                op: CompareOp::Match,
                literal: "fedora-\\d+".into(),
            }
        );
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(parse("distro == fedora extra").is_err());
    }

    #[test]
    fn test_error_carries_expression() {
        let err = parse("distro ==").unwrap_err();
        match err {
            ExpressionError::Syntax { expression, .. } => {
                assert_eq!(expression, "distro ==");
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_expression_rejected() {
        assert!(parse("").is_err());
    }
}
