//! Parser for the template language

use super::ast::*;
use super::lexer::{segment, RawSegment};
use crate::parser::ParseError;
use std::iter::Peekable;
use std::str::CharIndices;

/// Parse template source into a node list.
pub fn parse(source: &str) -> Result<Vec<Node>, ParseError> {
    let segments = segment(source)?;
    let mut pos = 0;
    let nodes = parse_block(&segments, &mut pos, &[])?;
    if pos < segments.len() {
        if let RawSegment::Tag { content, line } = &segments[pos] {
            return Err(ParseError {
                message: format!("Unexpected '{{% {content} %}}'"),
                line: *line,
                column: 1,
            });
        }
    }
    Ok(nodes)
}

/// Parse nodes until end of input or a tag whose keyword is listed in
/// `stop`. The stopping tag is left unconsumed for the caller.
fn parse_block(
    segments: &[RawSegment],
    pos: &mut usize,
    stop: &[&str],
) -> Result<Vec<Node>, ParseError> {
    let mut nodes = Vec::new();
    while *pos < segments.len() {
        match &segments[*pos] {
            RawSegment::Text(text) => {
                nodes.push(Node::Text(text.clone()));
                *pos += 1;
            }
            RawSegment::Output { expr, line } => {
                nodes.push(Node::Output(parse_expr_str(expr, *line)?));
                *pos += 1;
            }
            RawSegment::Tag { content, line } => {
                let keyword = content.split_whitespace().next().unwrap_or("");
                if stop.contains(&keyword) {
                    return Ok(nodes);
                }
                match keyword {
                    "if" => nodes.push(parse_if(segments, pos, content, *line)?),
                    "for" => nodes.push(parse_for(segments, pos, content, *line)?),
                    other => {
                        return Err(ParseError {
                            message: format!("Unknown tag '{other}'"),
                            line: *line,
                            column: 1,
                        });
                    }
                }
            }
        }
    }
    if !stop.is_empty() {
        return Err(ParseError {
            message: format!("Missing closing tag (expected one of: {})", stop.join(", ")),
            line: segments
                .last()
                .map(|s| match s {
                    RawSegment::Output { line, .. } | RawSegment::Tag { line, .. } => *line,
                    RawSegment::Text(_) => 1,
                })
                .unwrap_or(1),
            column: 1,
        });
    }
    Ok(nodes)
}

fn parse_if(
    segments: &[RawSegment],
    pos: &mut usize,
    content: &str,
    line: usize,
) -> Result<Node, ParseError> {
    let condition = parse_expr_str(tag_rest(content, "if"), line)?;
    *pos += 1;
    let mut arms = Vec::new();
    let mut else_body = Vec::new();
    let mut body = parse_block(segments, pos, &["elif", "else", "endif"])?;
    let mut current = condition;
    loop {
        let Some(RawSegment::Tag { content, line }) = segments.get(*pos) else {
            return Err(ParseError {
                message: "Missing '{% endif %}'".to_string(),
                line,
                column: 1,
            });
        };
        let keyword = content.split_whitespace().next().unwrap_or("");
        match keyword {
            "elif" => {
                arms.push((current, body));
                current = parse_expr_str(tag_rest(content, "elif"), *line)?;
                *pos += 1;
                body = parse_block(segments, pos, &["elif", "else", "endif"])?;
            }
            "else" => {
                arms.push((current, body));
                *pos += 1;
                else_body = parse_block(segments, pos, &["endif"])?;
                let Some(RawSegment::Tag { .. }) = segments.get(*pos) else {
                    return Err(ParseError {
                        message: "Missing '{% endif %}'".to_string(),
                        line: *line,
                        column: 1,
                    });
                };
                *pos += 1;
                return Ok(Node::If { arms, else_body });
            }
            "endif" => {
                arms.push((current, body));
                *pos += 1;
                return Ok(Node::If { arms, else_body });
            }
            other => {
                return Err(ParseError {
                    message: format!("Unexpected tag '{other}' inside 'if'"),
                    line: *line,
                    column: 1,
                });
            }
        }
    }
}

fn parse_for(
    segments: &[RawSegment],
    pos: &mut usize,
    content: &str,
    line: usize,
) -> Result<Node, ParseError> {
    let rest = tag_rest(content, "for");
    let mut parts = rest.splitn(2, " in ");
    let var = parts.next().unwrap_or("").trim().to_string();
    let Some(iterable_text) = parts.next() else {
        return Err(ParseError {
            message: "Expected 'for NAME in EXPRESSION'".to_string(),
            line,
            column: 1,
        });
    };
    if var.is_empty() || !var.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ParseError {
            message: format!("Invalid loop variable '{var}'"),
            line,
            column: 1,
        });
    }
    let iterable = parse_expr_str(iterable_text, line)?;
    *pos += 1;
    let body = parse_block(segments, pos, &["endfor"])?;
    let Some(RawSegment::Tag { .. }) = segments.get(*pos) else {
        return Err(ParseError {
            message: "Missing '{% endfor %}'".to_string(),
            line,
            column: 1,
        });
    };
    *pos += 1;
    Ok(Node::For {
        var,
        iterable,
        body,
    })
}

fn tag_rest<'a>(content: &'a str, keyword: &str) -> &'a str {
    content[keyword.len()..].trim()
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Name(String),
    Str(String),
    Int(i64),
    Pipe,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Assign,
    EqEq,
    NotEq,
    Eof,
}

/// Parse a single expression string (from `{{ }}` or a tag).
pub fn parse_expr_str(source: &str, line: usize) -> Result<Expr, ParseError> {
    let tokens = tokenize_expr(source, line)?;
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        source: source.to_string(),
        line,
    };
    let expr = parser.parse_or()?;
    parser.expect_eof()?;
    Ok(expr)
}

fn tokenize_expr(source: &str, line: usize) -> Result<Vec<ExprToken>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<CharIndices> = source.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                tokens.push(ExprToken::Pipe);
            }
            '.' => {
                chars.next();
                tokens.push(ExprToken::Dot);
            }
            '[' => {
                chars.next();
                tokens.push(ExprToken::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(ExprToken::RBracket);
            }
            '(' => {
                chars.next();
                tokens.push(ExprToken::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(ExprToken::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(ExprToken::Comma);
            }
            '=' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('=') {
                    chars.next();
                    tokens.push(ExprToken::EqEq);
                } else {
                    tokens.push(ExprToken::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.peek().map(|&(_, c)| c) == Some('=') {
                    chars.next();
                    tokens.push(ExprToken::NotEq);
                } else {
                    return Err(expr_error(source, line, "Expected '!='"));
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        None => return Err(expr_error(source, line, "Unterminated string")),
                        Some((_, c)) if c == quote => break,
                        Some((_, '\\')) => {
                            if let Some((_, escaped)) = chars.next() {
                                text.push(escaped);
                            }
                        }
                        Some((_, c)) => text.push(c),
                    }
                }
                tokens.push(ExprToken::Str(text));
            }
            c if c.is_ascii_digit() => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number: i64 = source[start..end]
                    .parse()
                    .map_err(|_| expr_error(source, line, "Invalid number"))?;
                tokens.push(ExprToken::Int(number));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(ExprToken::Name(source[start..end].to_string()));
            }
            other => {
                return Err(expr_error(
                    source,
                    line,
                    &format!("Unexpected character '{other}'"),
                ));
            }
        }
    }
    tokens.push(ExprToken::Eof);
    Ok(tokens)
}

fn expr_error(source: &str, line: usize, message: &str) -> ParseError {
    ParseError {
        message: format!("{message} in expression '{source}'"),
        line,
        column: 1,
    }
}

struct ExprParser {
    tokens: Vec<ExprToken>,
    pos: usize,
    source: String,
    line: usize,
}

impl ExprParser {
    fn current(&self) -> &ExprToken {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> ParseError {
        expr_error(&self.source, self.line, message)
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if *self.current() == ExprToken::Eof {
            Ok(())
        } else {
            Err(self.error("Trailing input"))
        }
    }

    fn is_name(&self, word: &str) -> bool {
        matches!(self.current(), ExprToken::Name(name) if name == word)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.is_name("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.is_name("and") {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.is_name("not") {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_pipe()?;
        match self.current().clone() {
            ExprToken::EqEq => {
                self.advance();
                let right = self.parse_pipe()?;
                Ok(Expr::Eq(Box::new(left), Box::new(right)))
            }
            ExprToken::NotEq => {
                self.advance();
                let right = self.parse_pipe()?;
                Ok(Expr::Ne(Box::new(left), Box::new(right)))
            }
            ExprToken::Name(name) if name == "in" => {
                self.advance();
                let haystack = self.parse_pipe()?;
                Ok(Expr::In {
                    needle: Box::new(left),
                    haystack: Box::new(haystack),
                    negated: false,
                })
            }
            ExprToken::Name(name) if name == "not" => {
                self.advance();
                if !self.is_name("in") {
                    return Err(self.error("Expected 'in' after 'not'"));
                }
                self.advance();
                let haystack = self.parse_pipe()?;
                Ok(Expr::In {
                    needle: Box::new(left),
                    haystack: Box::new(haystack),
                    negated: true,
                })
            }
            _ => Ok(left),
        }
    }

    fn parse_pipe(&mut self) -> Result<Expr, ParseError> {
        let mut input = self.parse_postfix()?;
        while *self.current() == ExprToken::Pipe {
            self.advance();
            let name = match self.current().clone() {
                ExprToken::Name(name) => name,
                _ => return Err(self.error("Expected filter name after '|'")),
            };
            self.advance();
            let args = if *self.current() == ExprToken::LParen {
                self.parse_filter_args()?
            } else {
                Vec::new()
            };
            input = Expr::Filter {
                input: Box::new(input),
                name,
                args,
            };
        }
        Ok(input)
    }

    fn parse_filter_args(&mut self) -> Result<Vec<FilterArg>, ParseError> {
        self.advance(); // consume '('
        let mut args = Vec::new();
        if *self.current() == ExprToken::RParen {
            self.advance();
            return Ok(args);
        }
        loop {
            // `name=value` keyword argument, or a positional expression.
            let name = match (self.current().clone(), self.tokens.get(self.pos + 1)) {
                (ExprToken::Name(name), Some(ExprToken::Assign)) => {
                    self.advance();
                    self.advance();
                    Some(name)
                }
                _ => None,
            };
            let value = self.parse_or()?;
            args.push(FilterArg { name, value });
            match self.current() {
                ExprToken::Comma => self.advance(),
                ExprToken::RParen => {
                    self.advance();
                    return Ok(args);
                }
                _ => return Err(self.error("Expected ',' or ')' in filter arguments")),
            }
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current().clone() {
                ExprToken::Dot => {
                    self.advance();
                    let name = match self.current().clone() {
                        ExprToken::Name(name) => name,
                        _ => return Err(self.error("Expected attribute name after '.'")),
                    };
                    self.advance();
                    expr = Expr::Attr(Box::new(expr), name);
                }
                ExprToken::LBracket => {
                    self.advance();
                    match self.current().clone() {
                        ExprToken::Int(index) => {
                            self.advance();
                            expr = Expr::Index(Box::new(expr), index);
                        }
                        // `x['model-name']` addresses attributes the dotted
                        // form cannot spell.
                        ExprToken::Str(name) => {
                            self.advance();
                            expr = Expr::Attr(Box::new(expr), name);
                        }
                        _ => return Err(self.error("Expected index or string key")),
                    }
                    if *self.current() != ExprToken::RBracket {
                        return Err(self.error("Expected ']'"));
                    }
                    self.advance();
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.current().clone() {
            ExprToken::Str(text) => {
                self.advance();
                Ok(Expr::Str(text))
            }
            ExprToken::Int(number) => {
                self.advance();
                Ok(Expr::Int(number))
            }
            ExprToken::Name(name) if name == "true" => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            ExprToken::Name(name) if name == "false" => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            ExprToken::Name(name) => {
                self.advance();
                Ok(Expr::Var(name))
            }
            ExprToken::LParen => {
                self.advance();
                let expr = self.parse_or()?;
                if *self.current() != ExprToken::RParen {
                    return Err(self.error("Expected ')'"));
                }
                self.advance();
                Ok(expr)
            }
            _ => Err(self.error("Expected expression")),
        }
    }
}
