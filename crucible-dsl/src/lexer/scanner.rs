//! Lexer for the `when` expression language

use super::token::*;
use std::iter::Peekable;
use std::str::CharIndices;

/// Characters that terminate a bare word.
fn ends_word(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '=' | '!' | '<' | '>' | '~' | '\'' | '"')
}

/// Lexing failure (unterminated string, stray operator character).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

/// Lexer for `when` expressions.
pub struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
    source: &'a str,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            source,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the entire source into a vector of tokens.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, ScanError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, ScanError> {
        self.skip_whitespace();

        let start_line = self.line;
        let start_col = self.column;

        let kind = match self.peek_char() {
            None => TokenKind::Eof,
            Some(c) => match c {
                '(' => {
                    self.advance();
                    TokenKind::LParen
                }
                ')' => {
                    self.advance();
                    TokenKind::RParen
                }
                '~' => {
                    self.advance();
                    TokenKind::Match
                }
                '=' => {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                        TokenKind::Eq
                    } else {
                        return Err(self.error("Expected '==' (assignment is not supported)", start_line, start_col));
                    }
                }
                '!' => {
                    self.advance();
                    match self.peek_char() {
                        Some('=') => {
                            self.advance();
                            TokenKind::Ne
                        }
                        Some('~') => {
                            self.advance();
                            TokenKind::NotMatch
                        }
                        _ => return Err(self.error("Expected '!=' or '!~'", start_line, start_col)),
                    }
                }
                '<' => {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                        TokenKind::Le
                    } else {
                        TokenKind::Lt
                    }
                }
                '>' => {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                '\'' | '"' => self.scan_string(c, start_line, start_col)?,
                _ => self.scan_word(),
            },
        };

        Ok(Token {
            kind,
            line: start_line,
            column: start_col,
        })
    }

    fn scan_string(
        &mut self,
        quote: char,
        line: usize,
        column: usize,
    ) -> Result<TokenKind, ScanError> {
        self.advance();
        let mut text = String::new();
        loop {
            match self.peek_char() {
                None => return Err(self.error("Unterminated string", line, column)),
                Some(c) if c == quote => {
                    self.advance();
                    return Ok(TokenKind::Str(text));
                }
                Some('\\') => {
                    self.advance();
                    if let Some(escaped) = self.peek_char() {
                        text.push(escaped);
                        self.advance();
                    }
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
    }

    fn scan_word(&mut self) -> TokenKind {
        let start = self.offset();
        while let Some(c) = self.peek_char() {
            if ends_word(c) {
                break;
            }
            self.advance();
        }
        let word = &self.source[start..self.offset()];
        match word {
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "is" => TokenKind::Is,
            "defined" => TokenKind::Defined,
            _ => TokenKind::Word(word.to_string()),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.advance();
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn offset(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(i, _)| *i)
            .unwrap_or(self.source.len())
    }

    fn advance(&mut self) {
        if let Some((_, c)) = self.chars.next() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }

    fn error(&self, message: &str, line: usize, column: usize) -> ScanError {
        ScanError {
            message: message.to_string(),
            line,
            column,
        }
    }
}
