//! Lexer for the tiny literal-expression language `ember-cli` accepts.
//!
//! Converts a line of input into a stream of tokens. Only the grammar a
//! host needs to hand-construct values is covered: numbers, strings,
//! booleans, `nil`, and table constructors — a real lexer/parser/codegen
//! for the full language lives outside this crate.

use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Equals,
    Nil,
    True,
    False,
    Int(i64),
    Float(f64),
    String(String),
    Ident(String),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum LexError {
    #[error("unterminated string")]
    UnterminatedString,
    #[error("invalid escape: \\{0}")]
    InvalidEscape(char),
    #[error("unexpected character: {0:?}")]
    UnexpectedChar(char),
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self { chars: source.chars().peekable() }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn read_string(&mut self) -> Result<String, LexError> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                None => return Err(LexError::UnterminatedString),
                Some('"') => return Ok(out),
                Some('\\') => match self.chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some(c) => return Err(LexError::InvalidEscape(c)),
                    None => return Err(LexError::UnterminatedString),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn read_number(&mut self, first: char) -> Token {
        let mut text = String::from(first);
        let mut is_float = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.chars.next();
            } else if c == '.' && !is_float {
                is_float = true;
                text.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if is_float {
            Token::Float(text.parse().unwrap_or(0.0))
        } else {
            text.parse().map_or_else(|_| Token::Float(text.parse().unwrap_or(0.0)), Token::Int)
        }
    }

    #[expect(
        clippy::unwrap_used,
        reason = "the loop guard just peeked the same character this pulls"
    )]
    fn read_ident(&mut self, first: char) -> Token {
        let mut text = String::from(first);
        while matches!(self.chars.peek(), Some(c) if c.is_alphanumeric() || *c == '_') {
            text.push(self.chars.next().unwrap());
        }
        match text.as_str() {
            "nil" => Token::Nil,
            "true" => Token::True,
            "false" => Token::False,
            _ => Token::Ident(text),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    #[expect(
        clippy::unwrap_used,
        reason = "the guard above just peeked the digit this pulls"
    )]
    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let c = self.chars.next()?;
        Some(match c {
            '{' => Ok(Token::LBrace),
            '}' => Ok(Token::RBrace),
            '[' => Ok(Token::LBracket),
            ']' => Ok(Token::RBracket),
            ',' => Ok(Token::Comma),
            '=' => Ok(Token::Equals),
            '"' => self.read_string().map(Token::String),
            '-' if matches!(self.chars.peek(), Some(d) if d.is_ascii_digit()) => {
                let d = self.chars.next().unwrap();
                match self.read_number(d) {
                    Token::Int(n) => Ok(Token::Int(-n)),
                    Token::Float(n) => Ok(Token::Float(-n)),
                    other => Ok(other),
                }
            }
            c if c.is_ascii_digit() => Ok(self.read_number(c)),
            c if c.is_alphabetic() || c == '_' => Ok(self.read_ident(c)),
            c => Err(LexError::UnexpectedChar(c)),
        })
    }
}
