//! Boolean predicates over feature flags.
//!
//! The same evaluator backs whole-file flag dependencies (`when = "..."` in
//! `template.toml`) and `{% if ... %}` blocks inside templated files.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr    := and ( ("or" | "||") and )*
//! and     := unary ( ("and" | "&&") unary )*
//! unary   := ("not" | "!") unary | primary
//! primary := "true" | "false" | IDENT | "(" expr ")"
//! ```

use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::compose::Flags;

/// A parsed flag predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Const(bool),
    Flag(String),
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

/// Syntax error in a predicate expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at column {column}")]
pub struct PredicateError {
    pub message: String,
    /// 1-based column in the expression
    pub column: usize,
}

/// Raised when a predicate is evaluated against flags that don't bind one of its names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("flag '{0}' is not bound")]
pub struct UnboundFlag(pub String);

/// Words that cannot be used as flag names because the grammar claims them.
pub const RESERVED_WORDS: &[&str] = &["and", "or", "not", "true", "false"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    True,
    False,
    Not,
    And,
    Or,
    LParen,
    RParen,
}

impl Predicate {
    /// Parse a predicate expression.
    pub fn parse(source: &str) -> Result<Self, PredicateError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(PredicateError {
                message: "empty expression".to_string(),
                column: 1,
            });
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            end_column: source.chars().count() + 1,
        };
        let predicate = parser.parse_or()?;
        if let Some((_, column)) = parser.tokens.get(parser.pos) {
            return Err(PredicateError {
                message: "unexpected trailing input".to_string(),
                column: *column,
            });
        }
        Ok(predicate)
    }

    /// All flag names the predicate refers to.
    pub fn flags(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_flags(&mut names);
        names
    }

    fn collect_flags<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Predicate::Const(_) => {}
            Predicate::Flag(name) => {
                names.insert(name.as_str());
            }
            Predicate::Not(inner) => inner.collect_flags(names),
            Predicate::And(lhs, rhs) | Predicate::Or(lhs, rhs) => {
                lhs.collect_flags(names);
                rhs.collect_flags(names);
            }
        }
    }

    /// Evaluate against a flag environment.
    ///
    /// Every referenced flag must be bound; callers validate this up front so
    /// the error path only fires on a composer bug.
    pub fn evaluate(&self, flags: &Flags) -> Result<bool, UnboundFlag> {
        match self {
            Predicate::Const(value) => Ok(*value),
            Predicate::Flag(name) => flags
                .get(name)
                .copied()
                .ok_or_else(|| UnboundFlag(name.clone())),
            Predicate::Not(inner) => Ok(!inner.evaluate(flags)?),
            Predicate::And(lhs, rhs) => Ok(lhs.evaluate(flags)? && rhs.evaluate(flags)?),
            Predicate::Or(lhs, rhs) => Ok(lhs.evaluate(flags)? || rhs.evaluate(flags)?),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Const(value) => write!(f, "{}", value),
            Predicate::Flag(name) => write!(f, "{}", name),
            Predicate::Not(inner) => match inner.as_ref() {
                Predicate::And(..) | Predicate::Or(..) => write!(f, "not ({})", inner),
                _ => write!(f, "not {}", inner),
            },
            Predicate::And(lhs, rhs) => {
                write_operand(f, lhs, true)?;
                write!(f, " and ")?;
                write_operand(f, rhs, true)
            }
            Predicate::Or(lhs, rhs) => {
                write_operand(f, lhs, false)?;
                write!(f, " or ")?;
                write_operand(f, rhs, false)
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Predicate, in_and: bool) -> fmt::Result {
    if in_and && matches!(operand, Predicate::Or(..)) {
        write!(f, "({})", operand)
    } else {
        write!(f, "{}", operand)
    }
}

fn tokenize(source: &str) -> Result<Vec<(Token, usize)>, PredicateError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let column = i + 1;
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((Token::LParen, column));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, column));
                i += 1;
            }
            '!' => {
                tokens.push((Token::Not, column));
                i += 1;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(PredicateError {
                        message: format!("expected '{}{}'", c, c),
                        column,
                    });
                }
                let token = if c == '&' { Token::And } else { Token::Or };
                tokens.push((token, column));
                i += 2;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "not" => Token::Not,
                    "and" => Token::And,
                    "or" => Token::Or,
                    _ => Token::Ident(word),
                };
                tokens.push((token, column));
            }
            other => {
                return Err(PredicateError {
                    message: format!("unexpected character '{}'", other),
                    column,
                });
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end_column: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn column(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, column)| *column)
            .unwrap_or(self.end_column)
    }

    fn parse_or(&mut self) -> Result<Predicate, PredicateError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Predicate::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Predicate, PredicateError> {
        let mut lhs = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Predicate::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Predicate, PredicateError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Predicate::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Predicate, PredicateError> {
        let column = self.column();
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        match token {
            Some(Token::True) => {
                self.pos += 1;
                Ok(Predicate::Const(true))
            }
            Some(Token::False) => {
                self.pos += 1;
                Ok(Predicate::Const(false))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(Predicate::Flag(name))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(PredicateError {
                        message: "expected ')'".to_string(),
                        column: self.column(),
                    });
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(_) => Err(PredicateError {
                message: "expected a flag name, 'true', 'false' or '('".to_string(),
                column,
            }),
            None => Err(PredicateError {
                message: "unexpected end of expression".to_string(),
                column,
            }),
        }
    }
}
