// Copyright 2025 Distcalc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tokenizer
//!
//! Splits an infix expression into decimal literals, the four binary
//! operators and parentheses. Whitespace only separates tokens.
//!
//! # Unary minus
//!
//! A `-` becomes part of the following literal when it stands at the start
//! of the expression, right after `(`, or right after another operator, and
//! the next character is a digit or `.`. Everywhere else it is the binary
//! operator, so `-(2+3)` and `2 - - 3` are left for the validator to reject.

use std::fmt;

use crate::error::SyntaxError;

/// One of the four supported binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            '+' => Some(Operator::Add),
            '-' => Some(Operator::Sub),
            '*' => Some(Operator::Mul),
            '/' => Some(Operator::Div),
            _ => None,
        }
    }

    pub fn symbol(&self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::Div => '/',
        }
    }

    /// Binding strength used by the postfix converter.
    pub fn precedence(&self) -> u8 {
        match self {
            Operator::Add | Operator::Sub => 1,
            Operator::Mul | Operator::Div => 2,
        }
    }

    pub fn is_left_associative(&self) -> bool {
        true
    }

    /// Applies the operator, returning `None` for division by zero and for
    /// results that are not finite.
    pub fn apply(&self, lhs: f64, rhs: f64) -> Option<f64> {
        let value = match self {
            Operator::Add => lhs + rhs,
            Operator::Sub => lhs - rhs,
            Operator::Mul => lhs * rhs,
            Operator::Div => {
                if rhs == 0.0 {
                    return None;
                }
                lhs / rhs
            }
        };
        value.is_finite().then_some(value)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A lexical token.
///
/// Literals keep the text the user wrote (with a folded unary minus) so that
/// fragments echo the original operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Number(String),
    Op(Operator),
    LParen,
    RParen,
}

impl Token {
    pub fn number(literal: impl Into<String>) -> Self {
        Token::Number(literal.into())
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Token::Number(_))
    }

    pub fn is_operator(&self) -> bool {
        matches!(self, Token::Op(_))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(literal) => write!(f, "{}", literal),
            Token::Op(op) => write!(f, "{}", op),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

/// A token together with the character offset it starts at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    pub token: Token,
    pub pos: usize,
}

/// Tokenizes an infix expression.
///
/// # Errors
///
/// - [`SyntaxError::InvalidCharacter`] for anything outside digits, `.`,
///   operators, parentheses and whitespace
/// - [`SyntaxError::InvalidNumber`] for digit runs that do not parse
///   (`1.2.3`, a lone `.`)
pub fn tokenize(input: &str) -> Result<Vec<Lexeme>, SyntaxError> {
    let chars: Vec<char> = input.chars().collect();
    let mut lexemes: Vec<Lexeme> = Vec::new();
    let mut buffer = String::new();
    let mut buffer_start = 0;

    for (pos, &ch) in chars.iter().enumerate() {
        if ch.is_ascii_digit() || ch == '.' {
            if buffer.is_empty() {
                buffer_start = pos;
            }
            buffer.push(ch);
            continue;
        }

        flush_literal(&mut buffer, buffer_start, &mut lexemes)?;

        if ch.is_whitespace() {
            continue;
        }

        let token = match ch {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '-' if starts_negative_literal(lexemes.last(), chars.get(pos + 1)) => {
                buffer_start = pos;
                buffer.push(ch);
                continue;
            }
            _ => match Operator::from_char(ch) {
                Some(op) => Token::Op(op),
                None => return Err(SyntaxError::InvalidCharacter { ch, pos }),
            },
        };
        lexemes.push(Lexeme { token, pos });
    }

    flush_literal(&mut buffer, buffer_start, &mut lexemes)?;
    Ok(lexemes)
}

fn starts_negative_literal(previous: Option<&Lexeme>, next: Option<&char>) -> bool {
    let unary_position = match previous {
        None => true,
        Some(lexeme) => matches!(lexeme.token, Token::LParen | Token::Op(_)),
    };
    unary_position && next.map_or(false, |c| c.is_ascii_digit() || *c == '.')
}

fn flush_literal(
    buffer: &mut String,
    start: usize,
    lexemes: &mut Vec<Lexeme>,
) -> Result<(), SyntaxError> {
    if buffer.is_empty() {
        return Ok(());
    }
    let literal = std::mem::take(buffer);
    if !is_literal(&literal) {
        return Err(SyntaxError::InvalidNumber {
            literal,
            pos: start,
        });
    }
    lexemes.push(Lexeme {
        token: Token::Number(literal),
        pos: start,
    });
    Ok(())
}

/// Returns `true` if `text` is a decimal literal: an optional leading `-`,
/// digits and at most one `.`, with at least one digit.
pub fn is_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().filter(|&c| c == '.').count() <= 1
}

/// Parses a decimal literal into its value.
pub fn literal_value(text: &str) -> Option<f64> {
    if is_literal(text) {
        text.parse().ok()
    } else {
        None
    }
}

/// Renders a value in the canonical literal form used in residual
/// expressions.
///
/// Integral values below 2^53 in magnitude print without a fractional part;
/// everything else uses the shortest round-trip representation.
pub fn format_number(value: f64) -> String {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if value == 0.0 {
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < MAX_EXACT {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
