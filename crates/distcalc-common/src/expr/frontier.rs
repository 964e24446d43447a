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

//! Frontier decomposition and result substitution.
//!
//! The frontier of a postfix residual is every operation whose two operands
//! are already literals. Each one becomes a [`Fragment`], the unit of work a
//! worker computes. When a result comes back it replaces the fragment's
//! three-token window in the residual, which exposes the next frontier.
//!
//! Substitution works on token windows, never on raw text, so a fragment
//! like `2 3 +` can not match inside `12 3 +`.

use std::fmt;
use std::str::FromStr;

use crate::error::{DistcalcError, Result};

use super::postfix::Postfix;
use super::token::{format_number, is_literal, literal_value, Operator, Token};

/// One atomic binary operation: `lhs rhs op`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fragment {
    lhs: String,
    rhs: String,
    op: Operator,
}

impl Fragment {
    pub fn new(lhs: impl Into<String>, rhs: impl Into<String>, op: Operator) -> Self {
        Self {
            lhs: lhs.into(),
            rhs: rhs.into(),
            op,
        }
    }

    pub fn operator(&self) -> Operator {
        self.op
    }

    pub fn operands(&self) -> (&str, &str) {
        (&self.lhs, &self.rhs)
    }

    /// Computes the fragment.
    ///
    /// # Errors
    ///
    /// [`DistcalcError::Compute`] on division by zero or a non-finite result.
    pub fn evaluate(&self) -> Result<f64> {
        let lhs = literal_value(&self.lhs)
            .ok_or_else(|| DistcalcError::Compute(format!("invalid operand '{}'", self.lhs)))?;
        let rhs = literal_value(&self.rhs)
            .ok_or_else(|| DistcalcError::Compute(format!("invalid operand '{}'", self.rhs)))?;

        self.op.apply(lhs, rhs).ok_or_else(|| {
            if self.op == Operator::Div && rhs == 0.0 {
                DistcalcError::Compute(format!("division by zero in '{}'", self))
            } else {
                DistcalcError::Compute(format!("result of '{}' is not finite", self))
            }
        })
    }

    fn matches(&self, window: &[Token]) -> bool {
        match window {
            [Token::Number(lhs), Token::Number(rhs), Token::Op(op)] => {
                *lhs == self.lhs && *rhs == self.rhs && *op == self.op
            }
            _ => false,
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.rhs, self.op)
    }
}

impl FromStr for Fragment {
    type Err = DistcalcError;

    /// Parses the canonical `"operand1 operand2 operator"` form.
    fn from_str(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(' ').collect();
        let (lhs, rhs, op) = match parts.as_slice() {
            [lhs, rhs, op] => (*lhs, *rhs, *op),
            _ => {
                return Err(DistcalcError::Protocol(format!(
                    "fragment '{}' must be 'operand1 operand2 operator'",
                    text
                )))
            }
        };

        if !is_literal(lhs) || !is_literal(rhs) {
            return Err(DistcalcError::Protocol(format!(
                "fragment '{}' has a non-numeric operand",
                text
            )));
        }

        let mut op_chars = op.chars();
        let op = match (op_chars.next().and_then(Operator::from_char), op_chars.next()) {
            (Some(op), None) => op,
            _ => {
                return Err(DistcalcError::Protocol(format!(
                    "fragment '{}' has an unknown operator",
                    text
                )))
            }
        };

        Ok(Fragment::new(lhs, rhs, op))
    }
}

impl Postfix {
    /// Extracts the current frontier.
    ///
    /// Scans left to right with a stack of entries that are either literals
    /// or unresolved results. An operator whose two popped entries are both
    /// literals yields a fragment; either way it pushes an unresolved entry,
    /// so operations depending on pending results wait for a later pass.
    ///
    /// Duplicate fragments are returned as often as they occur; suppressing
    /// them is the store's job.
    ///
    /// # Errors
    ///
    /// [`DistcalcError::MalformedResidual`] if an operator lacks operands, or
    /// if the pass finds nothing to compute while the residual is not yet a
    /// single literal.
    pub fn frontier(&self) -> Result<Vec<Fragment>> {
        let mut stack: Vec<Option<&str>> = Vec::new();
        let mut fragments = Vec::new();

        for token in self.tokens() {
            match token {
                Token::Number(literal) => stack.push(Some(literal.as_str())),
                Token::Op(op) => match (stack.pop(), stack.pop()) {
                    (Some(rhs), Some(lhs)) => {
                        if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                            fragments.push(Fragment::new(lhs, rhs, *op));
                        }
                        stack.push(None);
                    }
                    _ => {
                        return Err(DistcalcError::MalformedResidual(format!(
                            "not enough operands for operator {} in '{}'",
                            op, self
                        )))
                    }
                },
                Token::LParen | Token::RParen => {
                    return Err(DistcalcError::MalformedResidual(format!(
                        "parenthesis in postfix expression '{}'",
                        self
                    )))
                }
            }
        }

        if fragments.is_empty() && self.single_value().is_none() {
            return Err(DistcalcError::MalformedResidual(format!(
                "no computable operation in '{}'",
                self
            )));
        }

        Ok(fragments)
    }

    /// Replaces the first window matching `fragment` with the literal form of
    /// `value`.
    ///
    /// Returns `false` and leaves the residual untouched when no window
    /// matches (the result is stale).
    pub fn substitute(&mut self, fragment: &Fragment, value: f64) -> bool {
        let position = self.tokens().windows(3).position(|w| fragment.matches(w));
        match position {
            Some(start) => {
                self.tokens_mut()
                    .splice(start..start + 3, [Token::number(format_number(value))]);
                true
            }
            None => false,
        }
    }
}
