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

use thiserror::Error;

use crate::protocol::TaskId;

/// Syntax errors reported by the tokenizer, validator and postfix converter.
///
/// Positions are character offsets into the submitted expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("got empty expression")]
    Empty,

    #[error("invalid character '{ch}' at position {pos}")]
    InvalidCharacter { ch: char, pos: usize },

    #[error("invalid number '{literal}' at position {pos}")]
    InvalidNumber { literal: String, pos: usize },

    #[error("operator {op} at position {pos} is misplaced")]
    MisplacedOperator { op: char, pos: usize },

    #[error("missing operator before position {pos}")]
    MissingOperator { pos: usize },

    #[error("missing operand before ')' at position {pos}")]
    MissingOperand { pos: usize },

    #[error("unmatched closing parenthesis at position {pos}")]
    UnmatchedClosing { pos: usize },

    #[error("unmatched opening parenthesis")]
    UnmatchedOpening,

    #[error("mismatched parentheses")]
    MismatchedParentheses,

    #[error("expression ends with an operator")]
    TrailingOperator,
}

#[derive(Error, Debug)]
pub enum DistcalcError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("Not an expression: a bare number has nothing to compute")]
    NotAnExpression,

    #[error("Task {0} already exists")]
    Conflict(TaskId),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Compute error: {0}")]
    Compute(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Malformed residual expression: {0}")]
    MalformedResidual(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DistcalcError {
    /// Returns `true` for failures a caller may retry unchanged.
    ///
    /// Only transient transport and storage failures qualify. Compute errors
    /// are terminal for their task and validation/protocol errors will fail
    /// the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DistcalcError::Transport(_) | DistcalcError::Timeout(_) | DistcalcError::Storage(_)
        )
    }

    /// Returns `true` if this error rejects the submitted expression itself.
    pub fn is_validation(&self) -> bool {
        matches!(self, DistcalcError::Syntax(_) | DistcalcError::NotAnExpression)
    }
}

impl From<std::net::AddrParseError> for DistcalcError {
    fn from(err: std::net::AddrParseError) -> Self {
        DistcalcError::Protocol(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DistcalcError>;
