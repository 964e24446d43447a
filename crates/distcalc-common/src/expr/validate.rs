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

//! Syntactic validation of a token stream.
//!
//! Checked left to right while tracking parenthesis balance:
//! - an operator may not come first, nor follow an operator or `(`
//! - `(` may not follow a literal or `)`
//! - `)` needs an open parenthesis and may not follow `(` or an operator
//! - a literal may not follow a literal or `)`
//! - at the end the balance must be zero and the last token not an operator

use crate::error::SyntaxError;

use super::token::{Lexeme, Token};

/// Validates a tokenized infix expression.
pub fn validate(lexemes: &[Lexeme]) -> Result<(), SyntaxError> {
    if lexemes.is_empty() {
        return Err(SyntaxError::Empty);
    }

    let mut balance: usize = 0;
    let mut previous: Option<&Token> = None;

    for lexeme in lexemes {
        let pos = lexeme.pos;
        match &lexeme.token {
            Token::Op(op) => {
                if matches!(previous, None | Some(Token::Op(_)) | Some(Token::LParen)) {
                    return Err(SyntaxError::MisplacedOperator {
                        op: op.symbol(),
                        pos,
                    });
                }
            }
            Token::LParen => {
                if matches!(previous, Some(Token::Number(_)) | Some(Token::RParen)) {
                    return Err(SyntaxError::MissingOperator { pos });
                }
                balance += 1;
            }
            Token::RParen => {
                if balance == 0 {
                    return Err(SyntaxError::UnmatchedClosing { pos });
                }
                if matches!(previous, Some(Token::LParen) | Some(Token::Op(_))) {
                    return Err(SyntaxError::MissingOperand { pos });
                }
                balance -= 1;
            }
            Token::Number(_) => {
                if matches!(previous, Some(Token::Number(_)) | Some(Token::RParen)) {
                    return Err(SyntaxError::MissingOperator { pos });
                }
            }
        }
        previous = Some(&lexeme.token);
    }

    if balance != 0 {
        return Err(SyntaxError::UnmatchedOpening);
    }

    if matches!(previous, Some(Token::Op(_))) {
        return Err(SyntaxError::TrailingOperator);
    }

    Ok(())
}
