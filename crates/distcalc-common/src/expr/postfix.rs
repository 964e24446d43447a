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

//! Postfix (reverse Polish) form of an expression.
//!
//! [`to_postfix`] is the shunting-yard conversion from validated infix
//! tokens. A [`Postfix`] holds only literals and operators and is the form
//! the orchestrator reduces; [`Postfix::to_infix`] renders it back for
//! display.

use std::fmt;

use crate::error::{DistcalcError, Result, SyntaxError};

use super::token::{is_literal, literal_value, Lexeme, Operator, Token};

/// A postfix token sequence containing only literals and operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Postfix {
    tokens: Vec<Token>,
}

impl Postfix {
    /// Parses a space-separated postfix string such as `"2 2 2 * +"`.
    ///
    /// Only checks that every token is a literal or an operator; structural
    /// problems surface from [`Postfix::to_infix`] or the decomposer.
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = text
            .split_whitespace()
            .map(|word| {
                let mut chars = word.chars();
                match (chars.next().and_then(Operator::from_char), chars.next()) {
                    (Some(op), None) => Ok(Token::Op(op)),
                    _ if is_literal(word) => Ok(Token::number(word)),
                    _ => Err(DistcalcError::MalformedResidual(format!(
                        "unexpected token '{}' in '{}'",
                        word, text
                    ))),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { tokens })
    }

    pub(crate) fn from_tokens(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub(crate) fn tokens_mut(&mut self) -> &mut Vec<Token> {
        &mut self.tokens
    }

    pub fn operator_count(&self) -> usize {
        self.tokens.iter().filter(|t| t.is_operator()).count()
    }

    /// Returns the value if the residual has been reduced to one literal.
    pub fn single_value(&self) -> Option<f64> {
        match self.tokens.as_slice() {
            [Token::Number(literal)] => literal_value(literal),
            _ => None,
        }
    }

    /// Renders the residual as fully parenthesised infix text.
    ///
    /// Every operation becomes `(lhs op rhs)`; a single literal renders as
    /// itself.
    pub fn to_infix(&self) -> Result<String> {
        let mut stack: Vec<String> = Vec::new();

        for token in &self.tokens {
            match token {
                Token::Number(literal) => stack.push(literal.clone()),
                Token::Op(op) => {
                    let (rhs, lhs) = match (stack.pop(), stack.pop()) {
                        (Some(rhs), Some(lhs)) => (rhs, lhs),
                        _ => {
                            return Err(DistcalcError::MalformedResidual(format!(
                                "not enough operands for operator {} in '{}'",
                                op, self
                            )))
                        }
                    };
                    stack.push(format!("({} {} {})", lhs, op, rhs));
                }
                Token::LParen | Token::RParen => {
                    return Err(DistcalcError::MalformedResidual(format!(
                        "parenthesis in postfix expression '{}'",
                        self
                    )))
                }
            }
        }

        match stack.len() {
            1 => Ok(stack.pop().unwrap_or_default()),
            n => Err(DistcalcError::MalformedResidual(format!(
                "stack has {} elements after processing '{}'",
                n, self
            ))),
        }
    }
}

impl fmt::Display for Postfix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

/// Converts validated infix tokens to postfix with the shunting-yard
/// algorithm.
///
/// All operators are left-associative, so an operator on the stack is popped
/// while its precedence is greater than or equal to the incoming one.
pub fn to_postfix(lexemes: &[Lexeme]) -> std::result::Result<Postfix, SyntaxError> {
    let mut output: Vec<Token> = Vec::with_capacity(lexemes.len());
    let mut operators: Vec<Token> = Vec::new();

    for lexeme in lexemes {
        match &lexeme.token {
            Token::Number(_) => output.push(lexeme.token.clone()),
            Token::LParen => operators.push(Token::LParen),
            Token::RParen => loop {
                match operators.pop() {
                    Some(Token::LParen) => break,
                    Some(token) => output.push(token),
                    None => return Err(SyntaxError::MismatchedParentheses),
                }
            },
            Token::Op(incoming) => {
                while let Some(Token::Op(top)) = operators.last() {
                    let pops = if incoming.is_left_associative() {
                        top.precedence() >= incoming.precedence()
                    } else {
                        top.precedence() > incoming.precedence()
                    };
                    if !pops {
                        break;
                    }
                    output.push(Token::Op(*top));
                    operators.pop();
                }
                operators.push(Token::Op(*incoming));
            }
        }
    }

    while let Some(token) = operators.pop() {
        if token == Token::LParen {
            return Err(SyntaxError::MismatchedParentheses);
        }
        output.push(token);
    }

    Ok(Postfix::from_tokens(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::token::tokenize;

    fn rpn(input: &str) -> String {
        to_postfix(&tokenize(input).unwrap()).unwrap().to_string()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(rpn("2+2*2"), "2 2 2 * +");
        assert_eq!(rpn("2*2+2"), "2 2 * 2 +");
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(rpn("8-3-2"), "8 3 - 2 -");
        assert_eq!(rpn("8/4/2"), "8 4 / 2 /");
        assert_eq!(rpn("8/4*2"), "8 4 / 2 *");
    }

    #[test]
    fn test_parentheses() {
        assert_eq!(rpn("(2+2)*2"), "2 2 + 2 *");
        assert_eq!(rpn("(1+2)*(3+4)"), "1 2 + 3 4 + *");
        assert_eq!(rpn("((5))"), "5");
    }

    #[test]
    fn test_negative_and_decimal_literals() {
        assert_eq!(rpn("-3*(2.5--1)"), "-3 2.5 -1 - *");
    }

    #[test]
    fn test_mismatched_parentheses() {
        assert_eq!(
            to_postfix(&tokenize("(2+3").unwrap()),
            Err(SyntaxError::MismatchedParentheses)
        );
        assert_eq!(
            to_postfix(&tokenize("2+3)").unwrap()),
            Err(SyntaxError::MismatchedParentheses)
        );
    }

    #[test]
    fn test_parse_and_display() {
        let postfix = Postfix::parse("2  4 +").unwrap();
        assert_eq!(postfix.to_string(), "2 4 +");
        assert_eq!(postfix.operator_count(), 1);
        assert!(Postfix::parse("2 x +").is_err());
    }

    #[test]
    fn test_parse_negative_literal_vs_operator() {
        let postfix = Postfix::parse("-2 3 -").unwrap();
        assert_eq!(
            postfix.tokens(),
            &[
                Token::number("-2"),
                Token::number("3"),
                Token::Op(Operator::Sub)
            ]
        );
    }

    #[test]
    fn test_to_infix() {
        assert_eq!(
            Postfix::parse("2 2 2 * +").unwrap().to_infix().unwrap(),
            "(2 + (2 * 2))"
        );
        assert_eq!(Postfix::parse("2 4 +").unwrap().to_infix().unwrap(), "(2 + 4)");
        assert_eq!(Postfix::parse("6").unwrap().to_infix().unwrap(), "6");
    }

    #[test]
    fn test_to_infix_malformed() {
        assert!(matches!(
            Postfix::parse("2 +").unwrap().to_infix(),
            Err(DistcalcError::MalformedResidual(_))
        ));
        assert!(matches!(
            Postfix::parse("2 3").unwrap().to_infix(),
            Err(DistcalcError::MalformedResidual(_))
        ));
    }

    #[test]
    fn test_single_value() {
        assert_eq!(Postfix::parse("6").unwrap().single_value(), Some(6.0));
        assert_eq!(Postfix::parse("-2.5").unwrap().single_value(), Some(-2.5));
        assert_eq!(Postfix::parse("2 4 +").unwrap().single_value(), None);
    }
}
