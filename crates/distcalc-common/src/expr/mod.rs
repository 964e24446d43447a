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

//! Expression engine
//!
//! The pipeline an expression goes through on submission:
//!
//! 1. [`tokenize`] splits the text into literals, operators and parentheses
//! 2. [`validate`] checks operator and parenthesis placement
//! 3. [`to_postfix`] converts to reverse Polish order
//!
//! [`compile`] runs all three and rejects bare literals. The resulting
//! [`Postfix`] residual is then reduced step by step: [`Postfix::frontier`]
//! yields the computable [`Fragment`]s and [`Postfix::substitute`] folds a
//! computed value back in.
//!
//! # Example
//!
//! ```
//! use distcalc_common::expr::compile;
//!
//! let mut residual = compile("2+2*2").unwrap();
//! assert_eq!(residual.to_string(), "2 2 2 * +");
//!
//! let frontier = residual.frontier().unwrap();
//! assert_eq!(frontier.len(), 1);
//!
//! let value = frontier[0].evaluate().unwrap();
//! assert!(residual.substitute(&frontier[0], value));
//! assert_eq!(residual.to_infix().unwrap(), "(2 + 4)");
//! ```

mod frontier;
mod postfix;
mod token;
mod validate;

pub use frontier::Fragment;
pub use postfix::{to_postfix, Postfix};
pub use token::{format_number, is_literal, literal_value, tokenize, Lexeme, Operator, Token};
pub use validate::validate;

use crate::error::{DistcalcError, Result};

/// Compiles an infix expression into its postfix residual.
///
/// # Errors
///
/// - [`DistcalcError::Syntax`] if tokenizing, validation or conversion fails
/// - [`DistcalcError::NotAnExpression`] if the input holds no operator
pub fn compile(input: &str) -> Result<Postfix> {
    let lexemes = tokenize(input)?;
    validate(&lexemes)?;

    if !lexemes.iter().any(|l| l.token.is_operator()) {
        return Err(DistcalcError::NotAnExpression);
    }

    Ok(to_postfix(&lexemes)?)
}
