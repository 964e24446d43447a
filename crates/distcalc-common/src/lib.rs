//! Distcalc Common Types
//!
//! Shared building blocks for the distcalc distributed calculator.
//!
//! # Overview
//!
//! An orchestrator accepts arithmetic expressions, splits them into atomic
//! binary operations and hands those out to a pool of workers over HTTP.
//! Results flow back into the orchestrator, which substitutes them into the
//! residual expression until a single value remains. This crate holds the
//! pieces every component agrees on:
//!
//! - [`protocol`] - JSON wire types for tasks, subtasks and result reports
//! - [`expr`] - tokenizer, validator, postfix converter, frontier decomposer
//! - [`auth`] - API key to owner resolution
//! - [`error`] - the [`DistcalcError`] type shared by all crates
//!
//! # Example
//!
//! ```
//! use distcalc_common::expr::compile;
//! use distcalc_common::SubtaskPayload;
//!
//! let residual = compile("(1+2)*(3+4)").unwrap();
//! let frontier = residual.frontier().unwrap();
//!
//! let payload = SubtaskPayload::assigned(1, frontier[0].to_string());
//! assert_eq!(payload.fragment, "1 2 +");
//! ```

pub mod auth;
pub mod error;
pub mod expr;
pub mod protocol;

pub use error::{DistcalcError, Result, SyntaxError};
pub use protocol::*;
