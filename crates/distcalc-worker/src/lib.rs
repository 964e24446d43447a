//! Distcalc Worker
//!
//! A pool of compute loops that pull atomic subtasks from the orchestrator,
//! wait out an operator-dependent delay, evaluate and report back. Workers
//! keep no state between subtasks and never talk to each other.

pub mod config;
pub mod cost;
pub mod worker;

pub use config::{RetryConfig, WorkerConfig};
pub use cost::CostModel;
pub use worker::{Worker, WorkerHandle};
