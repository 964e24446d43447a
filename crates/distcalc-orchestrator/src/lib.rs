//! Distcalc Orchestrator
//!
//! Accepts expressions, splits them into atomic subtasks, hands those out to
//! polling workers and folds the reported results back in.
//!
//! - [`store`] - repository collaborator and the lock-guarded [`TaskStore`]
//! - [`reducer`] - substitution and re-decomposition after each result
//! - [`lease_reaper`] - requeues subtasks whose worker went silent
//! - [`orchestrator`] - the [`Orchestrator`] facade used by the HTTP layer
//! - [`http_server`] / [`http_router`] - the axum API

pub mod http_router;
pub mod http_server;
pub mod lease_reaper;
pub mod model;
pub mod orchestrator;
pub mod reducer;
pub mod store;

pub use http_server::HttpServer;
pub use lease_reaper::{LeaseConfig, LeaseReaper};
pub use model::{Subtask, SubtaskKey, Task};
pub use orchestrator::Orchestrator;
pub use store::{Changeset, MemoryRepository, ReportOutcome, SubtaskChange, TaskRepository, TaskStore};
