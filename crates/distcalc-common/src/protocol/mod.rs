//! Distcalc wire protocol
//!
//! JSON payloads exchanged between clients, the orchestrator and workers.
//!
//! - [`task`] - task submission and the task record returned by queries
//! - [`subtask`] - subtasks handed to workers and the results they report

pub mod subtask;
pub mod task;


pub use subtask::{ReportStatus, ResultReport, SubtaskPayload, SubtaskStatus};
pub use task::{SubmitTask, TaskId, TaskStatus, TaskView};
