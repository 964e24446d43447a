//! Task payloads
//!
//! A task is one submitted expression together with its reduction state.

use serde::{Deserialize, Serialize};

/// Caller-supplied task identifier
pub type TaskId = i64;

/// Body of a task submission (`POST /api/v1/calculate`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitTask {
    pub id: TaskId,
    pub expression: String,
}

impl SubmitTask {
    pub fn new(id: TaskId, expression: impl Into<String>) -> Self {
        Self {
            id,
            expression: expression.into(),
        }
    }
}

/// Lifecycle of a task.
///
/// `Finished` and `Error` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Accepted, no subtask handed out yet
    Pending,
    /// At least one subtask has been handed to a worker
    #[serde(rename = "In Process")]
    InProgress,
    /// Reduced to a single value, `result` is set
    Finished,
    /// A worker reported a compute failure
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Error)
    }
}

/// Task record as returned by the query endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskView {
    pub id: TaskId,
    pub status: TaskStatus,
    pub original_expression: String,
    /// Current (partially reduced) infix expression
    pub expression: String,
    /// Set only once the task is `Finished`
    pub result: Option<f64>,
    pub owner: Option<String>,
}
