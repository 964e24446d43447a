//! Subtask payloads
//!
//! A subtask is one atomic binary operation, carried on the wire as its
//! canonical fragment text `"operand1 operand2 operator"`.

use serde::{Deserialize, Serialize};

use super::TaskId;

/// State of a subtask inside the orchestrator.
///
/// Only `Waiting` and `Assigned` are ever stored. `Finished` and `Error` name
/// the outcome of a report; the store removes a reported subtask instead of
/// keeping it in either state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SubtaskStatus {
    Waiting,
    #[serde(rename = "In Process")]
    Assigned,
    Finished,
    Error,
}

/// Subtask handed to a worker by `GET /internal/task`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtaskPayload {
    pub task_id: TaskId,
    #[serde(rename = "RPN_string")]
    pub fragment: String,
    pub status: SubtaskStatus,
    pub result: f64,
}

impl SubtaskPayload {
    /// Creates the payload for a freshly assigned subtask.
    pub fn assigned(task_id: TaskId, fragment: impl Into<String>) -> Self {
        Self {
            task_id,
            fragment: fragment.into(),
            status: SubtaskStatus::Assigned,
            result: 0.0,
        }
    }
}

/// Outcome a worker may report. Any other status string fails to decode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReportStatus {
    Finished,
    Error,
}

/// Body of `POST /internal/task`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultReport {
    pub task_id: TaskId,
    #[serde(rename = "RPN_string")]
    pub fragment: String,
    pub status: ReportStatus,
    #[serde(default)]
    pub result: f64,
}

impl ResultReport {
    pub fn finished(task_id: TaskId, fragment: impl Into<String>, result: f64) -> Self {
        Self {
            task_id,
            fragment: fragment.into(),
            status: ReportStatus::Finished,
            result,
        }
    }

    pub fn error(task_id: TaskId, fragment: impl Into<String>) -> Self {
        Self {
            task_id,
            fragment: fragment.into(),
            status: ReportStatus::Error,
            result: 0.0,
        }
    }
}
