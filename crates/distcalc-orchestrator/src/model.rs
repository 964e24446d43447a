use std::time::Instant;

use distcalc_common::expr::{compile, Fragment, Postfix};
use distcalc_common::protocol::{SubtaskPayload, SubtaskStatus, TaskId, TaskStatus, TaskView};
use distcalc_common::Result;

/// Identifies a subtask: parent task plus canonical fragment.
pub type SubtaskKey = (TaskId, Fragment);

/// A submitted expression and its reduction state.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    pub original_expression: String,
    /// Infix rendering of `residual`
    pub expression: String,
    pub residual: Postfix,
    pub result: Option<f64>,
    pub owner: Option<String>,
}

impl Task {
    /// Compiles `expression` into a new `Pending` task.
    ///
    /// # Errors
    ///
    /// Syntax errors and bare literals are rejected before anything is
    /// stored.
    pub fn compile(id: TaskId, expression: &str, owner: Option<String>) -> Result<Self> {
        let residual = compile(expression)?;
        Ok(Self {
            id,
            status: TaskStatus::Pending,
            original_expression: expression.to_string(),
            expression: residual.to_infix()?,
            residual,
            result: None,
            owner,
        })
    }

    /// Whether `caller` may see this task.
    ///
    /// Anonymous callers (authentication disabled) see every task.
    pub fn visible_to(&self, caller: Option<&str>) -> bool {
        match caller {
            None => true,
            Some(caller) => self.owner.as_deref() == Some(caller),
        }
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id,
            status: self.status,
            original_expression: self.original_expression.clone(),
            expression: self.expression.clone(),
            result: self.result,
            owner: self.owner.clone(),
        }
    }
}

/// One atomic operation waiting for, or assigned to, a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Subtask {
    pub task_id: TaskId,
    pub fragment: Fragment,
    pub status: SubtaskStatus,
    /// Enqueue order across all tasks
    pub seq: u64,
    /// Lease start while `Assigned`
    pub assigned_at: Option<Instant>,
}

impl Subtask {
    pub fn waiting(task_id: TaskId, fragment: Fragment, seq: u64) -> Self {
        Self {
            task_id,
            fragment,
            status: SubtaskStatus::Waiting,
            seq,
            assigned_at: None,
        }
    }

    pub fn key(&self) -> SubtaskKey {
        (self.task_id, self.fragment.clone())
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, SubtaskStatus::Waiting | SubtaskStatus::Assigned)
    }

    pub fn payload(&self) -> SubtaskPayload {
        SubtaskPayload::assigned(self.task_id, self.fragment.to_string())
    }
}
