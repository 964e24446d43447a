//! Reducer
//!
//! Folds one worker result into a task. The reducer works on a task value
//! only; the [`TaskStore`](crate::store::TaskStore) calls it under its write
//! lock and turns the returned [`Step`] into a changeset.

use distcalc_common::expr::Fragment;
use distcalc_common::protocol::TaskStatus;
use distcalc_common::{DistcalcError, Result};
use tracing::{debug, warn};

use crate::model::Task;

/// What a single reduction did to the task.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The residual collapsed to a single literal
    Finished(f64),
    /// More work is computable; the next frontier, duplicates included
    Continue(Vec<Fragment>),
    /// The fragment's window is no longer in the residual
    Stale,
}

/// Substitutes `value` for `fragment` in the task's residual.
///
/// On success the infix expression is re-rendered and the task is either
/// finished or decomposed again.
///
/// # Errors
///
/// [`DistcalcError::Compute`] for a non-finite value and
/// [`DistcalcError::MalformedResidual`] if the residual can no longer be
/// decomposed. In both cases the task is left untouched and the caller is
/// expected to fail it.
pub fn apply_result(task: &mut Task, fragment: &Fragment, value: f64) -> Result<Step> {
    if !value.is_finite() {
        return Err(DistcalcError::Compute(format!(
            "non-finite result {} for '{}'",
            value, fragment
        )));
    }

    let mut residual = task.residual.clone();
    if !residual.substitute(fragment, value) {
        warn!(
            "Task {}: result for '{}' no longer matches residual '{}'",
            task.id, fragment, residual
        );
        return Ok(Step::Stale);
    }

    let expression = residual.to_infix()?;

    if let Some(result) = residual.single_value() {
        task.residual = residual;
        task.expression = expression;
        task.status = TaskStatus::Finished;
        task.result = Some(result);
        return Ok(Step::Finished(result));
    }

    let frontier = residual.frontier()?;
    debug!("Task {}: residual '{}', {} fragments computable", task.id, residual, frontier.len());

    task.residual = residual;
    task.expression = expression;
    Ok(Step::Continue(frontier))
}

/// Marks a task as failed.
pub fn fail(task: &mut Task) {
    task.status = TaskStatus::Error;
    task.result = None;
}
