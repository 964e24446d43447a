use std::sync::Arc;
use std::time::Instant;

use distcalc_common::expr::Fragment;
use distcalc_common::protocol::{ResultReport, SubmitTask, SubtaskPayload, TaskId, TaskView};
use distcalc_common::{DistcalcError, Result};
use tracing::{error, info};

use crate::lease_reaper::{LeaseConfig, LeaseReaper};
use crate::model::Task;
use crate::store::{ReportOutcome, TaskStore};

/// Distcalc Orchestrator - decomposes expressions and coordinates workers.
///
/// The orchestrator never computes anything itself. Its responsibilities are:
///
/// 1. **Validation**: reject malformed expressions before they are stored
/// 2. **Decomposition**: enqueue every operation whose operands are known
/// 3. **Dispatch**: hand each queued subtask to exactly one polling worker
/// 4. **Reduction**: fold results back in and enqueue the next frontier
/// 5. **Lease recovery**: requeue subtasks whose worker went silent
///
/// All state lives in one [`TaskStore`]; this type adds request validation,
/// owner scoping and the background lease reaper.
pub struct Orchestrator {
    store: Arc<TaskStore>,
    lease_config: LeaseConfig,
    /// Background lease reaper, aborted on drop
    lease_reaper_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Orchestrator {
    /// Creates an orchestrator with an in-memory store and default leases.
    ///
    /// Must be called from within a tokio runtime since the lease reaper is
    /// spawned immediately.
    ///
    /// # Example
    /// ```no_run
    /// # use distcalc_orchestrator::Orchestrator;
    /// # use distcalc_common::SubmitTask;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let orchestrator = Orchestrator::new();
    /// orchestrator.submit(SubmitTask::new(1, "2+2*2"), None).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new() -> Self {
        Self::with_config(LeaseConfig::default())
    }

    /// Creates an orchestrator with an in-memory store and custom leases.
    pub fn with_config(lease_config: LeaseConfig) -> Self {
        Self::with_store(Arc::new(TaskStore::in_memory()), lease_config)
    }

    /// Creates an orchestrator over an existing store.
    ///
    /// # Arguments
    /// * `store` - Task store, possibly backed by a custom repository
    /// * `lease_config` - Lease configuration; no reaper runs if disabled or
    ///   if [`LeaseConfig::validate`] rejects it
    pub fn with_store(store: Arc<TaskStore>, lease_config: LeaseConfig) -> Self {
        let lease_reaper_handle = match lease_config.validate() {
            Ok(()) if lease_config.enabled => {
                let reaper = LeaseReaper::new(store.clone(), lease_config.clone());
                Some(reaper.spawn())
            }
            Ok(()) => None,
            Err(e) => {
                error!("Lease reaper not started: {}", e);
                None
            }
        };

        info!(
            "Orchestrator initialized (lease timeout {:?}, reaper {})",
            lease_config.lease_timeout,
            if lease_config.enabled { "enabled" } else { "disabled" }
        );

        Self {
            store,
            lease_config,
            lease_reaper_handle,
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn lease_config(&self) -> &LeaseConfig {
        &self.lease_config
    }

    /// Validates and stores a new task.
    ///
    /// # Arguments
    /// * `request` - Caller-chosen id and infix expression
    /// * `owner` - Authenticated caller, `None` when authentication is off
    ///
    /// # Returns
    /// - `Ok(())` - Task stored and its first subtasks enqueued
    /// - `Err(DistcalcError::Syntax)` / `Err(NotAnExpression)` - Invalid input
    /// - `Err(DistcalcError::Conflict)` - The id is already taken
    pub async fn submit(&self, request: SubmitTask, owner: Option<String>) -> Result<()> {
        let task = Task::compile(request.id, &request.expression, owner)?;
        self.store.create(task).await?;
        Ok(())
    }

    /// Takes the oldest waiting subtask, or `None` if there is no work.
    ///
    /// Never waits for work to appear.
    pub async fn request_subtask(&self) -> Result<Option<SubtaskPayload>> {
        let subtask = self.store.dispatch(Instant::now()).await?;
        Ok(subtask.map(|s| s.payload()))
    }

    /// Accepts a worker report and reduces it in the background.
    ///
    /// The report is checked synchronously; the reduction itself runs on a
    /// spawned task so the worker is acknowledged immediately.
    ///
    /// # Errors
    ///
    /// [`DistcalcError::Protocol`] if the fragment is not a canonical
    /// `"operand1 operand2 operator"` string.
    pub fn report_result(&self, report: ResultReport) -> Result<()> {
        let fragment: Fragment = report.fragment.parse()?;
        let store = self.store.clone();

        tokio::spawn(async move {
            if let Err(e) = store
                .apply_report(report.task_id, &fragment, report.status, report.result)
                .await
            {
                error!(
                    "Failed to apply report for '{}' of task {}: {}",
                    fragment, report.task_id, e
                );
            }
        });

        Ok(())
    }

    /// Applies a worker report and waits for the reduction to finish.
    pub async fn apply_report(&self, report: ResultReport) -> Result<ReportOutcome> {
        let fragment: Fragment = report.fragment.parse()?;
        self.store
            .apply_report(report.task_id, &fragment, report.status, report.result)
            .await
    }

    /// Looks up one task as seen by `caller`.
    ///
    /// A task owned by someone else is reported as not found.
    pub async fn task(&self, id: TaskId, caller: Option<&str>) -> Result<TaskView> {
        match self.store.task(id).await? {
            Some(task) if task.visible_to(caller) => Ok(task.view()),
            _ => Err(DistcalcError::NotFound(format!("task {}", id))),
        }
    }

    /// Lists the tasks visible to `caller`, ordered by id.
    pub async fn tasks(&self, caller: Option<&str>) -> Result<Vec<TaskView>> {
        let tasks = self.store.tasks().await?;
        Ok(tasks
            .iter()
            .filter(|t| t.visible_to(caller))
            .map(Task::view)
            .collect())
    }

    /// Requeues assignments whose lease has run out at `now`.
    pub async fn requeue_expired(&self, now: Instant) -> Result<usize> {
        match now.checked_sub(self.lease_config.lease_timeout) {
            Some(deadline) => self.store.requeue_expired(deadline).await,
            None => Ok(0),
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(handle) = self.lease_reaper_handle.take() {
            handle.abort();
        }
    }
}
