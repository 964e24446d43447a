//! Task Store
//!
//! All orchestrator state lives behind one [`TaskStore`]. It owns a
//! [`TaskRepository`] under a `tokio::sync::RwLock` and exposes only complete
//! read-modify-write operations, each of which runs under the write lock and
//! ends in a single [`Changeset`] commit. Concurrent pulls can therefore never
//! receive the same subtask, and a result is never applied twice.
//!
//! # Repository contract
//!
//! [`TaskRepository::commit`] must validate the whole changeset before
//! touching anything, so a rejected commit leaves the repository exactly as it
//! was. [`MemoryRepository`] is the in-process implementation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use distcalc_common::expr::Fragment;
use distcalc_common::protocol::{ReportStatus, SubtaskStatus, TaskId, TaskStatus};
use distcalc_common::{DistcalcError, Result};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::model::{Subtask, SubtaskKey, Task};
use crate::reducer::{self, Step};

/// A single subtask mutation inside a [`Changeset`].
#[derive(Debug, Clone, PartialEq)]
pub enum SubtaskChange {
    /// Add a subtask whose key must not exist yet
    Insert(Subtask),
    /// Replace an existing subtask with the same key
    Update(Subtask),
    /// Delete an existing subtask
    Remove(SubtaskKey),
}

/// A batch of writes applied atomically by [`TaskRepository::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    /// Task upserts
    pub tasks: Vec<Task>,
    /// Subtask mutations, applied in order
    pub subtasks: Vec<SubtaskChange>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn insert(mut self, subtask: Subtask) -> Self {
        self.subtasks.push(SubtaskChange::Insert(subtask));
        self
    }

    pub fn update(mut self, subtask: Subtask) -> Self {
        self.subtasks.push(SubtaskChange::Update(subtask));
        self
    }

    pub fn remove(mut self, key: SubtaskKey) -> Self {
        self.subtasks.push(SubtaskChange::Remove(key));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.subtasks.is_empty()
    }
}

/// Persistence collaborator for tasks and subtasks.
///
/// Reads are keyed lookups; every write goes through [`commit`](Self::commit).
/// Implementations are called with the store's lock held and need no
/// synchronization of their own.
pub trait TaskRepository: Send + Sync {
    fn task(&self, id: TaskId) -> Result<Option<Task>>;

    /// All tasks, ordered by id.
    fn tasks(&self) -> Result<Vec<Task>>;

    fn subtask(&self, key: &SubtaskKey) -> Result<Option<Subtask>>;

    /// Subtasks of one task, in enqueue order.
    fn subtasks_of(&self, task_id: TaskId) -> Result<Vec<Subtask>>;

    /// The `Waiting` subtask with the lowest sequence number across all tasks.
    fn oldest_waiting(&self) -> Result<Option<Subtask>>;

    /// `Assigned` subtasks whose lease started before `deadline`.
    fn assigned_before(&self, deadline: Instant) -> Result<Vec<Subtask>>;

    /// Highest sequence number ever stored, if any.
    fn last_seq(&self) -> Result<Option<u64>>;

    /// Applies a changeset atomically.
    ///
    /// # Errors
    ///
    /// [`DistcalcError::Storage`] if any change is invalid (inserting an
    /// existing key, updating or removing a missing one, or inserting a
    /// subtask for an unknown task). Nothing is applied in that case.
    fn commit(&mut self, changes: Changeset) -> Result<()>;
}

/// In-memory [`TaskRepository`].
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tasks: BTreeMap<TaskId, Task>,
    subtasks: HashMap<SubtaskKey, Subtask>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(&self, changes: &Changeset) -> Result<()> {
        let upserted: HashSet<TaskId> = changes.tasks.iter().map(|t| t.id).collect();
        // Key presence as seen after the changes processed so far
        let mut overlay: HashMap<SubtaskKey, bool> = HashMap::new();

        for change in &changes.subtasks {
            let (key, wants_present, must_exist) = match change {
                SubtaskChange::Insert(subtask) => {
                    if !self.tasks.contains_key(&subtask.task_id)
                        && !upserted.contains(&subtask.task_id)
                    {
                        return Err(DistcalcError::Storage(format!(
                            "subtask '{}' references unknown task {}",
                            subtask.fragment, subtask.task_id
                        )));
                    }
                    (subtask.key(), true, false)
                }
                SubtaskChange::Update(subtask) => (subtask.key(), true, true),
                SubtaskChange::Remove(key) => (key.clone(), false, true),
            };

            let exists = overlay
                .get(&key)
                .copied()
                .unwrap_or_else(|| self.subtasks.contains_key(&key));

            if exists != must_exist {
                return Err(DistcalcError::Storage(format!(
                    "subtask '{}' of task {} {}",
                    key.1,
                    key.0,
                    if exists { "already exists" } else { "does not exist" }
                )));
            }

            overlay.insert(key, wants_present);
        }

        Ok(())
    }
}

impl TaskRepository for MemoryRepository {
    fn task(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.get(&id).cloned())
    }

    fn tasks(&self) -> Result<Vec<Task>> {
        Ok(self.tasks.values().cloned().collect())
    }

    fn subtask(&self, key: &SubtaskKey) -> Result<Option<Subtask>> {
        Ok(self.subtasks.get(key).cloned())
    }

    fn subtasks_of(&self, task_id: TaskId) -> Result<Vec<Subtask>> {
        let mut subtasks: Vec<Subtask> = self
            .subtasks
            .values()
            .filter(|s| s.task_id == task_id)
            .cloned()
            .collect();
        subtasks.sort_by_key(|s| s.seq);
        Ok(subtasks)
    }

    fn oldest_waiting(&self) -> Result<Option<Subtask>> {
        Ok(self
            .subtasks
            .values()
            .filter(|s| s.status == SubtaskStatus::Waiting)
            .min_by_key(|s| s.seq)
            .cloned())
    }

    fn assigned_before(&self, deadline: Instant) -> Result<Vec<Subtask>> {
        let mut expired: Vec<Subtask> = self
            .subtasks
            .values()
            .filter(|s| s.status == SubtaskStatus::Assigned)
            .filter(|s| s.assigned_at.map_or(false, |at| at < deadline))
            .cloned()
            .collect();
        expired.sort_by_key(|s| s.seq);
        Ok(expired)
    }

    fn last_seq(&self) -> Result<Option<u64>> {
        Ok(self.subtasks.values().map(|s| s.seq).max())
    }

    fn commit(&mut self, changes: Changeset) -> Result<()> {
        self.validate(&changes)?;

        for task in changes.tasks {
            self.tasks.insert(task.id, task);
        }

        for change in changes.subtasks {
            match change {
                SubtaskChange::Insert(subtask) | SubtaskChange::Update(subtask) => {
                    self.subtasks.insert(subtask.key(), subtask);
                }
                SubtaskChange::Remove(key) => {
                    self.subtasks.remove(&key);
                }
            }
        }

        Ok(())
    }
}

/// Result of applying a worker report.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    /// No matching assigned subtask; duplicate or late report
    Ignored,
    /// The subtask matched but its window had already gone from the residual
    Stale,
    /// Result substituted; `enqueued` new subtasks were added
    Continued { enqueued: usize },
    /// The task reduced to its final value
    Finished(f64),
    /// The task is now in `Error` and its subtasks were discarded
    Failed,
}

struct StoreState {
    repository: Box<dyn TaskRepository>,
    next_seq: u64,
}

impl StoreState {
    /// Appends inserts for every fragment not already active for the task.
    ///
    /// # Returns
    ///
    /// The changeset and the number of subtasks added.
    fn enqueue(
        &mut self,
        mut changes: Changeset,
        task_id: TaskId,
        fragments: Vec<Fragment>,
        active: &HashSet<Fragment>,
    ) -> (Changeset, usize) {
        let mut seen: HashSet<Fragment> = HashSet::new();
        let mut enqueued = 0;

        for fragment in fragments {
            if active.contains(&fragment) || !seen.insert(fragment.clone()) {
                continue;
            }
            changes = changes.insert(Subtask::waiting(task_id, fragment, self.next_seq));
            self.next_seq += 1;
            enqueued += 1;
        }

        (changes, enqueued)
    }

    /// Builds the removals for every subtask of a task.
    fn discard_all(&self, mut changes: Changeset, task_id: TaskId) -> Result<Changeset> {
        for subtask in self.repository.subtasks_of(task_id)? {
            changes = changes.remove(subtask.key());
        }
        Ok(changes)
    }
}

/// Lock-guarded task state shared by the HTTP handlers, spawned reductions
/// and the lease reaper.
pub struct TaskStore {
    state: RwLock<StoreState>,
}

impl TaskStore {
    /// Creates a store over `repository`.
    ///
    /// Sequence numbers continue after the highest one the repository
    /// already holds.
    pub fn new(repository: Box<dyn TaskRepository>) -> Result<Self> {
        let next_seq = repository.last_seq()?.map_or(0, |seq| seq + 1);
        Ok(Self {
            state: RwLock::new(StoreState {
                repository,
                next_seq,
            }),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(StoreState {
                repository: Box::new(MemoryRepository::new()),
                next_seq: 0,
            }),
        }
    }

    /// Stores a freshly compiled task and enqueues its first frontier.
    ///
    /// # Returns
    ///
    /// The number of subtasks enqueued.
    ///
    /// # Errors
    ///
    /// - [`DistcalcError::Conflict`] if the id is taken; nothing changes
    /// - [`DistcalcError::MalformedResidual`] if the task can not be decomposed
    pub async fn create(&self, task: Task) -> Result<usize> {
        let mut state = self.state.write().await;

        if state.repository.task(task.id)?.is_some() {
            return Err(DistcalcError::Conflict(task.id));
        }

        let frontier = task.residual.frontier()?;
        let task_id = task.id;
        let (changes, enqueued) =
            state.enqueue(Changeset::new().put_task(task), task_id, frontier, &HashSet::new());
        state.repository.commit(changes)?;

        info!("Task {} accepted, {} subtasks enqueued", task_id, enqueued);
        Ok(enqueued)
    }

    /// Hands out the oldest waiting subtask, if any.
    ///
    /// The subtask becomes `Assigned` with its lease starting at `now`, and a
    /// `Pending` parent task moves to `InProgress`.
    pub async fn dispatch(&self, now: Instant) -> Result<Option<Subtask>> {
        let mut state = self.state.write().await;

        let mut subtask = match state.repository.oldest_waiting()? {
            Some(subtask) => subtask,
            None => return Ok(None),
        };
        subtask.status = SubtaskStatus::Assigned;
        subtask.assigned_at = Some(now);

        let mut changes = Changeset::new().update(subtask.clone());
        if let Some(mut task) = state.repository.task(subtask.task_id)? {
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::InProgress;
                changes = changes.put_task(task);
            }
        }
        state.repository.commit(changes)?;

        debug!("Dispatched '{}' of task {}", subtask.fragment, subtask.task_id);
        Ok(Some(subtask))
    }

    /// Applies a worker report.
    ///
    /// Only a report for a currently `Assigned` subtask has any effect;
    /// anything else is [`ReportOutcome::Ignored`].
    pub async fn apply_report(
        &self,
        task_id: TaskId,
        fragment: &Fragment,
        status: ReportStatus,
        value: f64,
    ) -> Result<ReportOutcome> {
        let mut state = self.state.write().await;
        let key: SubtaskKey = (task_id, fragment.clone());

        match state.repository.subtask(&key)? {
            Some(subtask) if subtask.status == SubtaskStatus::Assigned => {}
            _ => {
                debug!("Ignoring report for '{}' of task {}: not assigned", fragment, task_id);
                return Ok(ReportOutcome::Ignored);
            }
        }

        let mut task = match state.repository.task(task_id)? {
            Some(task) if !task.status.is_terminal() => task,
            _ => {
                state.repository.commit(Changeset::new().remove(key))?;
                return Ok(ReportOutcome::Ignored);
            }
        };

        let step = match status {
            ReportStatus::Error => Err(DistcalcError::Compute(format!(
                "worker failed to compute '{}'",
                fragment
            ))),
            ReportStatus::Finished => reducer::apply_result(&mut task, fragment, value),
        };

        let outcome = match step {
            Ok(Step::Finished(result)) => {
                let changes = state.discard_all(Changeset::new(), task_id)?;
                state.repository.commit(changes.put_task(task))?;
                info!("Task {} finished with result {}", task_id, result);
                ReportOutcome::Finished(result)
            }
            Ok(Step::Continue(frontier)) => {
                let active: HashSet<Fragment> = state
                    .repository
                    .subtasks_of(task_id)?
                    .into_iter()
                    .filter(|s| s.is_active() && s.fragment != *fragment)
                    .map(|s| s.fragment)
                    .collect();
                let changes = Changeset::new().remove(key).put_task(task);
                let (changes, enqueued) = state.enqueue(changes, task_id, frontier, &active);
                state.repository.commit(changes)?;
                ReportOutcome::Continued { enqueued }
            }
            Ok(Step::Stale) => {
                state.repository.commit(Changeset::new().remove(key))?;
                ReportOutcome::Stale
            }
            Err(e) => {
                match &e {
                    DistcalcError::Compute(_) => warn!("Task {} failed: {}", task_id, e),
                    _ => error!("Task {} failed: {}", task_id, e),
                }
                reducer::fail(&mut task);
                let changes = state.discard_all(Changeset::new(), task_id)?;
                state.repository.commit(changes.put_task(task))?;
                ReportOutcome::Failed
            }
        };

        Ok(outcome)
    }

    /// Returns every `Assigned` subtask whose lease started before
    /// `deadline` to `Waiting`, keeping its queue position.
    ///
    /// # Returns
    ///
    /// The number of subtasks requeued.
    pub async fn requeue_expired(&self, deadline: Instant) -> Result<usize> {
        let mut state = self.state.write().await;

        let expired = state.repository.assigned_before(deadline)?;
        if expired.is_empty() {
            return Ok(0);
        }

        let count = expired.len();
        let mut changes = Changeset::new();
        for mut subtask in expired {
            warn!(
                "Lease expired for '{}' of task {}, requeueing",
                subtask.fragment, subtask.task_id
            );
            subtask.status = SubtaskStatus::Waiting;
            subtask.assigned_at = None;
            changes = changes.update(subtask);
        }
        state.repository.commit(changes)?;

        Ok(count)
    }

    pub async fn task(&self, id: TaskId) -> Result<Option<Task>> {
        self.state.read().await.repository.task(id)
    }

    pub async fn tasks(&self) -> Result<Vec<Task>> {
        self.state.read().await.repository.tasks()
    }

    pub async fn subtasks_of(&self, task_id: TaskId) -> Result<Vec<Subtask>> {
        self.state.read().await.repository.subtasks_of(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn fragment(text: &str) -> Fragment {
        text.parse().unwrap()
    }

    fn task(id: TaskId, expression: &str) -> Task {
        Task::compile(id, expression, None).unwrap()
    }

    /// Repository whose commits always fail after delegating reads.
    struct FailingRepository(MemoryRepository);

    impl TaskRepository for FailingRepository {
        fn task(&self, id: TaskId) -> Result<Option<Task>> {
            self.0.task(id)
        }
        fn tasks(&self) -> Result<Vec<Task>> {
            self.0.tasks()
        }
        fn subtask(&self, key: &SubtaskKey) -> Result<Option<Subtask>> {
            self.0.subtask(key)
        }
        fn subtasks_of(&self, task_id: TaskId) -> Result<Vec<Subtask>> {
            self.0.subtasks_of(task_id)
        }
        fn oldest_waiting(&self) -> Result<Option<Subtask>> {
            self.0.oldest_waiting()
        }
        fn assigned_before(&self, deadline: Instant) -> Result<Vec<Subtask>> {
            self.0.assigned_before(deadline)
        }
        fn last_seq(&self) -> Result<Option<u64>> {
            self.0.last_seq()
        }
        fn commit(&mut self, _changes: Changeset) -> Result<()> {
            Err(DistcalcError::Storage("disk full".into()))
        }
    }

    // ============================================================================
    // MemoryRepository
    // ============================================================================

    #[test]
    fn test_commit_applies_changes() {
        let mut repo = MemoryRepository::new();
        let changes = Changeset::new()
            .put_task(task(1, "2+2*2"))
            .insert(Subtask::waiting(1, fragment("2 2 *"), 0));
        repo.commit(changes).unwrap();

        assert!(repo.task(1).unwrap().is_some());
        assert_eq!(repo.subtasks_of(1).unwrap().len(), 1);
        assert_eq!(repo.last_seq().unwrap(), Some(0));
    }

    #[test]
    fn test_failed_commit_leaves_repository_unchanged() {
        let mut repo = MemoryRepository::new();
        repo.commit(
            Changeset::new()
                .put_task(task(1, "2+2*2"))
                .insert(Subtask::waiting(1, fragment("2 2 *"), 0)),
        )
        .unwrap();

        // Valid first change, invalid second: neither may be applied
        let mut updated = task(1, "2+2*2");
        updated.status = TaskStatus::Error;
        let bad = Changeset::new()
            .put_task(updated)
            .remove((1, fragment("2 2 *")))
            .remove((1, fragment("2 2 *")));
        assert!(matches!(repo.commit(bad), Err(DistcalcError::Storage(_))));

        assert_eq!(repo.task(1).unwrap().unwrap().status, TaskStatus::Pending);
        assert_eq!(repo.subtasks_of(1).unwrap().len(), 1);
    }

    #[test]
    fn test_commit_rejects_invalid_changes() {
        let mut repo = MemoryRepository::new();

        let orphan = Changeset::new().insert(Subtask::waiting(9, fragment("1 1 +"), 0));
        assert!(repo.commit(orphan).is_err());

        let missing = Changeset::new().update(Subtask::waiting(9, fragment("1 1 +"), 0));
        assert!(repo.commit(missing).is_err());

        repo.commit(Changeset::new().put_task(task(1, "1+1"))).unwrap();
        let twice = Changeset::new()
            .insert(Subtask::waiting(1, fragment("1 1 +"), 0))
            .insert(Subtask::waiting(1, fragment("1 1 +"), 1));
        assert!(repo.commit(twice).is_err());
        assert!(repo.subtasks_of(1).unwrap().is_empty());
    }

    #[test]
    fn test_commit_remove_then_insert_same_key() {
        let mut repo = MemoryRepository::new();
        repo.commit(
            Changeset::new()
                .put_task(task(1, "1+1"))
                .insert(Subtask::waiting(1, fragment("1 1 +"), 0)),
        )
        .unwrap();

        let changes = Changeset::new()
            .remove((1, fragment("1 1 +")))
            .insert(Subtask::waiting(1, fragment("1 1 +"), 5));
        repo.commit(changes).unwrap();
        assert_eq!(repo.last_seq().unwrap(), Some(5));
    }

    #[test]
    fn test_oldest_waiting_is_fifo_across_tasks() {
        let mut repo = MemoryRepository::new();
        repo.commit(
            Changeset::new()
                .put_task(task(1, "1+1"))
                .put_task(task(2, "2+2"))
                .insert(Subtask::waiting(2, fragment("2 2 +"), 3))
                .insert(Subtask::waiting(1, fragment("1 1 +"), 4)),
        )
        .unwrap();

        let oldest = repo.oldest_waiting().unwrap().unwrap();
        assert_eq!(oldest.task_id, 2);
    }

    // ============================================================================
    // TaskStore
    // ============================================================================

    #[tokio::test]
    async fn test_create_enqueues_frontier() {
        let store = TaskStore::in_memory();
        assert_eq!(store.create(task(1, "(1+2)*(3+4)")).await.unwrap(), 2);

        let subtasks = store.subtasks_of(1).await.unwrap();
        let fragments: Vec<String> = subtasks.iter().map(|s| s.fragment.to_string()).collect();
        assert_eq!(fragments, vec!["1 2 +", "3 4 +"]);
        assert!(subtasks.iter().all(|s| s.status == SubtaskStatus::Waiting));
    }

    #[tokio::test]
    async fn test_create_suppresses_duplicate_fragments() {
        let store = TaskStore::in_memory();
        assert_eq!(store.create(task(1, "2*2+2*2")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_conflict_keeps_existing_task() {
        let store = TaskStore::in_memory();
        store.create(task(1, "1+1")).await.unwrap();

        let err = store.create(task(1, "2*3")).await.unwrap_err();
        assert!(matches!(err, DistcalcError::Conflict(1)));

        let existing = store.task(1).await.unwrap().unwrap();
        assert_eq!(existing.original_expression, "1+1");
        assert_eq!(store.subtasks_of(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_marks_assigned_and_task_in_progress() {
        let store = TaskStore::in_memory();
        store.create(task(1, "2+2*2")).await.unwrap();

        let now = Instant::now();
        let subtask = store.dispatch(now).await.unwrap().unwrap();
        assert_eq!(subtask.fragment, fragment("2 2 *"));
        assert_eq!(subtask.status, SubtaskStatus::Assigned);
        assert_eq!(subtask.assigned_at, Some(now));

        let task = store.task(1).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);

        // Only one subtask exists and it is taken
        assert!(store.dispatch(Instant::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_empty_store() {
        let store = TaskStore::in_memory();
        assert!(store.dispatch(Instant::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_full_reduction() {
        let store = TaskStore::in_memory();
        store.create(task(1, "2+2*2")).await.unwrap();

        let first = store.dispatch(Instant::now()).await.unwrap().unwrap();
        let outcome = store
            .apply_report(1, &first.fragment, ReportStatus::Finished, 4.0)
            .await
            .unwrap();
        assert_eq!(outcome, ReportOutcome::Continued { enqueued: 1 });
        assert_eq!(store.task(1).await.unwrap().unwrap().expression, "(2 + 4)");

        let second = store.dispatch(Instant::now()).await.unwrap().unwrap();
        assert_eq!(second.fragment, fragment("2 4 +"));
        let outcome = store
            .apply_report(1, &second.fragment, ReportStatus::Finished, 6.0)
            .await
            .unwrap();
        assert_eq!(outcome, ReportOutcome::Finished(6.0));

        let task = store.task(1).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Finished);
        assert_eq!(task.result, Some(6.0));
        assert!(store.subtasks_of(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identical_siblings_reduce_one_window_at_a_time() {
        let store = TaskStore::in_memory();
        assert_eq!(store.create(task(1, "2*2+2*2")).await.unwrap(), 1);

        let first = store.dispatch(Instant::now()).await.unwrap().unwrap();
        assert_eq!(first.fragment, fragment("2 2 *"));
        let outcome = store
            .apply_report(1, &first.fragment, ReportStatus::Finished, 4.0)
            .await
            .unwrap();
        assert_eq!(outcome, ReportOutcome::Continued { enqueued: 1 });
        assert_eq!(store.task(1).await.unwrap().unwrap().residual.to_string(), "4 2 2 * +");

        // The same key is enqueued again for the remaining window
        let second = store.dispatch(Instant::now()).await.unwrap().unwrap();
        assert_eq!(second.fragment, fragment("2 2 *"));
        assert!(second.seq > first.seq);
        let outcome = store
            .apply_report(1, &second.fragment, ReportStatus::Finished, 4.0)
            .await
            .unwrap();
        assert_eq!(outcome, ReportOutcome::Continued { enqueued: 1 });

        let last = store.dispatch(Instant::now()).await.unwrap().unwrap();
        assert_eq!(last.fragment, fragment("4 4 +"));
        let outcome = store
            .apply_report(1, &last.fragment, ReportStatus::Finished, 8.0)
            .await
            .unwrap();
        assert_eq!(outcome, ReportOutcome::Finished(8.0));

        let task = store.task(1).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Finished);
        assert_eq!(task.result, Some(8.0));
        assert!(store.subtasks_of(1).await.unwrap().is_empty());
        assert!(store.dispatch(Instant::now()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_never_hands_out_a_subtask_twice() {
        let store = Arc::new(TaskStore::in_memory());
        let enqueued = store
            .create(task(1, "(1+2)*(3+4)*(5+6)*(7+8)"))
            .await
            .unwrap();
        assert_eq!(enqueued, 4);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.dispatch(Instant::now()).await })
            })
            .collect();

        let mut taken: Vec<SubtaskKey> = Vec::new();
        for handle in handles {
            if let Some(subtask) = handle.await.unwrap().unwrap() {
                taken.push(subtask.key());
            }
        }

        let distinct: HashSet<SubtaskKey> = taken.iter().cloned().collect();
        assert_eq!(taken.len(), enqueued);
        assert_eq!(distinct.len(), enqueued);
        assert!(store
            .subtasks_of(1)
            .await
            .unwrap()
            .iter()
            .all(|s| s.status == SubtaskStatus::Assigned));
    }

    #[tokio::test]
    async fn test_duplicate_report_is_ignored() {
        let store = TaskStore::in_memory();
        store.create(task(1, "2+2*2")).await.unwrap();
        let subtask = store.dispatch(Instant::now()).await.unwrap().unwrap();

        store
            .apply_report(1, &subtask.fragment, ReportStatus::Finished, 4.0)
            .await
            .unwrap();
        let again = store
            .apply_report(1, &subtask.fragment, ReportStatus::Finished, 4.0)
            .await
            .unwrap();

        assert_eq!(again, ReportOutcome::Ignored);
        assert_eq!(store.task(1).await.unwrap().unwrap().residual.to_string(), "2 4 +");
    }

    #[tokio::test]
    async fn test_report_for_waiting_subtask_is_ignored() {
        let store = TaskStore::in_memory();
        store.create(task(1, "2+3")).await.unwrap();

        let outcome = store
            .apply_report(1, &fragment("2 3 +"), ReportStatus::Finished, 5.0)
            .await
            .unwrap();
        assert_eq!(outcome, ReportOutcome::Ignored);
        assert_eq!(store.task(1).await.unwrap().unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_error_report_fails_task_and_discards_subtasks() {
        let store = TaskStore::in_memory();
        store.create(task(1, "(1+2)*(5/0)")).await.unwrap();

        let first = store.dispatch(Instant::now()).await.unwrap().unwrap();
        let second = store.dispatch(Instant::now()).await.unwrap().unwrap();
        assert_eq!(second.fragment, fragment("5 0 /"));

        let outcome = store
            .apply_report(1, &second.fragment, ReportStatus::Error, 0.0)
            .await
            .unwrap();
        assert_eq!(outcome, ReportOutcome::Failed);

        let task = store.task(1).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.result, None);
        assert!(store.subtasks_of(1).await.unwrap().is_empty());

        // The in-flight sibling reports late
        let late = store
            .apply_report(1, &first.fragment, ReportStatus::Finished, 3.0)
            .await
            .unwrap();
        assert_eq!(late, ReportOutcome::Ignored);
        assert_eq!(store.task(1).await.unwrap().unwrap().status, TaskStatus::Error);
    }

    #[tokio::test]
    async fn test_sibling_in_flight_is_not_requeued() {
        let store = TaskStore::in_memory();
        store.create(task(1, "(1+2)*(3+4)")).await.unwrap();
        let first = store.dispatch(Instant::now()).await.unwrap().unwrap();
        let _second = store.dispatch(Instant::now()).await.unwrap().unwrap();

        let outcome = store
            .apply_report(1, &first.fragment, ReportStatus::Finished, 3.0)
            .await
            .unwrap();
        // "3 4 +" is computable again but already assigned
        assert_eq!(outcome, ReportOutcome::Continued { enqueued: 0 });
        assert_eq!(store.subtasks_of(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_requeue_expired_keeps_position() {
        let store = TaskStore::in_memory();
        store.create(task(1, "1+1")).await.unwrap();
        store.create(task(2, "2+2")).await.unwrap();

        let start = Instant::now();
        let first = store.dispatch(start).await.unwrap().unwrap();
        assert_eq!(first.task_id, 1);

        assert_eq!(store.requeue_expired(start).await.unwrap(), 0);
        let requeued = store
            .requeue_expired(start + Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(requeued, 1);

        // Task 1's subtask was enqueued first, so it is served again first
        let again = store.dispatch(Instant::now()).await.unwrap().unwrap();
        assert_eq!(again.task_id, 1);
        assert_eq!(again.seq, first.seq);
    }

    #[tokio::test]
    async fn test_report_after_lease_expiry_is_ignored() {
        let store = TaskStore::in_memory();
        store.create(task(1, "1+1")).await.unwrap();
        let start = Instant::now();
        let subtask = store.dispatch(start).await.unwrap().unwrap();

        store
            .requeue_expired(start + Duration::from_secs(1))
            .await
            .unwrap();
        let outcome = store
            .apply_report(1, &subtask.fragment, ReportStatus::Finished, 2.0)
            .await
            .unwrap();
        assert_eq!(outcome, ReportOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let store = TaskStore::new(Box::new(FailingRepository(MemoryRepository::new()))).unwrap();
        let err = store.create(task(1, "1+1")).await.unwrap_err();
        assert!(matches!(err, DistcalcError::Storage(_)));
        assert!(store.task(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_new_continues_sequence() {
        let mut repo = MemoryRepository::new();
        repo.commit(
            Changeset::new()
                .put_task(task(1, "1+1"))
                .insert(Subtask::waiting(1, fragment("1 1 +"), 41)),
        )
        .unwrap();

        let store = TaskStore::new(Box::new(repo)).unwrap();
        store.create(task(2, "2+2")).await.unwrap();
        let subtasks = store.subtasks_of(2).await.unwrap();
        assert_eq!(subtasks[0].seq, 42);
    }
}
