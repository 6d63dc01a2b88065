//! Store contracts: the only way engine code touches durable state.
//!
//! Each trait's operations are individually atomic; no distributed
//! transaction ever spans two traits. The claim protocol on [`TaskStore`]
//! is the concurrency core of the whole engine: `claim_next` must be a
//! single atomic conditional update so that no two concurrent callers can
//! claim the same task.

use crate::records::{
    CompletionDisposition, LeaseRenewal, ResultFilter, RunRecord, RunState, TaskCounts,
    TaskOutcome, TaskRecord, ValuationResultRecord,
};
use crate::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use valrun_core::scenario::Scenario;
use valrun_core::snapshot::{SnapshotKind, SnapshotPayload};
use valrun_core::types::{OwnerId, RunId, ScenarioId, SnapshotId, TaskId};

/// Immutable, content-addressed snapshot storage.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store a payload under its content hash and return the id.
    ///
    /// Idempotent: re-submitting identical content resolves to the existing
    /// id without creating a duplicate record.
    async fn put(&self, payload: &SnapshotPayload) -> Result<SnapshotId, StoreError>;

    /// Fetch an immutable payload.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no snapshot has the id.
    async fn get(&self, id: &SnapshotId) -> Result<SnapshotPayload, StoreError>;

    /// Whether a snapshot with the id exists.
    async fn contains(&self, id: &SnapshotId) -> Result<bool, StoreError>;

    /// Most recently ingested snapshot of a kind, if any ("use latest").
    async fn latest(&self, kind: SnapshotKind) -> Result<Option<SnapshotId>, StoreError>;
}

/// Catalog of named scenario definitions.
#[async_trait]
pub trait ScenarioStore: Send + Sync {
    /// Create or update a scenario definition.
    ///
    /// # Errors
    ///
    /// [`StoreError::Conflict`] when the scenario is already referenced by
    /// a run and the new definition differs (scenarios are immutable once
    /// referenced).
    async fn put_scenario(&self, scenario: &Scenario) -> Result<(), StoreError>;

    /// Fetch a scenario definition. `BASE` is always resolvable.
    async fn get_scenario(&self, id: &ScenarioId) -> Result<Scenario, StoreError>;
}

/// Run rows and their lifecycle transitions.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a run and its fanned-out tasks in one atomic step, and mark
    /// the run's scenarios as referenced.
    ///
    /// All-or-nothing: on failure no partial run or task rows remain.
    async fn create_run_with_tasks(
        &self,
        run: &RunRecord,
        tasks: &[TaskRecord],
    ) -> Result<(), StoreError>;

    /// Fetch a run row.
    async fn get_run(&self, id: &RunId) -> Result<RunRecord, StoreError>;

    /// Conditionally transition a run: applies only when the current state
    /// is one of `from`. Returns whether the transition was applied.
    ///
    /// Entering a terminal state records `completed_at`. Because terminal
    /// states never appear in a caller's `from` list except `Completed →
    /// Published`, terminal immutability follows from the condition.
    async fn transition_run(
        &self,
        id: &RunId,
        from: &[RunState],
        to: RunState,
    ) -> Result<bool, StoreError>;
}

/// The task table: claim / renew / complete under concurrent workers.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Atomically claim one claimable task for `owner`.
    ///
    /// A task is claimable when queued, or running with an expired lease.
    /// The selected task transitions to running with `owner` and a lease of
    /// `lease` from now. Implementations must guarantee that concurrent
    /// callers never claim the same task.
    async fn claim_next(
        &self,
        owner: &OwnerId,
        lease: chrono::Duration,
    ) -> Result<Option<TaskRecord>, StoreError>;

    /// Extend the lease on a task still owned by `owner`.
    ///
    /// Ownership is checked by owner id, not just task id: if the lease was
    /// reassigned the caller gets [`LeaseRenewal::LostOwnership`] and must
    /// abandon its work.
    async fn renew_lease(
        &self,
        task_id: &TaskId,
        owner: &OwnerId,
        lease: chrono::Duration,
    ) -> Result<LeaseRenewal, StoreError>;

    /// Report the outcome of a claimed task.
    ///
    /// A failed outcome increments `attempt_count` and requeues the task,
    /// or marks it dead at the attempt limit. A call from a stale owner is
    /// accepted as a no-op ([`CompletionDisposition::StaleOwner`]), never an
    /// error: a zombie worker must not corrupt a task someone else owns.
    async fn complete(
        &self,
        task_id: &TaskId,
        owner: &OwnerId,
        outcome: TaskOutcome,
    ) -> Result<CompletionDisposition, StoreError>;

    /// All tasks of a run, for aggregate views.
    async fn tasks_for_run(&self, run_id: &RunId) -> Result<Vec<TaskRecord>, StoreError>;

    /// Per-status counts for a run.
    async fn task_counts(&self, run_id: &RunId) -> Result<TaskCounts, StoreError>;
}

/// Valuation result rows with keyed upsert semantics.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Write a result row; an existing `(run, position, scenario)` key is
    /// overwritten deterministically, never duplicated.
    async fn upsert_result(&self, row: &ValuationResultRecord) -> Result<(), StoreError>;

    /// Paginated read of a run's result rows, filtered.
    async fn results_for_run(
        &self,
        run_id: &RunId,
        filter: &ResultFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ValuationResultRecord>, StoreError>;

    /// Number of result rows for a run.
    async fn result_count(&self, run_id: &RunId) -> Result<u64, StoreError>;
}

/// Bundle of the five store handles a backend provides.
///
/// A single backend instance typically implements every trait; the bundle
/// just carries one `Arc` per concern so that runtime components can state
/// which stores they actually use.
#[derive(Clone)]
pub struct Stores {
    /// Snapshot storage.
    pub snapshots: Arc<dyn SnapshotStore>,
    /// Scenario catalog.
    pub scenarios: Arc<dyn ScenarioStore>,
    /// Run rows.
    pub runs: Arc<dyn RunStore>,
    /// Task table.
    pub tasks: Arc<dyn TaskStore>,
    /// Result rows.
    pub results: Arc<dyn ResultStore>,
}

impl Stores {
    /// Build a bundle from one backend implementing every trait.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: SnapshotStore + ScenarioStore + RunStore + TaskStore + ResultStore + 'static,
    {
        Self {
            snapshots: backend.clone(),
            scenarios: backend.clone(),
            runs: backend.clone(),
            tasks: backend.clone(),
            results: backend,
        }
    }
}
