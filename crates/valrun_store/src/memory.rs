//! In-memory backend: every collection behind one async mutex.
//!
//! Used by tests, the CLI and the server's embedded mode. Because every
//! mutating operation holds the single lock for its whole critical section,
//! claim/renew/complete are trivially atomic: two concurrent `claim_next`
//! calls serialise on the mutex and the second sees the first one's write.
//! No await point ever falls inside a critical section.

use crate::records::{
    CompletionDisposition, LeaseRenewal, ResultFilter, RunRecord, RunState, TaskCounts,
    TaskOutcome, TaskRecord, TaskStatus, ValuationResultRecord,
};
use crate::traits::{ResultStore, RunStore, ScenarioStore, SnapshotStore, TaskStore};
use crate::{content, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;
use valrun_core::scenario::Scenario;
use valrun_core::snapshot::{SnapshotKind, SnapshotPayload};
use valrun_core::types::{OwnerId, PositionId, RunId, ScenarioId, SnapshotId, TaskId};

#[derive(Debug, Clone)]
struct StoredSnapshot {
    payload: SnapshotPayload,
    kind: SnapshotKind,
    created_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Default)]
struct State {
    snapshots: BTreeMap<SnapshotId, StoredSnapshot>,
    snapshot_seq: u64,
    scenarios: BTreeMap<ScenarioId, Scenario>,
    referenced_scenarios: BTreeSet<ScenarioId>,
    runs: BTreeMap<RunId, RunRecord>,
    tasks: BTreeMap<TaskId, TaskRecord>,
    results: BTreeMap<(RunId, PositionId, ScenarioId), ValuationResultRecord>,
}

/// In-memory implementation of every store trait.
///
/// # Example
///
/// ```
/// use valrun_store::{MemoryStore, Stores};
/// use std::sync::Arc;
///
/// let stores = Stores::from_backend(Arc::new(MemoryStore::new()));
/// # let _ = stores;
/// ```
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn put(&self, payload: &SnapshotPayload) -> Result<SnapshotId, StoreError> {
        let id = content::content_id(payload)?;
        let mut state = self.state.lock().await;
        if !state.snapshots.contains_key(&id) {
            state.snapshot_seq += 1;
            let seq = state.snapshot_seq;
            state.snapshots.insert(
                id.clone(),
                StoredSnapshot {
                    payload: payload.clone(),
                    kind: payload.kind(),
                    created_at: Utc::now(),
                    seq,
                },
            );
            tracing::debug!(snapshot_id = %id, "stored new snapshot");
        }
        Ok(id)
    }

    async fn get(&self, id: &SnapshotId) -> Result<SnapshotPayload, StoreError> {
        let state = self.state.lock().await;
        state
            .snapshots
            .get(id)
            .map(|s| s.payload.clone())
            .ok_or_else(|| StoreError::NotFound(format!("snapshot {id}")))
    }

    async fn contains(&self, id: &SnapshotId) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.snapshots.contains_key(id))
    }

    async fn latest(&self, kind: SnapshotKind) -> Result<Option<SnapshotId>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .snapshots
            .iter()
            .filter(|(_, s)| s.kind == kind)
            .max_by_key(|(_, s)| (s.created_at, s.seq))
            .map(|(id, _)| id.clone()))
    }
}

#[async_trait]
impl ScenarioStore for MemoryStore {
    async fn put_scenario(&self, scenario: &Scenario) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.referenced_scenarios.contains(&scenario.scenario_id) {
            match state.scenarios.get(&scenario.scenario_id) {
                Some(existing) if existing == scenario => return Ok(()),
                _ => {
                    return Err(StoreError::Conflict(format!(
                        "scenario {} is referenced by a run and cannot be redefined",
                        scenario.scenario_id
                    )))
                }
            }
        }
        state
            .scenarios
            .insert(scenario.scenario_id.clone(), scenario.clone());
        Ok(())
    }

    async fn get_scenario(&self, id: &ScenarioId) -> Result<Scenario, StoreError> {
        let state = self.state.lock().await;
        if let Some(scenario) = state.scenarios.get(id) {
            return Ok(scenario.clone());
        }
        if id.is_base() {
            return Ok(Scenario::base());
        }
        Err(StoreError::NotFound(format!("scenario {id}")))
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run_with_tasks(
        &self,
        run: &RunRecord,
        tasks: &[TaskRecord],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.runs.contains_key(&run.run_id) {
            return Err(StoreError::Conflict(format!("run {} exists", run.run_id)));
        }
        state.runs.insert(run.run_id, run.clone());
        for task in tasks {
            state.tasks.insert(task.task_id, task.clone());
        }
        for scenario_id in &run.scenario_ids {
            state.referenced_scenarios.insert(scenario_id.clone());
        }
        Ok(())
    }

    async fn get_run(&self, id: &RunId) -> Result<RunRecord, StoreError> {
        self.state
            .lock()
            .await
            .runs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("run {id}")))
    }

    async fn transition_run(
        &self,
        id: &RunId,
        from: &[RunState],
        to: RunState,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("run {id}")))?;
        if !from.contains(&run.state) {
            return Ok(false);
        }
        run.state = to;
        if to.is_terminal() && run.completed_at.is_none() {
            run.completed_at = Some(Utc::now());
        }
        tracing::info!(run_id = %id, state = %to, "run transitioned");
        Ok(true)
    }
}

fn claimable(task: &TaskRecord, now: DateTime<Utc>) -> bool {
    match task.status {
        TaskStatus::Queued => true,
        TaskStatus::Running => task
            .lease_expires_at
            .map(|expiry| expiry < now)
            .unwrap_or(false),
        TaskStatus::Succeeded | TaskStatus::Dead => false,
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn claim_next(
        &self,
        owner: &OwnerId,
        lease: chrono::Duration,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let candidate = state
            .tasks
            .values()
            .filter(|t| claimable(t, now))
            .min_by_key(|t| (t.created_at, t.task_id))
            .map(|t| t.task_id);
        let Some(task_id) = candidate else {
            return Ok(None);
        };
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| StoreError::NotFound(format!("task {task_id}")))?;
        task.status = TaskStatus::Running;
        task.owner_id = Some(owner.clone());
        task.lease_expires_at = Some(now + lease);
        tracing::debug!(task_id = %task_id, owner = %owner, "task claimed");
        Ok(Some(task.clone()))
    }

    async fn renew_lease(
        &self,
        task_id: &TaskId,
        owner: &OwnerId,
        lease: chrono::Duration,
    ) -> Result<LeaseRenewal, StoreError> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get_mut(task_id) else {
            return Err(StoreError::NotFound(format!("task {task_id}")));
        };
        if task.status != TaskStatus::Running || task.owner_id.as_ref() != Some(owner) {
            return Ok(LeaseRenewal::LostOwnership);
        }
        let expiry = now + lease;
        task.lease_expires_at = Some(expiry);
        Ok(LeaseRenewal::Renewed {
            lease_expires_at: expiry,
        })
    }

    async fn complete(
        &self,
        task_id: &TaskId,
        owner: &OwnerId,
        outcome: TaskOutcome,
    ) -> Result<CompletionDisposition, StoreError> {
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get_mut(task_id) else {
            return Err(StoreError::NotFound(format!("task {task_id}")));
        };
        if task.status != TaskStatus::Running || task.owner_id.as_ref() != Some(owner) {
            return Ok(CompletionDisposition::StaleOwner);
        }
        task.owner_id = None;
        task.lease_expires_at = None;
        match outcome {
            TaskOutcome::Succeeded => {
                task.status = TaskStatus::Succeeded;
                Ok(CompletionDisposition::Succeeded)
            }
            TaskOutcome::Failed { error } => {
                task.attempt_count += 1;
                task.last_error = Some(error);
                if task.attempt_count >= task.max_attempts {
                    task.status = TaskStatus::Dead;
                    tracing::warn!(task_id = %task_id, attempts = task.attempt_count, "task dead");
                    Ok(CompletionDisposition::Dead)
                } else {
                    task.status = TaskStatus::Queued;
                    Ok(CompletionDisposition::Requeued {
                        attempt_count: task.attempt_count,
                    })
                }
            }
        }
    }

    async fn tasks_for_run(&self, run_id: &RunId) -> Result<Vec<TaskRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut tasks: Vec<_> = state
            .tasks
            .values()
            .filter(|t| &t.run_id == run_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            (&a.instrument_type, a.shard_index).cmp(&(&b.instrument_type, b.shard_index))
        });
        Ok(tasks)
    }

    async fn task_counts(&self, run_id: &RunId) -> Result<TaskCounts, StoreError> {
        let state = self.state.lock().await;
        let mut counts = TaskCounts::default();
        for task in state.tasks.values().filter(|t| &t.run_id == run_id) {
            match task.status {
                TaskStatus::Queued => counts.queued += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Succeeded => counts.succeeded += 1,
                TaskStatus::Dead => counts.dead += 1,
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn upsert_result(&self, row: &ValuationResultRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let key = (row.run_id, row.position_id.clone(), row.scenario_id.clone());
        state.results.insert(key, row.clone());
        Ok(())
    }

    async fn results_for_run(
        &self,
        run_id: &RunId,
        filter: &ResultFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ValuationResultRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .results
            .range((*run_id, PositionId::new(""), ScenarioId::new(""))..)
            .take_while(|((rid, _, _), _)| rid == run_id)
            .map(|(_, row)| row)
            .filter(|row| filter.matches(row))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn result_count(&self, run_id: &RunId) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .results
            .keys()
            .filter(|(rid, _, _)| rid == run_id)
            .count() as u64)
    }
}
