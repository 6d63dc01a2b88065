//! Run orchestrator: validation, snapshot pinning and run lifecycle.
//!
//! The orchestrator is the only writer of run rows. Creation is
//! all-or-nothing: every input is validated first, then the run and its
//! fanned-out tasks are persisted in one atomic store operation. Lifecycle
//! transitions go through conditional store updates, so concurrent
//! refreshes cannot race a run into an illegal state.

use crate::config::RunFailurePolicy;
use crate::error::{EngineError, ValidationError};
use crate::scheduler::TaskScheduler;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use valrun_core::snapshot::{PositionSnapshot, SnapshotKind};
use valrun_core::types::{MeasureSet, RunId, ScenarioId, SnapshotId};
use valrun_store::{RunRecord, RunState, StoreError, Stores, TaskCounts};

/// Reference to a snapshot: a concrete id, or "use latest".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SnapshotRef {
    /// Resolve to the most recently ingested snapshot of the needed kind.
    Latest,
    /// A concrete content-addressed id.
    Id(SnapshotId),
}

impl Default for SnapshotRef {
    fn default() -> Self {
        SnapshotRef::Latest
    }
}

impl From<String> for SnapshotRef {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("latest") {
            SnapshotRef::Latest
        } else {
            SnapshotRef::Id(SnapshotId::new(value))
        }
    }
}

impl From<SnapshotRef> for String {
    fn from(value: SnapshotRef) -> Self {
        match value {
            SnapshotRef::Latest => "latest".to_string(),
            SnapshotRef::Id(id) => id.as_str().to_string(),
        }
    }
}

/// A run-creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Market snapshot to pin (default: latest).
    #[serde(default)]
    pub market_snapshot: SnapshotRef,
    /// Position snapshot to pin (default: latest).
    #[serde(default)]
    pub position_snapshot: SnapshotRef,
    /// Scenarios to value under; an empty list means `[BASE]`.
    #[serde(default)]
    pub scenario_ids: Vec<ScenarioId>,
    /// Measures to compute; must be non-empty.
    pub measures: MeasureSet,
}

/// Aggregate view of a run: its row plus task and result counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatusSummary {
    /// The run row.
    pub run: RunRecord,
    /// Per-status task counts.
    pub tasks: TaskCounts,
    /// Number of persisted result rows.
    pub result_count: u64,
}

/// Top-level coordinator of run lifecycle.
pub struct Orchestrator {
    stores: Stores,
    scheduler: TaskScheduler,
    policy: RunFailurePolicy,
}

impl Orchestrator {
    /// Create an orchestrator over a store bundle and scheduler.
    pub fn new(stores: Stores, scheduler: TaskScheduler, policy: RunFailurePolicy) -> Self {
        Self {
            stores,
            scheduler,
            policy,
        }
    }

    /// The scheduler this orchestrator fans out through.
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// The store bundle.
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Validate a request, pin snapshots and create the run with its tasks.
    ///
    /// Fails with [`EngineError::Validation`] on any inconsistent input;
    /// in that case nothing is persisted. On success the run is `QUEUED`
    /// and every task is claimable.
    pub async fn create_run(&self, request: RunRequest) -> Result<RunRecord, EngineError> {
        if request.measures.is_empty() {
            return Err(ValidationError::EmptyMeasures.into());
        }

        let market_snapshot_id = self
            .resolve_snapshot(&request.market_snapshot, SnapshotKind::Market)
            .await?;
        let position_snapshot_id = self
            .resolve_snapshot(&request.position_snapshot, SnapshotKind::Positions)
            .await?;

        let scenario_ids = if request.scenario_ids.is_empty() {
            vec![ScenarioId::base()]
        } else {
            request.scenario_ids
        };
        for scenario_id in &scenario_ids {
            self.stores
                .scenarios
                .get_scenario(scenario_id)
                .await
                .map_err(|err| match err {
                    StoreError::NotFound(_) => {
                        EngineError::Validation(ValidationError::UnknownScenario(
                            scenario_id.clone(),
                        ))
                    }
                    other => other.into(),
                })?;
        }

        let positions = self.load_positions(&position_snapshot_id).await?;

        let mut run = RunRecord {
            run_id: RunId::new(),
            market_snapshot_id,
            position_snapshot_id,
            scenario_ids,
            measures: request.measures,
            state: RunState::Queued,
            created_at: Utc::now(),
            completed_at: None,
        };
        let tasks = self.scheduler.fanout(run.run_id, &positions);
        if tasks.is_empty() {
            // An empty book has nothing to price: the run completes at
            // creation with zero result rows.
            run.state = RunState::Completed;
            run.completed_at = Some(Utc::now());
        }
        self.stores.runs.create_run_with_tasks(&run, &tasks).await?;
        tracing::info!(
            run_id = %run.run_id,
            tasks = tasks.len(),
            scenarios = run.scenario_ids.len(),
            "run created"
        );
        Ok(run)
    }

    /// Current state plus task and result aggregates for a run.
    pub async fn run_status(&self, run_id: &RunId) -> Result<RunStatusSummary, EngineError> {
        let run = self.stores.runs.get_run(run_id).await?;
        let tasks = self.stores.tasks.task_counts(run_id).await?;
        let result_count = self.stores.results.result_count(run_id).await?;
        Ok(RunStatusSummary {
            run,
            tasks,
            result_count,
        })
    }

    /// Mark a run running when its first task is claimed. A no-op for runs
    /// already past `QUEUED`.
    pub async fn mark_running(&self, run_id: &RunId) -> Result<(), EngineError> {
        self.stores
            .runs
            .transition_run(run_id, &[RunState::Queued], RunState::Running)
            .await?;
        Ok(())
    }

    /// Fold the task aggregate into the run state machine.
    ///
    /// Once every task is terminal the run becomes `COMPLETED` (all
    /// succeeded), `FAILED` (a task went dead and policy demands failure,
    /// or nothing succeeded at all) or `PARTIALLY_COMPLETED` (mixed
    /// outcome). Non-terminal aggregates leave the state untouched.
    pub async fn refresh_run_state(&self, run_id: &RunId) -> Result<RunState, EngineError> {
        let counts = self.stores.tasks.task_counts(run_id).await?;
        if !counts.all_terminal() || counts.total() == 0 {
            return Ok(self.stores.runs.get_run(run_id).await?.state);
        }
        let target = if counts.dead == 0 {
            RunState::Completed
        } else if self.policy.fail_on_dead || counts.succeeded == 0 {
            RunState::Failed
        } else {
            RunState::PartiallyCompleted
        };
        self.stores
            .runs
            .transition_run(run_id, &[RunState::Queued, RunState::Running], target)
            .await?;
        Ok(self.stores.runs.get_run(run_id).await?.state)
    }

    /// Freeze a completed run into its archival record. One-way.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidRunState`] when the run is not `COMPLETED`.
    pub async fn publish(&self, run_id: &RunId) -> Result<(), EngineError> {
        let applied = self
            .stores
            .runs
            .transition_run(run_id, &[RunState::Completed], RunState::Published)
            .await?;
        if !applied {
            let run = self.stores.runs.get_run(run_id).await?;
            return Err(ValidationError::InvalidRunState {
                state: run.state,
                required: RunState::Completed,
            }
            .into());
        }
        tracing::info!(run_id = %run_id, "run published");
        Ok(())
    }

    async fn resolve_snapshot(
        &self,
        reference: &SnapshotRef,
        expected: SnapshotKind,
    ) -> Result<SnapshotId, EngineError> {
        let id = match reference {
            SnapshotRef::Latest => self
                .stores
                .snapshots
                .latest(expected)
                .await?
                .ok_or(ValidationError::NoLatestSnapshot(expected))?,
            SnapshotRef::Id(id) => id.clone(),
        };
        let payload = self
            .stores
            .snapshots
            .get(&id)
            .await
            .map_err(|err| match err {
                StoreError::NotFound(_) => {
                    EngineError::Validation(ValidationError::UnknownSnapshot(id.clone()))
                }
                other => other.into(),
            })?;
        if payload.kind() != expected {
            return Err(ValidationError::WrongSnapshotKind {
                id,
                actual: payload.kind(),
                expected,
            }
            .into());
        }
        Ok(id)
    }

    async fn load_positions(&self, id: &SnapshotId) -> Result<PositionSnapshot, EngineError> {
        let payload = self.stores.snapshots.get(id).await?;
        payload
            .as_positions()
            .cloned()
            .ok_or_else(|| {
                ValidationError::WrongSnapshotKind {
                    id: id.clone(),
                    actual: payload.kind(),
                    expected: SnapshotKind::Positions,
                }
                .into()
            })
    }
}
