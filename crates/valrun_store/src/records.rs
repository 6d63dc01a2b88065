//! Durable record shapes for runs, tasks and results.
//!
//! These are the persisted rows of the engine's collections. Lifecycle
//! rules (which transitions are legal, who may mutate what) are enforced by
//! the store operations in [`crate::traits`], never by callers mutating
//! records in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use valrun_core::types::{
    InstrumentType, MeasureSet, OwnerId, PositionId, RunId, ScenarioId, SnapshotId, TaskId,
};

/// Lifecycle state of a run.
///
/// `Queued → Running → {Completed, Failed, PartiallyCompleted}`, plus the
/// one-way `Completed → Published` archival freeze. Terminal states are
/// immutable and runs are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Created, no task claimed yet.
    Queued,
    /// At least one task has been claimed.
    Running,
    /// All tasks succeeded.
    Completed,
    /// Failure policy demanded run failure (a task went dead).
    Failed,
    /// Mixed outcome: some tasks succeeded, some went dead.
    PartiallyCompleted,
    /// Frozen archival record of a completed run.
    Published,
}

impl RunState {
    /// Whether the state admits no further automatic transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed
                | RunState::Failed
                | RunState::PartiallyCompleted
                | RunState::Published
        )
    }

    /// Stable storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Queued => "QUEUED",
            RunState::Running => "RUNNING",
            RunState::Completed => "COMPLETED",
            RunState::Failed => "FAILED",
            RunState::PartiallyCompleted => "PARTIALLY_COMPLETED",
            RunState::Published => "PUBLISHED",
        }
    }

    /// Parse the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(RunState::Queued),
            "RUNNING" => Some(RunState::Running),
            "COMPLETED" => Some(RunState::Completed),
            "FAILED" => Some(RunState::Failed),
            "PARTIALLY_COMPLETED" => Some(RunState::PartiallyCompleted),
            "PUBLISHED" => Some(RunState::Published),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end-to-end analytics execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run identifier.
    pub run_id: RunId,
    /// Pinned market snapshot.
    pub market_snapshot_id: SnapshotId,
    /// Pinned position snapshot.
    pub position_snapshot_id: SnapshotId,
    /// Requested scenarios, in request order.
    pub scenario_ids: Vec<ScenarioId>,
    /// Requested measures.
    pub measures: MeasureSet,
    /// Current lifecycle state.
    pub state: RunState,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set when a terminal state is reached.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Claimable.
    Queued,
    /// Owned by a worker under a live (or expired, reclaimable) lease.
    Running,
    /// Terminal success.
    Succeeded,
    /// Terminal failure after exhausting attempts; kept for audit.
    Dead,
}

impl TaskStatus {
    /// Whether the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Dead)
    }

    /// Stable storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "QUEUED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Dead => "DEAD",
        }
    }

    /// Parse the storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(TaskStatus::Queued),
            "RUNNING" => Some(TaskStatus::Running),
            "SUCCEEDED" => Some(TaskStatus::Succeeded),
            "DEAD" => Some(TaskStatus::Dead),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One claimable shard of a run's workload.
///
/// Natural key: `(run_id, instrument_type, shard_index)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identifier.
    pub task_id: TaskId,
    /// Owning run.
    pub run_id: RunId,
    /// Instrument type this task covers.
    pub instrument_type: InstrumentType,
    /// Shard index in `0..shard_count`.
    pub shard_index: u32,
    /// Shard count the run was fanned out with for this type.
    pub shard_count: u32,
    /// Current status.
    pub status: TaskStatus,
    /// Current lease holder, while running.
    pub owner_id: Option<OwnerId>,
    /// Lease expiry, while running.
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Number of failed attempts so far.
    pub attempt_count: u32,
    /// Attempts after which the task goes dead instead of requeueing.
    pub max_attempts: u32,
    /// Most recent failure, kept for diagnosis.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a queued task for a (run, instrument type, shard) cell.
    pub fn queued(
        run_id: RunId,
        instrument_type: InstrumentType,
        shard_index: u32,
        shard_count: u32,
        max_attempts: u32,
    ) -> Self {
        Self {
            task_id: TaskId::new(),
            run_id,
            instrument_type,
            shard_index,
            shard_count,
            status: TaskStatus::Queued,
            owner_id: None,
            lease_expires_at: None,
            attempt_count: 0,
            max_attempts,
            last_error: None,
            created_at: Utc::now(),
        }
    }
}

/// Worker-reported outcome of processing a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Every (position, scenario) pair was priced and persisted.
    Succeeded,
    /// Processing aborted; the error is recorded on the task.
    Failed {
        /// Description of the failure.
        error: String,
    },
}

/// Result of a lease renewal attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseRenewal {
    /// Ownership confirmed; lease extended to the given instant.
    Renewed {
        /// New lease expiry.
        lease_expires_at: DateTime<Utc>,
    },
    /// The task was reassigned; the caller must abandon its work.
    LostOwnership,
}

/// Result of a completion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionDisposition {
    /// Task reached terminal success.
    Succeeded,
    /// Task failed below the attempt limit and is claimable again.
    Requeued {
        /// Failed attempts so far.
        attempt_count: u32,
    },
    /// Task failed at the attempt limit and is dead.
    Dead,
    /// The caller no longer owned the task; nothing was changed.
    StaleOwner,
}

/// Per-status task counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    /// Tasks waiting to be claimed.
    pub queued: u64,
    /// Tasks currently leased.
    pub running: u64,
    /// Tasks that succeeded.
    pub succeeded: u64,
    /// Tasks that went dead.
    pub dead: u64,
}

impl TaskCounts {
    /// Total number of tasks.
    pub fn total(&self) -> u64 {
        self.queued + self.running + self.succeeded + self.dead
    }

    /// Whether every task is in a terminal status.
    pub fn all_terminal(&self) -> bool {
        self.queued == 0 && self.running == 0
    }
}

/// Provenance metadata persisted with every valuation result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Identity of the pricer that produced the values.
    pub pricer_id: String,
    /// Version of the pricer.
    pub pricer_version: String,
    /// Market snapshot the perturbed view was derived from.
    pub market_snapshot_id: SnapshotId,
}

/// One persisted valuation: measures for a (run, position, scenario) key.
///
/// The key is unique; a write for an existing key overwrites
/// deterministically, which makes task retries safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResultRecord {
    /// Owning run.
    pub run_id: RunId,
    /// Valued position.
    pub position_id: PositionId,
    /// Scenario the position was valued under.
    pub scenario_id: ScenarioId,
    /// Measure name to value.
    pub measures: std::collections::BTreeMap<String, f64>,
    /// How the values were produced.
    pub provenance: Provenance,
    /// When the row was (last) written.
    pub computed_at: DateTime<Utc>,
}

/// Filter for result reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultFilter {
    /// Restrict to one position.
    pub position_id: Option<PositionId>,
    /// Restrict to one scenario.
    pub scenario_id: Option<ScenarioId>,
}

impl ResultFilter {
    /// Whether a row passes the filter.
    pub fn matches(&self, row: &ValuationResultRecord) -> bool {
        self.position_id
            .as_ref()
            .map(|p| p == &row.position_id)
            .unwrap_or(true)
            && self
                .scenario_id
                .as_ref()
                .map(|s| s == &row.scenario_id)
                .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_roundtrip() {
        for state in [
            RunState::Queued,
            RunState::Running,
            RunState::Completed,
            RunState::Failed,
            RunState::PartiallyCompleted,
            RunState::Published,
        ] {
            assert_eq!(RunState::parse(state.as_str()), Some(state));
        }
        assert_eq!(RunState::parse("BOGUS"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunState::Queued.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Published.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Dead.is_terminal());
    }

    #[test]
    fn test_queued_task_shape() {
        let task = TaskRecord::queued(RunId::new(), InstrumentType::new("bond"), 2, 4, 3);
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.shard_index, 2);
        assert_eq!(task.attempt_count, 0);
        assert!(task.owner_id.is_none());
        assert!(task.lease_expires_at.is_none());
    }

    #[test]
    fn test_task_counts_aggregate() {
        let counts = TaskCounts {
            queued: 0,
            running: 0,
            succeeded: 3,
            dead: 1,
        };
        assert_eq!(counts.total(), 4);
        assert!(counts.all_terminal());

        let counts = TaskCounts {
            queued: 1,
            ..counts
        };
        assert!(!counts.all_terminal());
    }

    #[test]
    fn test_result_filter() {
        let row = ValuationResultRecord {
            run_id: RunId::new(),
            position_id: PositionId::new("POS-1"),
            scenario_id: ScenarioId::base(),
            measures: std::collections::BTreeMap::new(),
            provenance: Provenance {
                pricer_id: "p".to_string(),
                pricer_version: "1".to_string(),
                market_snapshot_id: SnapshotId::new("sha256:00"),
            },
            computed_at: Utc::now(),
        };
        assert!(ResultFilter::default().matches(&row));
        let filter = ResultFilter {
            position_id: Some(PositionId::new("POS-1")),
            scenario_id: Some(ScenarioId::new("RATES_UP_1BP")),
        };
        assert!(!filter.matches(&row));
    }
}
