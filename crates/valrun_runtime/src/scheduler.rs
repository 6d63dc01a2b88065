//! Task scheduler: fanout partitioning and the claim protocol.
//!
//! The scheduler owns no state of its own; every mutation is one atomic
//! operation on the shared task store. Fanout produces the task records for
//! a run (one per instrument type × shard), and the claim/renew/complete
//! calls delegate to the store, which enforces the single-active-owner
//! invariant.

use crate::config::SchedulerConfig;
use crate::shard::shard_for;
use std::sync::Arc;
use valrun_core::snapshot::{Position, PositionSnapshot};
use valrun_core::types::{OwnerId, RunId, TaskId};
use valrun_store::{
    CompletionDisposition, LeaseRenewal, StoreError, TaskOutcome, TaskRecord, TaskStore,
};

/// Partitions runs into tasks and mediates the claim protocol.
#[derive(Clone)]
pub struct TaskScheduler {
    tasks: Arc<dyn TaskStore>,
    config: SchedulerConfig,
}

impl TaskScheduler {
    /// Create a scheduler over a task store.
    pub fn new(tasks: Arc<dyn TaskStore>, config: SchedulerConfig) -> Self {
        Self { tasks, config }
    }

    /// The scheduler's configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Build the task records covering a position snapshot.
    ///
    /// One queued task per (instrument type present in the snapshot) ×
    /// (shard index below the configured count for that type). The records
    /// are returned for the orchestrator to persist atomically with the
    /// run row; nothing is written here.
    pub fn fanout(&self, run_id: RunId, positions: &PositionSnapshot) -> Vec<TaskRecord> {
        let mut tasks = Vec::new();
        for instrument_type in positions.instrument_types() {
            let shard_count = self.config.shard_count(&instrument_type);
            for shard_index in 0..shard_count {
                tasks.push(TaskRecord::queued(
                    run_id,
                    instrument_type.clone(),
                    shard_index,
                    shard_count,
                    self.config.max_attempts,
                ));
            }
        }
        tasks
    }

    /// The positions of a snapshot that fall into a task's cell.
    ///
    /// Filters by the task's instrument type and stable shard assignment
    /// under the shard count the task was fanned out with.
    pub fn positions_for_task<'a>(
        &self,
        snapshot: &'a PositionSnapshot,
        task: &TaskRecord,
    ) -> Vec<&'a Position> {
        snapshot
            .positions
            .iter()
            .filter(|p| {
                p.instrument_type == task.instrument_type
                    && shard_for(&p.position_id, task.shard_count) == task.shard_index
            })
            .collect()
    }

    /// Atomically claim one claimable task for `owner` under the configured
    /// lease.
    pub async fn claim_next(&self, owner: &OwnerId) -> Result<Option<TaskRecord>, StoreError> {
        self.tasks.claim_next(owner, self.config.lease()).await
    }

    /// Extend the lease on a task still owned by `owner`.
    pub async fn renew_lease(
        &self,
        task_id: &TaskId,
        owner: &OwnerId,
    ) -> Result<LeaseRenewal, StoreError> {
        self.tasks
            .renew_lease(task_id, owner, self.config.lease())
            .await
    }

    /// Report a task outcome; stale-owner calls come back as
    /// [`CompletionDisposition::StaleOwner`] and change nothing.
    pub async fn complete(
        &self,
        task_id: &TaskId,
        owner: &OwnerId,
        outcome: TaskOutcome,
    ) -> Result<CompletionDisposition, StoreError> {
        self.tasks.complete(task_id, owner, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use valrun_core::snapshot::InstrumentDefinition;
    use valrun_core::types::{InstrumentType, PositionId};
    use valrun_store::MemoryStore;

    fn position(id: &str, instrument_type: &str) -> Position {
        Position {
            position_id: PositionId::new(id),
            instrument_type: InstrumentType::new(instrument_type),
            quantity: 1.0,
            instrument: InstrumentDefinition::new(json!({})),
        }
    }

    fn scheduler(config: SchedulerConfig) -> TaskScheduler {
        TaskScheduler::new(Arc::new(MemoryStore::new()), config)
    }

    #[test]
    fn test_fanout_covers_types_times_shards() {
        let mut config = SchedulerConfig::default();
        config.shard_counts.insert("bond".to_string(), 3);
        let scheduler = scheduler(config);

        let snapshot = PositionSnapshot {
            positions: vec![
                position("P1", "bond"),
                position("P2", "bond"),
                position("P3", "fx_forward"),
            ],
        };
        let run_id = RunId::new();
        let tasks = scheduler.fanout(run_id, &snapshot);

        // 3 bond shards + 1 fx_forward shard.
        assert_eq!(tasks.len(), 4);
        let bond_tasks: Vec<_> = tasks
            .iter()
            .filter(|t| t.instrument_type.as_str() == "bond")
            .collect();
        assert_eq!(bond_tasks.len(), 3);
        let indices: Vec<u32> = bond_tasks.iter().map(|t| t.shard_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(tasks.iter().all(|t| t.run_id == run_id));
    }

    #[test]
    fn test_fanout_of_empty_snapshot_is_empty() {
        let scheduler = scheduler(SchedulerConfig::default());
        let snapshot = PositionSnapshot { positions: vec![] };
        assert!(scheduler.fanout(RunId::new(), &snapshot).is_empty());
    }

    #[test]
    fn test_positions_for_task_partition_the_snapshot() {
        let mut config = SchedulerConfig::default();
        config.shard_counts.insert("bond".to_string(), 4);
        let scheduler = scheduler(config);

        let snapshot = PositionSnapshot {
            positions: (0..20)
                .map(|i| position(&format!("P{i}"), "bond"))
                .chain(std::iter::once(position("FX1", "fx_forward")))
                .collect(),
        };
        let run_id = RunId::new();
        let tasks = scheduler.fanout(run_id, &snapshot);

        // Every bond position lands in exactly one bond shard.
        let mut covered = 0;
        for task in tasks.iter().filter(|t| t.instrument_type.as_str() == "bond") {
            covered += scheduler.positions_for_task(&snapshot, task).len();
        }
        assert_eq!(covered, 20);

        let fx_task = tasks
            .iter()
            .find(|t| t.instrument_type.as_str() == "fx_forward")
            .unwrap();
        let fx_positions = scheduler.positions_for_task(&snapshot, fx_task);
        assert_eq!(fx_positions.len(), 1);
        assert_eq!(fx_positions[0].position_id.as_str(), "FX1");
    }

    #[tokio::test]
    async fn test_claim_passes_through_to_store() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = TaskScheduler::new(store.clone(), SchedulerConfig::default());
        let owner = OwnerId::new("worker-1");

        // Nothing fanned out yet.
        assert!(scheduler.claim_next(&owner).await.unwrap().is_none());
    }
}
