//! The worker loop: claim, process, complete.
//!
//! Workers are identical and stateless between tasks; any worker can
//! process any task. The loop never holds state that matters across a
//! crash: results are upserted idempotently, so a task re-executed after a
//! lease expiry converges to the same rows.
//!
//! Error handling is split by recoverability. A pricer failure or a
//! missing capability fails the task (the store requeues it or marks it
//! dead). A transient store outage mid-task abandons the work without
//! completing it at all; the lease expiry retries it later without burning
//! an attempt.

use crate::config::WorkerConfig;
use crate::orchestrator::Orchestrator;
use crate::scheduler::TaskScheduler;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use valrun_core::pricing::PricerRegistry;
use valrun_core::scenario;
use valrun_core::types::OwnerId;
use valrun_store::{
    CompletionDisposition, LeaseRenewal, Provenance, StoreError, TaskOutcome, TaskRecord,
    ValuationResultRecord,
};

/// One claim-process-complete loop over the shared task table.
pub struct Worker {
    owner_id: OwnerId,
    orchestrator: Arc<Orchestrator>,
    registry: Arc<PricerRegistry>,
    config: WorkerConfig,
}

impl Worker {
    /// Create a worker with a unique owner id.
    pub fn new(
        owner_id: OwnerId,
        orchestrator: Arc<Orchestrator>,
        registry: Arc<PricerRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            owner_id,
            orchestrator,
            registry,
            config,
        }
    }

    /// This worker's owner id.
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    fn scheduler(&self) -> &TaskScheduler {
        self.orchestrator.scheduler()
    }

    /// Run the worker loop until `shutdown` flips to `true`.
    ///
    /// An in-flight task is finished before the loop exits; a task
    /// abandoned by a hard kill instead is recovered by lease expiry.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(owner = %self.owner_id, "worker started");
        let mut backoff_ms = self.config.poll_interval_ms;
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.scheduler().claim_next(&self.owner_id).await {
                Ok(Some(task)) => {
                    backoff_ms = self.config.poll_interval_ms;
                    self.handle_claimed(task).await;
                }
                Ok(None) => {
                    backoff_ms = self.config.poll_interval_ms;
                    let idle = self.idle_sleep();
                    tokio::select! {
                        _ = tokio::time::sleep(idle) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(err) => {
                    tracing::warn!(owner = %self.owner_id, error = %err, "claim failed, backing off");
                    let pause = Duration::from_millis(backoff_ms);
                    backoff_ms = (backoff_ms * 2).min(self.config.backoff_max_ms);
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }
        tracing::info!(owner = %self.owner_id, "worker stopped");
    }

    /// Poll-sleep with jitter so idle workers do not thunder in lockstep.
    fn idle_sleep(&self) -> Duration {
        let base = self.config.poll_interval_ms;
        let jitter = rand::thread_rng().gen_range(0..=base / 4 + 1);
        Duration::from_millis(base + jitter)
    }

    /// Process a claimed task end to end, renewing the lease as we go.
    async fn handle_claimed(&self, task: TaskRecord) {
        tracing::debug!(
            owner = %self.owner_id,
            task_id = %task.task_id,
            run_id = %task.run_id,
            instrument_type = %task.instrument_type,
            shard = task.shard_index,
            "task claimed"
        );
        if let Err(err) = self.orchestrator.mark_running(&task.run_id).await {
            tracing::warn!(task_id = %task.task_id, error = %err, "marking run running failed");
        }

        let renew_every = self
            .config
            .renew_interval(self.scheduler().config());
        let mut renew = tokio::time::interval(renew_every);
        renew.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        renew.tick().await; // first tick fires immediately

        let work = self.process_task(&task);
        tokio::pin!(work);
        let outcome = loop {
            tokio::select! {
                outcome = &mut work => break outcome,
                _ = renew.tick() => {
                    match self.scheduler().renew_lease(&task.task_id, &self.owner_id).await {
                        Ok(LeaseRenewal::Renewed { .. }) => {}
                        Ok(LeaseRenewal::LostOwnership) => {
                            tracing::warn!(
                                owner = %self.owner_id,
                                task_id = %task.task_id,
                                "lease lost, abandoning task"
                            );
                            return;
                        }
                        Err(err) => {
                            tracing::warn!(task_id = %task.task_id, error = %err, "lease renewal failed");
                        }
                    }
                }
            }
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                // Transient store failure: abandon without completing so the
                // retry does not burn an attempt.
                tracing::warn!(
                    task_id = %task.task_id,
                    error = %err,
                    "store unavailable mid-task, abandoning"
                );
                return;
            }
        };

        match self
            .scheduler()
            .complete(&task.task_id, &self.owner_id, outcome)
            .await
        {
            Ok(CompletionDisposition::Succeeded) => {
                tracing::info!(task_id = %task.task_id, run_id = %task.run_id, "task succeeded");
            }
            Ok(CompletionDisposition::Requeued { attempt_count }) => {
                tracing::warn!(
                    task_id = %task.task_id,
                    attempt_count,
                    "task failed, requeued"
                );
            }
            Ok(CompletionDisposition::Dead) => {
                tracing::error!(task_id = %task.task_id, run_id = %task.run_id, "task dead");
            }
            Ok(CompletionDisposition::StaleOwner) => {
                tracing::warn!(task_id = %task.task_id, "completion from stale owner ignored");
                return;
            }
            Err(err) => {
                tracing::warn!(task_id = %task.task_id, error = %err, "completion failed");
                return;
            }
        }

        if let Err(err) = self.orchestrator.refresh_run_state(&task.run_id).await {
            tracing::warn!(run_id = %task.run_id, error = %err, "run state refresh failed");
        }
    }

    /// Price every (position, scenario) pair in the task's cell.
    ///
    /// Returns `Err` only for transient store failure; every
    /// domain failure becomes a [`TaskOutcome::Failed`].
    async fn process_task(&self, task: &TaskRecord) -> Result<TaskOutcome, StoreError> {
        let stores = self.orchestrator.stores();

        let run = match stores.runs.get_run(&task.run_id).await {
            Ok(run) => run,
            Err(err) => return Self::store_failure(err),
        };
        let market = match stores.snapshots.get(&run.market_snapshot_id).await {
            Ok(payload) => match payload.as_market() {
                Some(market) => market.clone(),
                None => {
                    return Ok(TaskOutcome::Failed {
                        error: format!(
                            "snapshot {} is not a market snapshot",
                            run.market_snapshot_id
                        ),
                    })
                }
            },
            Err(err) => return Self::store_failure(err),
        };
        let positions = match stores.snapshots.get(&run.position_snapshot_id).await {
            Ok(payload) => match payload.as_positions() {
                Some(positions) => positions.clone(),
                None => {
                    return Ok(TaskOutcome::Failed {
                        error: format!(
                            "snapshot {} is not a position snapshot",
                            run.position_snapshot_id
                        ),
                    })
                }
            },
            Err(err) => return Self::store_failure(err),
        };

        let cell = self.scheduler().positions_for_task(&positions, task);
        if cell.is_empty() {
            // An empty shard is a legitimate success: zero result rows.
            return Ok(TaskOutcome::Succeeded);
        }

        let pricer = match self.registry.resolve(&task.instrument_type) {
            Ok(pricer) => pricer,
            Err(err) => return Ok(TaskOutcome::Failed { error: err.to_string() }),
        };

        for scenario_id in &run.scenario_ids {
            let definition = match stores.scenarios.get_scenario(scenario_id).await {
                Ok(definition) => definition,
                Err(err) => return Self::store_failure(err),
            };
            // One perturbed view per scenario, shared by every position in
            // the cell.
            let view = scenario::apply(&market.view, &definition);
            for position in &cell {
                let values = match pricer.price(
                    position,
                    &position.instrument,
                    &view,
                    &run.measures,
                    scenario_id,
                ) {
                    Ok(values) => values,
                    Err(err) => {
                        return Ok(TaskOutcome::Failed {
                            error: format!("pricing {} failed: {err}", position.position_id),
                        })
                    }
                };
                let row = ValuationResultRecord {
                    run_id: run.run_id,
                    position_id: position.position_id.clone(),
                    scenario_id: scenario_id.clone(),
                    measures: values,
                    provenance: Provenance {
                        pricer_id: pricer.id().to_string(),
                        pricer_version: pricer.version().to_string(),
                        market_snapshot_id: run.market_snapshot_id.clone(),
                    },
                    computed_at: chrono::Utc::now(),
                };
                if let Err(err) = stores.results.upsert_result(&row).await {
                    return Self::store_failure(err);
                }
            }
        }
        Ok(TaskOutcome::Succeeded)
    }

    /// Split store failures by recoverability: unavailability propagates
    /// (abandon the task), anything else fails the task on the spot.
    fn store_failure(err: StoreError) -> Result<TaskOutcome, StoreError> {
        match err {
            StoreError::Unavailable(_) => Err(err),
            other => Ok(TaskOutcome::Failed {
                error: other.to_string(),
            }),
        }
    }
}
