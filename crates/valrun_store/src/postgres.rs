//! PostgreSQL backend via sqlx.
//!
//! Claim atomicity rests on a conditional `UPDATE` whose target row is
//! selected with `FOR UPDATE SKIP LOCKED`: a row another in-flight claim
//! has locked is skipped rather than waited on, so two concurrent claimers
//! can never select the same task. Completion and renewal carry the owner
//! id in their `WHERE` clause, which makes stale-owner calls zero-row
//! no-ops.

use crate::records::{
    CompletionDisposition, LeaseRenewal, ResultFilter, RunRecord, RunState, TaskCounts,
    TaskOutcome, TaskRecord, TaskStatus, ValuationResultRecord,
};
use crate::traits::{ResultStore, RunStore, ScenarioStore, SnapshotStore, TaskStore};
use crate::{content, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;
use valrun_core::scenario::Scenario;
use valrun_core::snapshot::{SnapshotKind, SnapshotPayload};
use valrun_core::types::{
    InstrumentType, OwnerId, PositionId, RunId, ScenarioId, SnapshotId, TaskId,
};

/// PostgreSQL implementation of every store trait.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database and apply pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (assumed migrated).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_uuid(text: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(text).map_err(|e| StoreError::Serialisation(format!("bad uuid: {e}")))
}

fn task_from_row(row: &PgRow) -> Result<TaskRecord, StoreError> {
    let status_text: String = row.try_get("status")?;
    let status = TaskStatus::parse(&status_text)
        .ok_or_else(|| StoreError::Serialisation(format!("bad task status: {status_text}")))?;
    let task_id: String = row.try_get("task_id")?;
    let run_id: String = row.try_get("run_id")?;
    Ok(TaskRecord {
        task_id: TaskId::from(parse_uuid(&task_id)?),
        run_id: RunId::from(parse_uuid(&run_id)?),
        instrument_type: InstrumentType::new(row.try_get::<String, _>("instrument_type")?),
        shard_index: row.try_get::<i32, _>("shard_index")? as u32,
        shard_count: row.try_get::<i32, _>("shard_count")? as u32,
        status,
        owner_id: row
            .try_get::<Option<String>, _>("owner_id")?
            .map(OwnerId::new),
        lease_expires_at: row.try_get("lease_expires_at")?,
        attempt_count: row.try_get::<i32, _>("attempt_count")? as u32,
        max_attempts: row.try_get::<i32, _>("max_attempts")? as u32,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
    })
}

fn run_from_row(row: &PgRow) -> Result<RunRecord, StoreError> {
    let state_text: String = row.try_get("state")?;
    let state = RunState::parse(&state_text)
        .ok_or_else(|| StoreError::Serialisation(format!("bad run state: {state_text}")))?;
    let run_id: String = row.try_get("run_id")?;
    let scenario_ids: serde_json::Value = row.try_get("scenario_ids")?;
    let measures: serde_json::Value = row.try_get("measures")?;
    Ok(RunRecord {
        run_id: RunId::from(parse_uuid(&run_id)?),
        market_snapshot_id: SnapshotId::new(row.try_get::<String, _>("market_snapshot_id")?),
        position_snapshot_id: SnapshotId::new(row.try_get::<String, _>("position_snapshot_id")?),
        scenario_ids: serde_json::from_value(scenario_ids)?,
        measures: serde_json::from_value(measures)?,
        state,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn result_from_row(row: &PgRow) -> Result<ValuationResultRecord, StoreError> {
    let run_id: String = row.try_get("run_id")?;
    let measures: serde_json::Value = row.try_get("measures")?;
    let provenance: serde_json::Value = row.try_get("provenance")?;
    Ok(ValuationResultRecord {
        run_id: RunId::from(parse_uuid(&run_id)?),
        position_id: PositionId::new(row.try_get::<String, _>("position_id")?),
        scenario_id: ScenarioId::new(row.try_get::<String, _>("scenario_id")?),
        measures: serde_json::from_value(measures)?,
        provenance: serde_json::from_value(provenance)?,
        computed_at: row.try_get("computed_at")?,
    })
}

#[async_trait]
impl SnapshotStore for PgStore {
    async fn put(&self, payload: &SnapshotPayload) -> Result<SnapshotId, StoreError> {
        let id = content::content_id(payload)?;
        let json = serde_json::to_value(payload)?;
        sqlx::query(
            "INSERT INTO snapshots (snapshot_id, kind, payload)
             VALUES ($1, $2, $3)
             ON CONFLICT (snapshot_id) DO NOTHING",
        )
        .bind(id.as_str())
        .bind(payload.kind().to_string())
        .bind(json)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get(&self, id: &SnapshotId) -> Result<SnapshotPayload, StoreError> {
        let row = sqlx::query("SELECT payload FROM snapshots WHERE snapshot_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("snapshot {id}")))?;
        let payload: serde_json::Value = row.try_get("payload")?;
        Ok(serde_json::from_value(payload)?)
    }

    async fn contains(&self, id: &SnapshotId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 AS one FROM snapshots WHERE snapshot_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn latest(&self, kind: SnapshotKind) -> Result<Option<SnapshotId>, StoreError> {
        let row = sqlx::query(
            "SELECT snapshot_id FROM snapshots
             WHERE kind = $1
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(kind.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| {
            Ok::<_, StoreError>(SnapshotId::new(r.try_get::<String, _>("snapshot_id")?))
        })
        .transpose()
    }
}

#[async_trait]
impl ScenarioStore for PgStore {
    async fn put_scenario(&self, scenario: &Scenario) -> Result<(), StoreError> {
        let definition = serde_json::to_value(scenario)?;
        // Unreferenced scenarios may be redefined; referenced ones only if
        // the definition is unchanged.
        let result = sqlx::query(
            "INSERT INTO scenarios (scenario_id, definition)
             VALUES ($1, $2)
             ON CONFLICT (scenario_id) DO UPDATE SET definition = EXCLUDED.definition
             WHERE NOT scenarios.referenced OR scenarios.definition = EXCLUDED.definition",
        )
        .bind(scenario.scenario_id.as_str())
        .bind(&definition)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "scenario {} is referenced by a run and cannot be redefined",
                scenario.scenario_id
            )));
        }
        Ok(())
    }

    async fn get_scenario(&self, id: &ScenarioId) -> Result<Scenario, StoreError> {
        let row = sqlx::query("SELECT definition FROM scenarios WHERE scenario_id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let definition: serde_json::Value = row.try_get("definition")?;
                Ok(serde_json::from_value(definition)?)
            }
            None if id.is_base() => Ok(Scenario::base()),
            None => Err(StoreError::NotFound(format!("scenario {id}"))),
        }
    }
}

#[async_trait]
impl RunStore for PgStore {
    async fn create_run_with_tasks(
        &self,
        run: &RunRecord,
        tasks: &[TaskRecord],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO runs
                 (run_id, market_snapshot_id, position_snapshot_id,
                  scenario_ids, measures, state, created_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(run.run_id.to_string())
        .bind(run.market_snapshot_id.as_str())
        .bind(run.position_snapshot_id.as_str())
        .bind(serde_json::to_value(&run.scenario_ids)?)
        .bind(serde_json::to_value(&run.measures)?)
        .bind(run.state.as_str())
        .bind(run.created_at)
        .bind(run.completed_at)
        .execute(&mut *tx)
        .await?;

        for task in tasks {
            sqlx::query(
                "INSERT INTO tasks
                     (task_id, run_id, instrument_type, shard_index, shard_count,
                      status, owner_id, lease_expires_at, attempt_count,
                      max_attempts, last_error, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(task.task_id.to_string())
            .bind(task.run_id.to_string())
            .bind(task.instrument_type.as_str())
            .bind(task.shard_index as i32)
            .bind(task.shard_count as i32)
            .bind(task.status.as_str())
            .bind(task.owner_id.as_ref().map(|o| o.as_str().to_string()))
            .bind(task.lease_expires_at)
            .bind(task.attempt_count as i32)
            .bind(task.max_attempts as i32)
            .bind(task.last_error.as_deref())
            .bind(task.created_at)
            .execute(&mut *tx)
            .await?;
        }

        for scenario_id in &run.scenario_ids {
            sqlx::query("UPDATE scenarios SET referenced = TRUE WHERE scenario_id = $1")
                .bind(scenario_id.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_run(&self, id: &RunId) -> Result<RunRecord, StoreError> {
        let row = sqlx::query("SELECT * FROM runs WHERE run_id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("run {id}")))?;
        run_from_row(&row)
    }

    async fn transition_run(
        &self,
        id: &RunId,
        from: &[RunState],
        to: RunState,
    ) -> Result<bool, StoreError> {
        if !self.contains_run(id).await? {
            return Err(StoreError::NotFound(format!("run {id}")));
        }
        let from_texts: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let result = sqlx::query(
            "UPDATE runs
             SET state = $2,
                 completed_at = CASE WHEN $3 AND completed_at IS NULL
                                     THEN now() ELSE completed_at END
             WHERE run_id = $1 AND state = ANY($4)",
        )
        .bind(id.to_string())
        .bind(to.as_str())
        .bind(to.is_terminal())
        .bind(&from_texts)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

impl PgStore {
    async fn contains_run(&self, id: &RunId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 AS one FROM runs WHERE run_id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn claim_next(
        &self,
        owner: &OwnerId,
        lease: chrono::Duration,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let lease_secs = lease.num_milliseconds() as f64 / 1000.0;
        let row = sqlx::query(
            "UPDATE tasks
             SET status = 'RUNNING',
                 owner_id = $1,
                 lease_expires_at = now() + make_interval(secs => $2)
             WHERE task_id = (
                 SELECT task_id FROM tasks
                 WHERE status = 'QUEUED'
                    OR (status = 'RUNNING' AND lease_expires_at < now())
                 ORDER BY created_at, task_id
                 FOR UPDATE SKIP LOCKED
                 LIMIT 1
             )
             RETURNING *",
        )
        .bind(owner.as_str())
        .bind(lease_secs)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| task_from_row(&r)).transpose()
    }

    async fn renew_lease(
        &self,
        task_id: &TaskId,
        owner: &OwnerId,
        lease: chrono::Duration,
    ) -> Result<LeaseRenewal, StoreError> {
        let lease_secs = lease.num_milliseconds() as f64 / 1000.0;
        let row = sqlx::query(
            "UPDATE tasks
             SET lease_expires_at = now() + make_interval(secs => $3)
             WHERE task_id = $1 AND owner_id = $2 AND status = 'RUNNING'
             RETURNING lease_expires_at",
        )
        .bind(task_id.to_string())
        .bind(owner.as_str())
        .bind(lease_secs)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(LeaseRenewal::Renewed {
                lease_expires_at: row.try_get::<DateTime<Utc>, _>("lease_expires_at")?,
            }),
            None => Ok(LeaseRenewal::LostOwnership),
        }
    }

    async fn complete(
        &self,
        task_id: &TaskId,
        owner: &OwnerId,
        outcome: TaskOutcome,
    ) -> Result<CompletionDisposition, StoreError> {
        let (succeeded, error) = match &outcome {
            TaskOutcome::Succeeded => (true, None),
            TaskOutcome::Failed { error } => (false, Some(error.clone())),
        };
        let row = sqlx::query(
            "UPDATE tasks
             SET status = CASE WHEN $3 THEN 'SUCCEEDED'
                               WHEN attempt_count + 1 >= max_attempts THEN 'DEAD'
                               ELSE 'QUEUED' END,
                 attempt_count = CASE WHEN $3 THEN attempt_count
                                      ELSE attempt_count + 1 END,
                 last_error = CASE WHEN $3 THEN last_error ELSE $4 END,
                 owner_id = NULL,
                 lease_expires_at = NULL
             WHERE task_id = $1 AND owner_id = $2 AND status = 'RUNNING'
             RETURNING status, attempt_count",
        )
        .bind(task_id.to_string())
        .bind(owner.as_str())
        .bind(succeeded)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(CompletionDisposition::StaleOwner);
        };
        let status: String = row.try_get("status")?;
        match status.as_str() {
            "SUCCEEDED" => Ok(CompletionDisposition::Succeeded),
            "DEAD" => Ok(CompletionDisposition::Dead),
            _ => Ok(CompletionDisposition::Requeued {
                attempt_count: row.try_get::<i32, _>("attempt_count")? as u32,
            }),
        }
    }

    async fn tasks_for_run(&self, run_id: &RunId) -> Result<Vec<TaskRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM tasks
             WHERE run_id = $1
             ORDER BY instrument_type, shard_index",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn task_counts(&self, run_id: &RunId) -> Result<TaskCounts, StoreError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM tasks
             WHERE run_id = $1
             GROUP BY status",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        let mut counts = TaskCounts::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let n = row.try_get::<i64, _>("n")? as u64;
            match TaskStatus::parse(&status) {
                Some(TaskStatus::Queued) => counts.queued = n,
                Some(TaskStatus::Running) => counts.running = n,
                Some(TaskStatus::Succeeded) => counts.succeeded = n,
                Some(TaskStatus::Dead) => counts.dead = n,
                None => {
                    return Err(StoreError::Serialisation(format!(
                        "bad task status: {status}"
                    )))
                }
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn upsert_result(&self, row: &ValuationResultRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO valuation_results
                 (run_id, position_id, scenario_id, measures, provenance, computed_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (run_id, position_id, scenario_id)
             DO UPDATE SET measures = EXCLUDED.measures,
                           provenance = EXCLUDED.provenance,
                           computed_at = EXCLUDED.computed_at",
        )
        .bind(row.run_id.to_string())
        .bind(row.position_id.as_str())
        .bind(row.scenario_id.as_str())
        .bind(serde_json::to_value(&row.measures)?)
        .bind(serde_json::to_value(&row.provenance)?)
        .bind(row.computed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn results_for_run(
        &self,
        run_id: &RunId,
        filter: &ResultFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<ValuationResultRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM valuation_results
             WHERE run_id = $1
               AND ($2::text IS NULL OR position_id = $2)
               AND ($3::text IS NULL OR scenario_id = $3)
             ORDER BY position_id, scenario_id
             OFFSET $4 LIMIT $5",
        )
        .bind(run_id.to_string())
        .bind(filter.position_id.as_ref().map(|p| p.as_str().to_string()))
        .bind(filter.scenario_id.as_ref().map(|s| s.as_str().to_string()))
        .bind(offset as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(result_from_row).collect()
    }

    async fn result_count(&self, run_id: &RunId) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM valuation_results WHERE run_id = $1")
            .bind(run_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")? as u64)
    }
}
