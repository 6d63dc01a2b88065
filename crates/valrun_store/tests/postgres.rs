//! Postgres backend integration tests.
//!
//! Ignored by default; run with a live database:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/valrun_test cargo test -p valrun_store -- --ignored
//! ```

use chrono::Utc;
use std::sync::Arc;
use valrun_core::market::{Curve, MarketView};
use valrun_core::scenario::Scenario;
use valrun_core::snapshot::{MarketSnapshot, SnapshotKind, SnapshotPayload};
use valrun_core::types::{measure_set, InstrumentType, OwnerId, RunId, ScenarioId};
use valrun_store::{
    CompletionDisposition, PgStore, RunRecord, RunState, Stores, TaskOutcome, TaskRecord,
    TaskStatus,
};

async fn stores() -> Stores {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for pg tests");
    let store = PgStore::connect(&url, 5).await.expect("connect");
    Stores::from_backend(Arc::new(store))
}

fn market_payload(rate: f64) -> SnapshotPayload {
    let mut view = MarketView::new(chrono::NaiveDate::from_ymd_opt(2026, 8, 28).unwrap());
    view.insert_curve("USD.OIS", Curve::flat(rate, &[1.0, 5.0]));
    SnapshotPayload::Market(MarketSnapshot { view })
}

fn run_with_one_task(market_id: valrun_core::types::SnapshotId) -> (RunRecord, TaskRecord) {
    let run = RunRecord {
        run_id: RunId::new(),
        market_snapshot_id: market_id.clone(),
        position_snapshot_id: market_id,
        scenario_ids: vec![ScenarioId::base()],
        measures: measure_set(["PV"]),
        state: RunState::Queued,
        created_at: Utc::now(),
        completed_at: None,
    };
    let task = TaskRecord::queued(run.run_id, InstrumentType::new("discount_bond"), 0, 1, 3);
    (run, task)
}

#[tokio::test]
#[ignore]
async fn test_pg_snapshot_put_is_idempotent() {
    let stores = stores().await;
    let payload = market_payload(0.0311);

    let first = stores.snapshots.put(&payload).await.unwrap();
    let second = stores.snapshots.put(&payload).await.unwrap();
    assert_eq!(first, second);
    assert!(stores.snapshots.contains(&first).await.unwrap());

    let back = stores.snapshots.get(&first).await.unwrap();
    assert_eq!(back.kind(), SnapshotKind::Market);
}

#[tokio::test]
#[ignore]
async fn test_pg_claim_and_complete_cycle() {
    let stores = stores().await;
    let market_id = stores.snapshots.put(&market_payload(0.0322)).await.unwrap();
    let (run, task) = run_with_one_task(market_id);
    stores
        .runs
        .create_run_with_tasks(&run, &[task.clone()])
        .await
        .unwrap();

    let owner = OwnerId::new("pg-test-worker");
    let claimed = stores
        .tasks
        .claim_next(&owner, chrono::Duration::seconds(30))
        .await
        .unwrap();
    // Another test's tasks may be in the table; claim until ours shows up.
    let mut claimed = claimed;
    for _ in 0..50 {
        match &claimed {
            Some(t) if t.run_id == run.run_id => break,
            Some(t) => {
                stores
                    .tasks
                    .complete(&t.task_id, &owner, TaskOutcome::Succeeded)
                    .await
                    .unwrap();
                claimed = stores
                    .tasks
                    .claim_next(&owner, chrono::Duration::seconds(30))
                    .await
                    .unwrap();
            }
            None => break,
        }
    }
    let claimed = claimed.expect("our task should be claimable");
    assert_eq!(claimed.run_id, run.run_id);
    assert_eq!(claimed.status, TaskStatus::Running);
    assert_eq!(claimed.owner_id, Some(owner.clone()));

    let disposition = stores
        .tasks
        .complete(&claimed.task_id, &owner, TaskOutcome::Succeeded)
        .await
        .unwrap();
    assert_eq!(disposition, CompletionDisposition::Succeeded);

    let counts = stores.tasks.task_counts(&run.run_id).await.unwrap();
    assert_eq!(counts.succeeded, 1);
}

#[tokio::test]
#[ignore]
async fn test_pg_run_transitions_are_conditional() {
    let stores = stores().await;
    let market_id = stores.snapshots.put(&market_payload(0.0333)).await.unwrap();
    let (run, task) = run_with_one_task(market_id);
    stores
        .runs
        .create_run_with_tasks(&run, &[task])
        .await
        .unwrap();

    // Publish straight from QUEUED must not apply.
    let applied = stores
        .runs
        .transition_run(&run.run_id, &[RunState::Completed], RunState::Published)
        .await
        .unwrap();
    assert!(!applied);

    let applied = stores
        .runs
        .transition_run(&run.run_id, &[RunState::Queued], RunState::Running)
        .await
        .unwrap();
    assert!(applied);
    assert_eq!(
        stores.runs.get_run(&run.run_id).await.unwrap().state,
        RunState::Running
    );
}

#[tokio::test]
#[ignore]
async fn test_pg_scenario_immutable_once_referenced() {
    let stores = stores().await;
    let id = format!("PG_TEST_{}", RunId::new());
    let scenario = Scenario::new(id.clone(), vec![]);
    stores.scenarios.put_scenario(&scenario).await.unwrap();

    let market_id = stores.snapshots.put(&market_payload(0.0344)).await.unwrap();
    let (mut run, task) = run_with_one_task(market_id);
    run.scenario_ids = vec![ScenarioId::new(id.clone())];
    stores
        .runs
        .create_run_with_tasks(&run, &[task])
        .await
        .unwrap();

    // Identical re-submission is fine; a differing one conflicts.
    stores.scenarios.put_scenario(&scenario).await.unwrap();
    let differing = Scenario::new(
        id,
        vec![valrun_core::scenario::PerturbationRule {
            target: valrun_core::scenario::TargetSelector::AllCurves,
            shift: valrun_core::scenario::Shift::Absolute { offset: 0.01 },
        }],
    );
    assert!(stores.scenarios.put_scenario(&differing).await.is_err());
}
