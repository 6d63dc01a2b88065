//! End-to-end engine behaviour over the in-memory backend: fanout, claim
//! exclusivity, lease recovery, retry exhaustion and result idempotency.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use valrun_core::market::{Curve, MarketView};
use valrun_core::pricing::{MeasureValues, Pricer, PricerError, PricerRegistry};
use valrun_core::scenario::{PerturbationRule, Scenario, Shift, TargetSelector};
use valrun_core::snapshot::{
    InstrumentDefinition, MarketSnapshot, Position, PositionSnapshot, SnapshotPayload,
};
use valrun_core::types::{measure_set, InstrumentType, MeasureSet, OwnerId, PositionId, ScenarioId};
use valrun_runtime::{
    Orchestrator, RunFailurePolicy, RunRequest, SchedulerConfig, SnapshotRef, TaskScheduler,
    Worker, WorkerConfig,
};
use valrun_store::{MemoryStore, RunState, Stores, TaskOutcome, TaskStatus};

struct DiscountedNotional;

impl Pricer for DiscountedNotional {
    fn id(&self) -> &str {
        "discounted_notional"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn price(
        &self,
        position: &Position,
        instrument: &InstrumentDefinition,
        market: &MarketView,
        measures: &MeasureSet,
        _scenario_id: &ScenarioId,
    ) -> Result<MeasureValues, PricerError> {
        let notional = instrument
            .get_f64("notional")
            .ok_or_else(|| PricerError::missing_field("notional", &position.position_id))?;
        let df = market.discount_factor("USD.OIS", 1.0)?;
        let mut values = MeasureValues::new();
        for measure in measures {
            match measure.as_str() {
                "PV" => {
                    values.insert(measure.clone(), position.quantity * notional * df);
                }
                other => return Err(PricerError::UnsupportedMeasure(other.to_string())),
            }
        }
        Ok(values)
    }
}

struct AlwaysFails;

impl Pricer for AlwaysFails {
    fn id(&self) -> &str {
        "always_fails"
    }

    fn version(&self) -> &str {
        "0.0"
    }

    fn price(
        &self,
        _position: &Position,
        _instrument: &InstrumentDefinition,
        _market: &MarketView,
        _measures: &MeasureSet,
        _scenario_id: &ScenarioId,
    ) -> Result<MeasureValues, PricerError> {
        Err(PricerError::Failed("synthetic failure".to_string()))
    }
}

fn position(id: &str, instrument_type: &str, notional: f64) -> Position {
    Position {
        position_id: PositionId::new(id),
        instrument_type: InstrumentType::new(instrument_type),
        quantity: 1.0,
        instrument: InstrumentDefinition::new(json!({ "notional": notional })),
    }
}

fn engine(
    scheduler_config: SchedulerConfig,
) -> (Arc<Orchestrator>, Stores, TaskScheduler) {
    let stores = Stores::from_backend(Arc::new(MemoryStore::new()));
    let scheduler = TaskScheduler::new(stores.tasks.clone(), scheduler_config);
    let orchestrator = Arc::new(Orchestrator::new(
        stores.clone(),
        scheduler.clone(),
        RunFailurePolicy::default(),
    ));
    (orchestrator, stores, scheduler)
}

async fn seed(stores: &Stores, positions: Vec<Position>) {
    let mut view = MarketView::new(chrono::NaiveDate::from_ymd_opt(2026, 8, 28).unwrap());
    view.insert_curve("USD.OIS", Curve::flat(0.03, &[1.0, 5.0]));
    view.insert_fx_spot("EURUSD", 1.10);
    stores
        .snapshots
        .put(&SnapshotPayload::Market(MarketSnapshot { view }))
        .await
        .unwrap();
    stores
        .snapshots
        .put(&SnapshotPayload::Positions(PositionSnapshot { positions }))
        .await
        .unwrap();
}

async fn wait_for_terminal(orchestrator: &Orchestrator, run: &valrun_store::RunRecord) -> RunState {
    for _ in 0..600 {
        let status = orchestrator.run_status(&run.run_id).await.unwrap();
        if status.run.state.is_terminal() {
            return status.run.state;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("run never reached a terminal state");
}

#[tokio::test]
async fn test_full_run_produces_all_result_rows() {
    let (orchestrator, stores, _) = engine(SchedulerConfig::default());
    seed(
        &stores,
        vec![
            position("B1", "bond", 100.0),
            position("B2", "bond", 200.0),
            position("B3", "bond", 300.0),
            position("F1", "fx_forward", 50.0),
            position("F2", "fx_forward", 75.0),
        ],
    )
    .await;
    stores
        .scenarios
        .put_scenario(&Scenario::new(
            "RATES_UP_1BP",
            vec![PerturbationRule {
                target: TargetSelector::AllCurves,
                shift: Shift::Absolute { offset: 0.0001 },
            }],
        ))
        .await
        .unwrap();

    let pricer = Arc::new(DiscountedNotional);
    let mut registry = PricerRegistry::new();
    registry.register(InstrumentType::new("bond"), pricer.clone());
    registry.register(InstrumentType::new("fx_forward"), pricer);
    let registry = Arc::new(registry);

    let run = orchestrator
        .create_run(RunRequest {
            market_snapshot: SnapshotRef::Latest,
            position_snapshot: SnapshotRef::Latest,
            scenario_ids: vec![ScenarioId::base(), ScenarioId::new("RATES_UP_1BP")],
            measures: measure_set(["PV"]),
        })
        .await
        .unwrap();

    // One shard per type: two tasks cover the whole book.
    let tasks = stores.tasks.tasks_for_run(&run.run_id).await.unwrap();
    assert_eq!(tasks.len(), 2);

    let (stop, shutdown) = watch::channel(false);
    let mut handles = Vec::new();
    for i in 0..3 {
        let worker = Worker::new(
            OwnerId::new(format!("worker-{i}")),
            orchestrator.clone(),
            registry.clone(),
            WorkerConfig {
                poll_interval_ms: 5,
                ..Default::default()
            },
        );
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move { worker.run(shutdown).await }));
    }

    let state = wait_for_terminal(&orchestrator, &run).await;
    stop.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(state, RunState::Completed);

    // 5 positions × 2 scenarios.
    let status = orchestrator.run_status(&run.run_id).await.unwrap();
    assert_eq!(status.result_count, 10);
    assert_eq!(status.tasks.succeeded, 2);

    let rows = stores
        .results
        .results_for_run(&run.run_id, &Default::default(), 0, 100)
        .await
        .unwrap();
    assert_eq!(rows.len(), 10);
    assert!(rows.iter().all(|r| r.measures.contains_key("PV")));
    assert!(rows
        .iter()
        .all(|r| r.provenance.market_snapshot_id == run.market_snapshot_id));

    // The shifted scenario discounts harder than base for each position.
    let b1_base = rows
        .iter()
        .find(|r| r.position_id.as_str() == "B1" && r.scenario_id.is_base())
        .unwrap();
    let b1_up = rows
        .iter()
        .find(|r| r.position_id.as_str() == "B1" && !r.scenario_id.is_base())
        .unwrap();
    assert!(b1_up.measures["PV"] < b1_base.measures["PV"]);
}

#[tokio::test]
async fn test_failing_pricer_exhausts_attempts_then_dead() {
    let config = SchedulerConfig {
        max_attempts: 3,
        ..Default::default()
    };
    let (orchestrator, stores, _) = engine(config);
    seed(&stores, vec![position("B1", "bond", 100.0)]).await;

    let mut registry = PricerRegistry::new();
    registry.register(InstrumentType::new("bond"), Arc::new(AlwaysFails));

    let run = orchestrator
        .create_run(RunRequest {
            market_snapshot: SnapshotRef::Latest,
            position_snapshot: SnapshotRef::Latest,
            scenario_ids: vec![],
            measures: measure_set(["PV"]),
        })
        .await
        .unwrap();

    let worker = Worker::new(
        OwnerId::new("worker-1"),
        orchestrator.clone(),
        Arc::new(registry),
        WorkerConfig {
            poll_interval_ms: 5,
            ..Default::default()
        },
    );
    let (stop, shutdown) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown).await });

    let state = wait_for_terminal(&orchestrator, &run).await;
    stop.send(true).unwrap();
    handle.await.unwrap();

    // No successes at all: the run fails outright.
    assert_eq!(state, RunState::Failed);

    let tasks = stores.tasks.tasks_for_run(&run.run_id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Dead);
    assert_eq!(tasks[0].attempt_count, 3);
    assert!(tasks[0].last_error.as_deref().unwrap().contains("synthetic failure"));

    let status = orchestrator.run_status(&run.run_id).await.unwrap();
    assert_eq!(status.result_count, 0);
}

#[tokio::test]
async fn test_concurrent_claims_are_exclusive() {
    let (orchestrator, stores, scheduler) = engine(SchedulerConfig::default());
    seed(&stores, vec![position("B1", "bond", 100.0)]).await;
    orchestrator
        .create_run(RunRequest {
            market_snapshot: SnapshotRef::Latest,
            position_snapshot: SnapshotRef::Latest,
            scenario_ids: vec![],
            measures: measure_set(["PV"]),
        })
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let scheduler = scheduler.clone();
        handles.push(tokio::spawn(async move {
            scheduler.claim_next(&OwnerId::new(format!("w{i}"))).await
        }));
    }
    let mut wins = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().is_some() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1);
}

#[tokio::test]
async fn test_expired_lease_is_reclaimed_and_stale_complete_ignored() {
    let config = SchedulerConfig {
        lease_seconds: 0,
        ..Default::default()
    };
    let (orchestrator, stores, scheduler) = engine(config);
    seed(&stores, vec![position("B1", "bond", 100.0)]).await;
    orchestrator
        .create_run(RunRequest {
            market_snapshot: SnapshotRef::Latest,
            position_snapshot: SnapshotRef::Latest,
            scenario_ids: vec![],
            measures: measure_set(["PV"]),
        })
        .await
        .unwrap();

    let crashed = OwnerId::new("crashed");
    let task = scheduler.claim_next(&crashed).await.unwrap().unwrap();

    // Zero-second lease: already expired, so another worker reclaims.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let successor = OwnerId::new("successor");
    let reclaimed = scheduler.claim_next(&successor).await.unwrap().unwrap();
    assert_eq!(reclaimed.task_id, task.task_id);
    assert_eq!(reclaimed.owner_id, Some(successor.clone()));

    // The zombie's completion must change nothing.
    let disposition = scheduler
        .complete(&task.task_id, &crashed, TaskOutcome::Succeeded)
        .await
        .unwrap();
    assert_eq!(disposition, valrun_store::CompletionDisposition::StaleOwner);

    let tasks = stores.tasks.tasks_for_run(&task.run_id).await.unwrap();
    assert_eq!(tasks[0].status, TaskStatus::Running);
    assert_eq!(tasks[0].owner_id, Some(successor));
}

#[tokio::test]
async fn test_reexecution_is_idempotent() {
    let (orchestrator, stores, scheduler) = engine(SchedulerConfig {
        lease_seconds: 0,
        ..Default::default()
    });
    seed(
        &stores,
        vec![position("B1", "bond", 100.0), position("B2", "bond", 200.0)],
    )
    .await;

    let pricer: Arc<dyn Pricer> = Arc::new(DiscountedNotional);
    let mut registry = PricerRegistry::new();
    registry.register(InstrumentType::new("bond"), pricer);
    let registry = Arc::new(registry);

    let run = orchestrator
        .create_run(RunRequest {
            market_snapshot: SnapshotRef::Latest,
            position_snapshot: SnapshotRef::Latest,
            scenario_ids: vec![],
            measures: measure_set(["PV"]),
        })
        .await
        .unwrap();

    // A worker claims the task and crashes before completing it; the
    // zero-second lease makes it immediately reclaimable.
    let crashed = OwnerId::new("crashed");
    scheduler.claim_next(&crashed).await.unwrap().unwrap();

    let worker = Worker::new(
        OwnerId::new("successor"),
        orchestrator.clone(),
        registry,
        WorkerConfig {
            poll_interval_ms: 5,
            ..Default::default()
        },
    );
    let (stop, shutdown) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown).await });
    let state = wait_for_terminal(&orchestrator, &run).await;
    stop.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(state, RunState::Completed);
    let status = orchestrator.run_status(&run.run_id).await.unwrap();
    // Claimed once by the crashed owner and re-executed by the successor,
    // yet exactly one row per (position, scenario).
    assert_eq!(status.result_count, 2);
}

#[tokio::test]
async fn test_completed_run_publishes_once() {
    let (orchestrator, stores, _) = engine(SchedulerConfig::default());
    seed(&stores, vec![position("B1", "bond", 100.0)]).await;

    let mut registry = PricerRegistry::new();
    registry.register(InstrumentType::new("bond"), Arc::new(DiscountedNotional));

    let run = orchestrator
        .create_run(RunRequest {
            market_snapshot: SnapshotRef::Latest,
            position_snapshot: SnapshotRef::Latest,
            scenario_ids: vec![],
            measures: measure_set(["PV"]),
        })
        .await
        .unwrap();

    let worker = Worker::new(
        OwnerId::new("worker-1"),
        orchestrator.clone(),
        Arc::new(registry),
        WorkerConfig {
            poll_interval_ms: 5,
            ..Default::default()
        },
    );
    let (stop, shutdown) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(shutdown).await });
    let state = wait_for_terminal(&orchestrator, &run).await;
    stop.send(true).unwrap();
    handle.await.unwrap();
    assert_eq!(state, RunState::Completed);

    orchestrator.publish(&run.run_id).await.unwrap();
    let status = orchestrator.run_status(&run.run_id).await.unwrap();
    assert_eq!(status.run.state, RunState::Published);

    // Publish is one-way and not repeatable.
    assert!(orchestrator.publish(&run.run_id).await.is_err());
}
