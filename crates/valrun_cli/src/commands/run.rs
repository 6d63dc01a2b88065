//! Run command implementation
//!
//! Hosts the whole engine in-process: loads snapshot files, stores them in
//! an in-memory backend, submits one run and drives it to a terminal state
//! with a local worker pool.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use valrun_core::pricing::PricerRegistry;
use valrun_core::scenario::Scenario;
use valrun_core::snapshot::SnapshotPayload;
use valrun_core::types::{MeasureSet, OwnerId, ScenarioId};
use valrun_runtime::{
    Orchestrator, RunFailurePolicy, RunRequest, RunStatusSummary, SchedulerConfig, SnapshotRef,
    TaskScheduler, Worker, WorkerConfig,
};
use valrun_store::{MemoryStore, ResultFilter, Stores, ValuationResultRecord};

use crate::{CliError, Result};

/// Run the run command
pub async fn run(
    market_path: &str,
    positions_path: &str,
    scenarios_path: Option<&str>,
    scenario_ids: &[String],
    measures: &[String],
    workers: u32,
) -> Result<()> {
    let market = load_payload(market_path)?;
    let positions = load_payload(positions_path)?;
    let scenarios = match scenarios_path {
        Some(path) => load_scenarios(path)?,
        None => Vec::new(),
    };

    let (summary, results) = execute(
        market,
        positions,
        scenarios,
        scenario_ids.iter().map(ScenarioId::new).collect(),
        measures.iter().cloned().collect(),
        workers,
    )
    .await?;

    print_results(&summary, &results);

    if summary.run.state != valrun_store::RunState::Completed {
        return Err(CliError::RunFailed(summary.run.state));
    }
    Ok(())
}

/// Load a tagged snapshot payload from a JSON file.
fn load_payload(path: &str) -> Result<SnapshotPayload> {
    if !std::path::Path::new(path).exists() {
        return Err(CliError::FileNotFound(path.to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Load a scenario catalog (JSON array of definitions) from a file.
fn load_scenarios(path: &str) -> Result<Vec<Scenario>> {
    if !std::path::Path::new(path).exists() {
        return Err(CliError::FileNotFound(path.to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Execute one run over an in-memory engine and return its summary and
/// result rows.
pub(crate) async fn execute(
    market: SnapshotPayload,
    positions: SnapshotPayload,
    scenarios: Vec<Scenario>,
    scenario_ids: Vec<ScenarioId>,
    measures: MeasureSet,
    workers: u32,
) -> Result<(RunStatusSummary, Vec<ValuationResultRecord>)> {
    let stores = Stores::from_backend(Arc::new(MemoryStore::new()));
    let scheduler = TaskScheduler::new(stores.tasks.clone(), SchedulerConfig::default());
    let orchestrator = Arc::new(Orchestrator::new(
        stores.clone(),
        scheduler,
        RunFailurePolicy::default(),
    ));

    let mut registry = PricerRegistry::new();
    valrun_pricers::register_builtin(&mut registry);
    let registry = Arc::new(registry);

    stores.snapshots.put(&market).await?;
    stores.snapshots.put(&positions).await?;
    for scenario in &scenarios {
        stores.scenarios.put_scenario(scenario).await?;
    }

    let run = orchestrator
        .create_run(RunRequest {
            market_snapshot: SnapshotRef::Latest,
            position_snapshot: SnapshotRef::Latest,
            scenario_ids,
            measures,
        })
        .await?;
    info!(run_id = %run.run_id, "Run submitted");

    let (stop, shutdown) = watch::channel(false);
    let worker_config = WorkerConfig {
        poll_interval_ms: 10,
        ..Default::default()
    };
    let handles: Vec<_> = (0..workers.max(1))
        .map(|i| {
            let worker = Worker::new(
                OwnerId::new(format!("cli-worker-{i}")),
                orchestrator.clone(),
                registry.clone(),
                worker_config.clone(),
            );
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await })
        })
        .collect();

    let summary = loop {
        let summary = orchestrator.run_status(&run.run_id).await?;
        if summary.run.state.is_terminal() {
            break summary;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    };
    stop.send(true).ok();
    for handle in handles {
        handle.await.ok();
    }

    let results = stores
        .results
        .results_for_run(&run.run_id, &ResultFilter::default(), 0, u64::MAX)
        .await?;
    Ok((summary, results))
}

/// Print a result table to stdout.
pub(crate) fn print_results(summary: &RunStatusSummary, results: &[ValuationResultRecord]) {
    println!();
    println!(
        "Run {} finished as {} ({} succeeded, {} dead, {} result rows)",
        summary.run.run_id,
        summary.run.state,
        summary.tasks.succeeded,
        summary.tasks.dead,
        results.len()
    );
    println!();
    println!("{:<16} {:<16} {:<12} {:>18}", "Position", "Scenario", "Measure", "Value");
    println!("{}", "-".repeat(64));
    for row in results {
        for (measure, value) in &row.measures {
            println!(
                "{:<16} {:<16} {:<12} {:>18.4}",
                row.position_id, row.scenario_id, measure, value
            );
        }
    }
    println!();
}
