//! Run lifecycle endpoints
//!
//! Submission validates everything up front and returns 202 with the
//! queued run; workers drive it from there. Status and results are reads;
//! publication is the one-way archival freeze of a completed run.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use valrun_core::types::{PositionId, RunId, ScenarioId};
use valrun_runtime::{RunRequest, RunStatusSummary};
use valrun_store::{ResultFilter, RunRecord, ValuationResultRecord};

use super::AppState;
use crate::error::ApiError;

fn default_limit() -> u64 {
    100
}

/// Query parameters for result pagination and filtering
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsQuery {
    /// Restrict to one position
    pub position_id: Option<String>,
    /// Restrict to one scenario
    pub scenario_id: Option<String>,
    /// Rows to skip
    #[serde(default)]
    pub offset: u64,
    /// Maximum rows to return
    #[serde(default = "default_limit")]
    pub limit: u64,
}

/// One page of result rows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsPage {
    /// Rows in deterministic (position, scenario) order
    pub results: Vec<ValuationResultRecord>,
    /// Offset this page started at
    pub offset: u64,
    /// Limit applied to this page
    pub limit: u64,
    /// Total rows for the run, before filtering
    pub total: u64,
}

/// Build the run routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/runs", post(create_handler))
        .route("/api/v1/runs/{id}", get(status_handler))
        .route("/api/v1/runs/{id}/results", get(results_handler))
        .route("/api/v1/runs/{id}/publish", post(publish_handler))
}

/// POST /api/v1/runs - Submit a run
///
/// Returns 202 with the queued run row, or 422 when the request is
/// inconsistent (unknown scenario or snapshot, empty measures). Nothing is
/// persisted on rejection.
async fn create_handler(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<(StatusCode, Json<RunRecord>), ApiError> {
    let run = state.orchestrator.create_run(request).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// GET /api/v1/runs/{id} - Run status with task and result aggregates
async fn status_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunStatusSummary>, ApiError> {
    let summary = state.orchestrator.run_status(&RunId::from(id)).await?;
    Ok(Json(summary))
}

/// GET /api/v1/runs/{id}/results - Paginated result rows
async fn results_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<ResultsPage>, ApiError> {
    let run_id = RunId::from(id);
    // Fail with 404 before returning an empty page for a run that never
    // existed.
    state.orchestrator.stores().runs.get_run(&run_id).await?;

    let filter = ResultFilter {
        position_id: query.position_id.map(PositionId::new),
        scenario_id: query.scenario_id.map(ScenarioId::new),
    };
    let results = state
        .orchestrator
        .stores()
        .results
        .results_for_run(&run_id, &filter, query.offset, query.limit)
        .await?;
    let total = state
        .orchestrator
        .stores()
        .results
        .result_count(&run_id)
        .await?;
    Ok(Json(ResultsPage {
        results,
        offset: query.offset,
        limit: query.limit,
        total,
    }))
}

/// POST /api/v1/runs/{id}/publish - Freeze a completed run
///
/// 204 on success; 422 when the run is not `COMPLETED`.
async fn publish_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.publish(&RunId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
