//! Scenario catalog endpoints
//!
//! Scenario definitions are named and declarative. A definition may be
//! rewritten freely until a run references it; after that, only an
//! identical re-submission is accepted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, put},
    Router,
};
use valrun_core::scenario::Scenario;
use valrun_core::types::ScenarioId;

use super::AppState;
use crate::error::ApiError;

/// Build the scenario routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/scenarios/{id}", put(put_handler))
        .route("/api/v1/scenarios/{id}", get(get_handler))
}

/// PUT /api/v1/scenarios/{id} - Create or update a scenario definition
///
/// The path id is authoritative; a differing id in the body is rejected.
/// Returns 409 when the scenario is already referenced by a run and the new
/// definition differs.
async fn put_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(scenario): Json<Scenario>,
) -> Result<impl IntoResponse, ApiError> {
    if scenario.scenario_id.as_str() != id {
        return Err(ApiError::BadRequest(format!(
            "scenario id in body ({}) does not match path ({})",
            scenario.scenario_id, id
        )));
    }
    state
        .orchestrator
        .stores()
        .scenarios
        .put_scenario(&scenario)
        .await?;
    tracing::info!(scenario_id = %scenario.scenario_id, rules = scenario.rules.len(), "scenario stored");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/scenarios/{id} - Fetch a scenario definition
///
/// `BASE` always resolves, even when never stored.
async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let scenario = state
        .orchestrator
        .stores()
        .scenarios
        .get_scenario(&ScenarioId::new(id))
        .await?;
    Ok((StatusCode::OK, Json(scenario)))
}
