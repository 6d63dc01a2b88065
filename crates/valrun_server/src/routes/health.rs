//! Health check and monitoring endpoints
//!
//! Provides health and readiness endpoints for load balancer integration
//! and service availability monitoring.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;

use super::AppState;
use crate::error::ApiError;

/// Health check response
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status ("healthy" or "unhealthy")
    pub status: String,
    /// Server version
    pub version: String,
    /// Server uptime in seconds
    pub uptime_secs: u64,
    /// Registered instrument types
    pub instrument_types: Vec<String>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    /// Ready status
    pub ready: bool,
}

/// Build the health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
}

/// GET /health - Health check endpoint
///
/// Returns the server health status, version, uptime, and the registered
/// pricer capabilities.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    let mut instrument_types: Vec<String> = state
        .registry
        .instrument_types()
        .into_iter()
        .map(|t| t.as_str().to_string())
        .collect();
    instrument_types.sort_unstable();

    let response = HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
        uptime_secs: uptime,
        instrument_types,
    };

    (StatusCode::OK, Json(response))
}

/// GET /ready - Readiness probe endpoint
///
/// Ready means the store answers: a snapshot lookup round-trips. A dead
/// Postgres behind the server flips readiness off while health stays up.
async fn ready_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let probe = valrun_core::types::SnapshotId::new("sha256:readiness-probe");
    state
        .orchestrator
        .stores()
        .snapshots
        .contains(&probe)
        .await?;
    Ok((StatusCode::OK, Json(ReadyResponse { ready: true })))
}
