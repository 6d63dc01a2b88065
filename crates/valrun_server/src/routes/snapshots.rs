//! Snapshot ingestion and retrieval endpoints
//!
//! Snapshots are content-addressed and immutable: POST returns the id the
//! payload hashes to, and re-posting identical content returns the same id.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use valrun_core::snapshot::SnapshotPayload;
use valrun_core::types::SnapshotId;

use super::AppState;
use crate::error::ApiError;

/// Response to a snapshot ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCreatedResponse {
    /// Content-addressed identifier (`sha256:<hex>`)
    pub snapshot_id: SnapshotId,
}

/// Build the snapshot routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/snapshots", post(ingest_handler))
        .route("/api/v1/snapshots/{id}", get(get_handler))
}

/// POST /api/v1/snapshots - Ingest a market or position snapshot
///
/// The body is a tagged payload (`"kind": "market"` or `"positions"`).
/// Idempotent by construction.
async fn ingest_handler(
    State(state): State<AppState>,
    Json(payload): Json<SnapshotPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot_id = state.orchestrator.stores().snapshots.put(&payload).await?;
    tracing::info!(snapshot_id = %snapshot_id, kind = %payload.kind(), "snapshot ingested");
    Ok((
        StatusCode::CREATED,
        Json(SnapshotCreatedResponse { snapshot_id }),
    ))
}

/// GET /api/v1/snapshots/{id} - Fetch a snapshot payload
async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = state
        .orchestrator
        .stores()
        .snapshots
        .get(&SnapshotId::new(id))
        .await?;
    Ok((StatusCode::OK, Json(payload)))
}
