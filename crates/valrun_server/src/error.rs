//! API error mapping
//!
//! Translates engine and store failures into HTTP responses with a stable
//! JSON error body. Validation failures map to 422 so that a client can
//! distinguish "your request is inconsistent" from a routing 404.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use valrun_runtime::{EngineError, ValidationError};
use valrun_store::StoreError;

/// JSON error body returned for every failure
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Stable machine-readable category
    pub error: String,
    /// Human-readable description
    pub message: String,
}

/// API-level error with an HTTP mapping
#[derive(Debug)]
pub enum ApiError {
    /// Request body or parameters are malformed
    BadRequest(String),
    /// Request is well-formed but inconsistent with engine state
    Validation(ValidationError),
    /// A referenced record does not exist
    NotFound(String),
    /// Request conflicts with immutable state
    Conflict(String),
    /// Backing store is unavailable
    Unavailable(String),
    /// Anything else
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn category(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "validation_failed",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::Internal(_) => "internal",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::Unavailable(msg)
            | ApiError::Internal(msg) => msg.clone(),
            ApiError::Validation(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.category().to_string(),
            message: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ApiError::NotFound(msg),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            StoreError::Unavailable(msg) => ApiError::Unavailable(msg),
            StoreError::Serialisation(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(validation) => ApiError::Validation(validation),
            EngineError::Store(store) => store.into(),
        }
    }
}
