//! Route modules for the valuation server
//!
//! This module contains endpoint group-specific routers:
//! - snapshots: immutable market/position snapshot ingestion and retrieval
//! - scenarios: the named scenario catalog
//! - runs: run submission, status, results and publication
//! - health: health check and monitoring endpoints

pub mod health;
pub mod runs;
pub mod scenarios;
pub mod snapshots;

use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use valrun_core::pricing::PricerRegistry;
use valrun_runtime::Orchestrator;

use crate::config::ServerConfig;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Run orchestrator (validation, lifecycle, store access)
    pub orchestrator: Arc<Orchestrator>,
    /// Registered pricer capabilities
    pub registry: Arc<PricerRegistry>,
    /// Server start time for uptime calculation
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create a new AppState
    pub fn new(
        config: Arc<ServerConfig>,
        orchestrator: Arc<Orchestrator>,
        registry: Arc<PricerRegistry>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            registry,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Build the main application router by merging all route modules
pub fn build_router(
    config: Arc<ServerConfig>,
    orchestrator: Arc<Orchestrator>,
    registry: Arc<PricerRegistry>,
) -> Router {
    let state = AppState::new(config, orchestrator, registry);

    Router::new()
        .merge(health::routes())
        .merge(snapshots::routes())
        .merge(scenarios::routes())
        .merge(runs::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
