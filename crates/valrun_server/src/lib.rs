//! REST API server for the valuation run engine
//!
//! This crate exposes the engine over HTTP: snapshot ingestion, the
//! scenario catalog, run submission and result retrieval. The server
//! process also hosts the worker pool; a deployment scales out by running
//! more instances against the same Postgres store.

pub mod config;
pub mod error;
pub mod routes;
pub mod server;

// Re-export engine dependencies for integration
pub use valrun_core;
pub use valrun_pricers;
pub use valrun_runtime;
pub use valrun_store;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
