//! # valrun_runtime: Scheduling and Orchestration
//!
//! ## Runtime Layer Role
//!
//! This crate turns a run request into claimable tasks and drives them to
//! completion:
//! - [`scheduler`]: fanout partitioning and the claim/renew/complete
//!   protocol over the shared task table
//! - [`shard`]: stable position-to-shard assignment
//! - [`worker`]: the claim → process → complete loop
//! - [`orchestrator`]: run validation, snapshot pinning and the run-level
//!   state machine
//!
//! Workers never talk to each other; the task table (behind
//! `valrun_store::TaskStore`) is the only coordination point, and the lease
//! timeout is the only liveness mechanism. A crashed worker's task becomes
//! claimable again when its lease expires; idempotent result writes make
//! the occasional double execution harmless.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod scheduler;
pub mod shard;
pub mod worker;

pub use config::{RunFailurePolicy, SchedulerConfig, WorkerConfig};
pub use error::{EngineError, ValidationError};
pub use orchestrator::{Orchestrator, RunRequest, RunStatusSummary, SnapshotRef};
pub use scheduler::TaskScheduler;
pub use worker::Worker;
