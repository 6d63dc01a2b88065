//! # valrun_store: Durable State for the Valuation Run Engine
//!
//! ## Store Layer Role
//!
//! The store layer owns the four durable collections the engine coordinates
//! through:
//! - Snapshots (content-addressed, immutable) — [`SnapshotStore`]
//! - Scenarios (immutable once referenced) — [`ScenarioStore`]
//! - Runs and Tasks (atomic lifecycle transitions) — [`RunStore`], [`TaskStore`]
//! - Valuation results (keyed upsert) — [`ResultStore`]
//!
//! Two backends implement every trait:
//! - [`MemoryStore`]: all state behind one async mutex; used by tests, the
//!   CLI and the embedded server mode. Claim atomicity follows from the
//!   single lock.
//! - [`PgStore`]: PostgreSQL via sqlx; claim atomicity via a
//!   `FOR UPDATE SKIP LOCKED` conditional update.
//!
//! The task table is the only coordination point between workers: every
//! mutation goes through `claim_next` / `renew_lease` / `complete`, and no
//! caller may cache task state across calls.

mod content;
mod error;
mod memory;
mod postgres;
mod records;
mod traits;

pub use content::{canonical_bytes, content_id};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use records::{
    CompletionDisposition, LeaseRenewal, Provenance, ResultFilter, RunRecord, RunState,
    TaskCounts, TaskOutcome, TaskRecord, TaskStatus, ValuationResultRecord,
};
pub use traits::{ResultStore, RunStore, ScenarioStore, SnapshotStore, Stores, TaskStore};
