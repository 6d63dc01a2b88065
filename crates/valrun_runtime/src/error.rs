//! Error types for the runtime layer.
//!
//! The taxonomy mirrors how failures propagate: validation failures are
//! rejected synchronously with nothing persisted; store failures bubble up
//! typed; claim conflicts and lost leases never appear here at all because
//! the store reports them as ordinary dispositions, not errors.

use thiserror::Error;
use valrun_core::snapshot::SnapshotKind;
use valrun_core::types::{ScenarioId, SnapshotId};
use valrun_store::{RunState, StoreError};

/// Run-creation input rejected before any state is created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A requested scenario id is not in the catalog.
    #[error("unknown scenario id: {0}")]
    UnknownScenario(ScenarioId),

    /// A referenced snapshot does not exist.
    #[error("unknown snapshot: {0}")]
    UnknownSnapshot(SnapshotId),

    /// A `latest` reference was used but nothing has been ingested.
    #[error("no {0} snapshot has been ingested yet")]
    NoLatestSnapshot(SnapshotKind),

    /// A referenced snapshot exists but is of the wrong kind.
    #[error("snapshot {id} is a {actual} snapshot, expected {expected}")]
    WrongSnapshotKind {
        /// The referenced snapshot.
        id: SnapshotId,
        /// Kind found in the store.
        actual: SnapshotKind,
        /// Kind the request required.
        expected: SnapshotKind,
    },

    /// The requested measure set is empty.
    #[error("measure set must not be empty")]
    EmptyMeasures,

    /// The run is not in a state that admits the requested operation.
    #[error("run is {state}, operation requires {required}")]
    InvalidRunState {
        /// Current run state.
        state: RunState,
        /// State the operation requires.
        required: RunState,
    },
}

/// Top-level runtime failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Bad input, rejected all-or-nothing.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Durable store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
