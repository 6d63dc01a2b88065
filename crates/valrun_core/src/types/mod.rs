//! Shared identifier and measure types.
//!
//! This module provides:
//! - Strongly typed identifiers (`RunId`, `TaskId`, `SnapshotId`, ...)
//! - The `MeasureSet` alias for requested measure names

mod ids;

pub use ids::{InstrumentType, OwnerId, PositionId, RunId, ScenarioId, SnapshotId, TaskId};

use std::collections::BTreeSet;

/// Set of requested measure names (e.g. `"PV"`, `"DV01"`).
///
/// Ordered so that result rows serialise deterministically.
pub type MeasureSet = BTreeSet<String>;

/// Build a [`MeasureSet`] from anything yielding string-like items.
///
/// # Example
///
/// ```
/// use valrun_core::types::measure_set;
///
/// let measures = measure_set(["PV", "DV01"]);
/// assert!(measures.contains("PV"));
/// assert_eq!(measures.len(), 2);
/// ```
pub fn measure_set<I, S>(names: I) -> MeasureSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Into::into).collect()
}
