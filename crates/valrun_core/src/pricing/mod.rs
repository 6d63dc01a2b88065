//! The pricer capability contract and registry.
//!
//! This module provides:
//! - [`Pricer`]: The narrow contract every instrument collaborator satisfies
//! - [`PricerRegistry`]: A capability table from instrument type to pricer
//! - [`PricerError`]: Typed pricing failures
//!
//! The registry contains no financial logic. New instrument types are added
//! by registering a new implementation at process start; the scheduler and
//! worker loop never change.

mod error;
mod registry;

pub use error::PricerError;
pub use registry::PricerRegistry;

use crate::market::MarketView;
use crate::snapshot::{InstrumentDefinition, Position};
use crate::types::{MeasureSet, ScenarioId};
use std::collections::BTreeMap;

/// Measure name to value mapping returned by a pricer.
pub type MeasureValues = BTreeMap<String, f64>;

/// Contract implemented by every instrument-specific valuation collaborator.
///
/// Implementations must be pure functions of their inputs: no hidden state,
/// no side effects, deterministic output. Only the requested `measures` may
/// be computed, and a missing required input must surface as a typed error
/// rather than a silent wrong value.
pub trait Pricer: Send + Sync {
    /// Stable identity of the pricer, recorded as result provenance.
    fn id(&self) -> &str;

    /// Version of the pricer, recorded as result provenance.
    fn version(&self) -> &str;

    /// Value one position under one (possibly perturbed) market view.
    ///
    /// # Arguments
    ///
    /// * `position` - The holding being valued (quantity, ids)
    /// * `instrument` - The instrument economics, opaque to the core
    /// * `market` - The perturbed market view for the scenario
    /// * `measures` - The measures the caller requested
    /// * `scenario_id` - The scenario under which the view was derived
    ///
    /// # Errors
    ///
    /// [`PricerError::MissingField`] when a required instrument field is
    /// absent; [`PricerError::MarketData`] when the view lacks required
    /// data; [`PricerError::UnsupportedMeasure`] when a requested measure
    /// is not computable for the instrument.
    fn price(
        &self,
        position: &Position,
        instrument: &InstrumentDefinition,
        market: &MarketView,
        measures: &MeasureSet,
        scenario_id: &ScenarioId,
    ) -> Result<MeasureValues, PricerError>;
}
