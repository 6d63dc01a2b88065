//! Capability table mapping instrument types to pricers.

use super::{Pricer, PricerError};
use crate::types::InstrumentType;
use std::collections::HashMap;
use std::sync::Arc;

/// Lookup table from instrument type key to pricer capability.
///
/// Populated at process start; shared read-only across workers. Adding a
/// new instrument type means registering a new implementation, not touching
/// the scheduler or worker loop.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use std::sync::Arc;
/// use valrun_core::pricing::{MeasureValues, Pricer, PricerError, PricerRegistry};
/// use valrun_core::market::MarketView;
/// use valrun_core::snapshot::{InstrumentDefinition, Position};
/// use valrun_core::types::{InstrumentType, MeasureSet, ScenarioId};
///
/// struct Zero;
/// impl Pricer for Zero {
///     fn id(&self) -> &str { "zero" }
///     fn version(&self) -> &str { "1.0" }
///     fn price(
///         &self,
///         _: &Position,
///         _: &InstrumentDefinition,
///         _: &MarketView,
///         measures: &MeasureSet,
///         _: &ScenarioId,
///     ) -> Result<MeasureValues, PricerError> {
///         Ok(measures.iter().map(|m| (m.clone(), 0.0)).collect())
///     }
/// }
///
/// let mut registry = PricerRegistry::new();
/// registry.register(InstrumentType::new("zero_bond"), Arc::new(Zero));
/// assert!(registry.resolve(&InstrumentType::new("zero_bond")).is_ok());
/// assert!(registry.resolve(&InstrumentType::new("swaption")).is_err());
/// ```
#[derive(Default, Clone)]
pub struct PricerRegistry {
    table: HashMap<InstrumentType, Arc<dyn Pricer>>,
}

impl PricerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Add or replace the capability for an instrument type.
    pub fn register(&mut self, instrument_type: InstrumentType, pricer: Arc<dyn Pricer>) {
        self.table.insert(instrument_type, pricer);
    }

    /// Resolve the pricer for an instrument type.
    ///
    /// # Errors
    ///
    /// [`PricerError::UnknownInstrumentType`] if no pricer is registered.
    pub fn resolve(&self, instrument_type: &InstrumentType) -> Result<Arc<dyn Pricer>, PricerError> {
        self.table
            .get(instrument_type)
            .cloned()
            .ok_or_else(|| PricerError::UnknownInstrumentType(instrument_type.clone()))
    }

    /// Registered instrument types, in arbitrary order.
    pub fn instrument_types(&self) -> Vec<InstrumentType> {
        self.table.keys().cloned().collect()
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl std::fmt::Debug for PricerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.table.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("PricerRegistry")
            .field("instrument_types", &types)
            .finish()
    }
}
