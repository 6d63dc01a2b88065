//! Error types for pricing operations.

use crate::market::MarketDataError;
use crate::types::{InstrumentType, PositionId};
use thiserror::Error;

/// Categorised pricing failures.
///
/// Every failure mode is typed so that a worker can record it verbatim as
/// the owning task's `last_error` and so that no pricer ever has to signal
/// failure through a sentinel value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricerError {
    /// No pricer is registered for the instrument type.
    #[error("unknown instrument type: {0}")]
    UnknownInstrumentType(InstrumentType),

    /// A required instrument field is absent or of the wrong shape.
    #[error("missing instrument field `{field}` on position {position}")]
    MissingField {
        /// Name of the absent field.
        field: String,
        /// Position whose instrument definition is incomplete.
        position: PositionId,
    },

    /// A requested measure is not computable for the instrument.
    #[error("unsupported measure `{0}`")]
    UnsupportedMeasure(String),

    /// The market view lacks data the pricer requires.
    #[error("market data error: {0}")]
    MarketData(#[from] MarketDataError),

    /// Any other pricing failure, with context.
    #[error("pricing failed: {0}")]
    Failed(String),
}

impl PricerError {
    /// Convenience constructor for [`PricerError::MissingField`].
    pub fn missing_field(field: impl Into<String>, position: &PositionId) -> Self {
        Self::MissingField {
            field: field.into(),
            position: position.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_display() {
        let err = PricerError::missing_field("notional", &PositionId::new("POS-7"));
        assert_eq!(
            format!("{}", err),
            "missing instrument field `notional` on position POS-7"
        );
    }

    #[test]
    fn test_market_data_error_converts() {
        let err: PricerError = MarketDataError::UnknownCurve("USD.OIS".to_string()).into();
        assert!(matches!(err, PricerError::MarketData(_)));
    }

    #[test]
    fn test_unknown_instrument_type_display() {
        let err = PricerError::UnknownInstrumentType(InstrumentType::new("cdo_squared"));
        assert_eq!(format!("{}", err), "unknown instrument type: cdo_squared");
    }
}
