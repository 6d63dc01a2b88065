//! Error types for market data lookups.

use thiserror::Error;

/// Market data lookup failures.
///
/// Returned when a pricer asks the [`MarketView`](super::MarketView) for
/// data that is not present or not usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    /// No curve with the requested name exists in the view.
    #[error("unknown curve: {0}")]
    UnknownCurve(String),

    /// No FX spot for the requested currency pair exists in the view.
    #[error("unknown FX pair: {0}")]
    UnknownFxPair(String),

    /// The curve exists but carries no nodes.
    #[error("curve `{0}` has no nodes")]
    EmptyCurve(String),
}
