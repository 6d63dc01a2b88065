//! Market data view consumed by pricers.
//!
//! This module provides:
//! - [`MarketView`]: Container of named curves and FX spots
//! - [`Curve`] / [`CurveNode`]: Zero curve with tag metadata
//! - [`MarketDataError`]: Typed lookup failures

mod error;
mod view;

pub use error::MarketDataError;
pub use view::{Curve, CurveNode, MarketView};
