//! # valrun_pricers: Reference Pricer Capabilities
//!
//! ## Pricer Layer Role
//!
//! Reference implementations of the [`valrun_core::pricing::Pricer`]
//! contract, one per instrument type:
//! - [`DiscountBondPricer`]: zero-coupon bond priced off a discount curve
//! - [`FxForwardPricer`]: FX forward priced off a spot and a discount curve
//!
//! Both are deliberately simple closed forms; they exist to exercise the
//! engine end to end, and to show what a capability implementation looks
//! like. A production pricer plugs in the same way: implement the trait,
//! register the instrument type, and the scheduler and workers need no
//! change.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod discount_bond;
mod fx_forward;

pub use discount_bond::DiscountBondPricer;
pub use fx_forward::FxForwardPricer;

use std::sync::Arc;
use valrun_core::pricing::PricerRegistry;
use valrun_core::types::InstrumentType;

/// Register every built-in pricer on a registry.
///
/// # Example
///
/// ```
/// use valrun_core::pricing::PricerRegistry;
/// use valrun_core::types::InstrumentType;
///
/// let mut registry = PricerRegistry::new();
/// valrun_pricers::register_builtin(&mut registry);
/// assert!(registry.resolve(&InstrumentType::new("discount_bond")).is_ok());
/// assert!(registry.resolve(&InstrumentType::new("fx_forward")).is_ok());
/// ```
pub fn register_builtin(registry: &mut PricerRegistry) {
    registry.register(
        InstrumentType::new("discount_bond"),
        Arc::new(DiscountBondPricer),
    );
    registry.register(InstrumentType::new("fx_forward"), Arc::new(FxForwardPricer));
}
