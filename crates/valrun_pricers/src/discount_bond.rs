//! Zero-coupon discount bond pricing.
//!
//! **PV** = quantity · notional · DF(maturity)
//!
//! where DF is the discount factor read off the instrument's named curve.

use valrun_core::market::MarketView;
use valrun_core::pricing::{MeasureValues, Pricer, PricerError};
use valrun_core::snapshot::{InstrumentDefinition, Position};
use valrun_core::types::{MeasureSet, ScenarioId};

/// Closed-form pricer for zero-coupon bonds.
///
/// Required instrument fields:
/// * `notional` - redemption amount per unit of quantity
/// * `maturity_years` - time to redemption in year fractions
/// * `discount_curve` - name of the curve to discount on
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscountBondPricer;

impl Pricer for DiscountBondPricer {
    fn id(&self) -> &str {
        "discount_bond"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn price(
        &self,
        position: &Position,
        instrument: &InstrumentDefinition,
        market: &MarketView,
        measures: &MeasureSet,
        _scenario_id: &ScenarioId,
    ) -> Result<MeasureValues, PricerError> {
        let notional = instrument
            .get_f64("notional")
            .ok_or_else(|| PricerError::missing_field("notional", &position.position_id))?;
        let maturity = instrument
            .get_f64("maturity_years")
            .ok_or_else(|| PricerError::missing_field("maturity_years", &position.position_id))?;
        let curve = instrument
            .get_str("discount_curve")
            .ok_or_else(|| PricerError::missing_field("discount_curve", &position.position_id))?;

        let df = market.discount_factor(curve, maturity)?;

        let mut values = MeasureValues::new();
        for measure in measures {
            match measure.as_str() {
                "PV" => {
                    values.insert(measure.clone(), position.quantity * notional * df);
                }
                other => return Err(PricerError::UnsupportedMeasure(other.to_string())),
            }
        }
        Ok(values)
    }
}
