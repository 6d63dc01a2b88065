//! FX forward pricing off a spot and a discount curve.
//!
//! **PV** = quantity · notional · (S − K) · DF(maturity)
//!
//! A deliberately simple mark: the payoff `(S − K)` at today's spot,
//! discounted to settlement. Interest-rate parity adjustments to the
//! forward itself are out of scope for the reference capability.

use valrun_core::market::MarketView;
use valrun_core::pricing::{MeasureValues, Pricer, PricerError};
use valrun_core::snapshot::{InstrumentDefinition, Position};
use valrun_core::types::{MeasureSet, ScenarioId};

/// Closed-form pricer for FX forwards.
///
/// Required instrument fields:
/// * `pair` - concatenated currency pair, e.g. `"EURUSD"`
/// * `strike` - agreed forward rate
/// * `notional` - base-currency notional per unit of quantity
/// * `maturity_years` - time to settlement in year fractions
/// * `discount_curve` - name of the curve to discount on
#[derive(Debug, Clone, Copy, Default)]
pub struct FxForwardPricer;

impl Pricer for FxForwardPricer {
    fn id(&self) -> &str {
        "fx_forward"
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
        let pair = instrument
            .get_str("pair")
            .ok_or_else(|| PricerError::missing_field("pair", &position.position_id))?;
        let strike = instrument
            .get_f64("strike")
            .ok_or_else(|| PricerError::missing_field("strike", &position.position_id))?;
        let notional = instrument
            .get_f64("notional")
            .ok_or_else(|| PricerError::missing_field("notional", &position.position_id))?;
        let maturity = instrument
            .get_f64("maturity_years")
            .ok_or_else(|| PricerError::missing_field("maturity_years", &position.position_id))?;
        let curve = instrument
            .get_str("discount_curve")
            .ok_or_else(|| PricerError::missing_field("discount_curve", &position.position_id))?;

        let spot = market.fx_spot(pair)?;
        let df = market.discount_factor(curve, maturity)?;

        let mut values = MeasureValues::new();
        for measure in measures {
            match measure.as_str() {
                "PV" => {
                    values.insert(
                        measure.clone(),
                        position.quantity * notional * (spot - strike) * df,
                    );
                }
                other => return Err(PricerError::UnsupportedMeasure(other.to_string())),
            }
        }
        Ok(values)
    }
}
