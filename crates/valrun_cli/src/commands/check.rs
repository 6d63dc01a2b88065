//! Check command: verify capabilities and configuration.

use valrun_core::market::{Curve, MarketView};
use valrun_core::pricing::PricerRegistry;
use valrun_core::snapshot::{InstrumentDefinition, Position};
use valrun_core::types::{measure_set, InstrumentType, PositionId, ScenarioId};

use crate::{CliError, Result};

/// Run the check command
pub fn run() -> Result<()> {
    println!("valrun {}", env!("CARGO_PKG_VERSION"));
    println!();

    let mut registry = PricerRegistry::new();
    valrun_pricers::register_builtin(&mut registry);

    let mut types: Vec<String> = registry
        .instrument_types()
        .into_iter()
        .map(|t| t.as_str().to_string())
        .collect();
    types.sort_unstable();
    println!("Registered pricer capabilities:");
    for instrument_type in &types {
        println!("  - {}", instrument_type);
    }
    println!();

    // Smoke-price one bond to prove the capability path works end to end.
    let mut view = MarketView::new(chrono::Utc::now().date_naive());
    view.insert_curve("USD.OIS", Curve::flat(0.03, &[1.0, 5.0]));
    let position = Position {
        position_id: PositionId::new("CHECK-1"),
        instrument_type: InstrumentType::new("discount_bond"),
        quantity: 1.0,
        instrument: InstrumentDefinition::new(serde_json::json!({
            "notional": 100.0,
            "maturity_years": 1.0,
            "discount_curve": "USD.OIS",
        })),
    };
    let pricer = registry
        .resolve(&position.instrument_type)
        .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
    let values = pricer
        .price(
            &position,
            &position.instrument,
            &view,
            &measure_set(["PV"]),
            &ScenarioId::base(),
        )
        .map_err(|e| CliError::InvalidArgument(e.to_string()))?;

    println!("Smoke pricing: PV of 100 notional 1y bond at 3% = {:.4}", values["PV"]);
    println!();
    println!("All checks passed");
    Ok(())
}
