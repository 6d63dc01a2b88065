//! Demo command: a synthetic end-to-end run.
//!
//! Builds a small book of discount bonds and FX forwards, a two-curve
//! market with one FX spot, and a rates-up scenario, then executes a full
//! run over the in-memory engine and prints the result table.

use serde_json::json;
use valrun_core::market::{Curve, MarketView};
use valrun_core::scenario::{PerturbationRule, Scenario, Shift, TargetSelector};
use valrun_core::snapshot::{
    InstrumentDefinition, MarketSnapshot, Position, PositionSnapshot, SnapshotPayload,
};
use valrun_core::types::{measure_set, InstrumentType, PositionId, ScenarioId};

use super::run::{execute, print_results};
use crate::Result;

/// Run the demo command
pub async fn run(position_count: usize) -> Result<()> {
    println!("========================================");
    println!("Valuation Run Demo");
    println!("========================================");
    println!();
    println!("[Demo] Synthetic book: {} positions", position_count);
    println!("[Demo] Scenarios: BASE, RATES_UP_1BP");
    println!();

    let (summary, results) = execute(
        market(),
        positions(position_count),
        vec![rates_up()],
        vec![ScenarioId::base(), ScenarioId::new("RATES_UP_1BP")],
        measure_set(["PV"]),
        4,
    )
    .await?;

    print_results(&summary, &results);
    Ok(())
}

fn market() -> SnapshotPayload {
    let mut view = MarketView::new(chrono::Utc::now().date_naive());
    view.insert_curve("USD.OIS", Curve::flat(0.045, &[0.25, 1.0, 5.0, 10.0]));
    view.insert_curve("EUR.OIS", Curve::flat(0.032, &[0.25, 1.0, 5.0, 10.0]));
    view.insert_fx_spot("EURUSD", 1.10);
    SnapshotPayload::Market(MarketSnapshot { view })
}

fn positions(count: usize) -> SnapshotPayload {
    let positions = (0..count)
        .map(|i| {
            if i % 2 == 0 {
                Position {
                    position_id: PositionId::new(format!("BOND-{i:03}")),
                    instrument_type: InstrumentType::new("discount_bond"),
                    quantity: 1.0 + i as f64,
                    instrument: InstrumentDefinition::new(json!({
                        "notional": 1_000_000.0,
                        "maturity_years": 1.0 + (i % 5) as f64,
                        "discount_curve": "USD.OIS",
                    })),
                }
            } else {
                Position {
                    position_id: PositionId::new(format!("FXF-{i:03}")),
                    instrument_type: InstrumentType::new("fx_forward"),
                    quantity: 1.0,
                    instrument: InstrumentDefinition::new(json!({
                        "pair": "EURUSD",
                        "strike": 1.05,
                        "notional": 2_000_000.0,
                        "maturity_years": 1.0,
                        "discount_curve": "USD.OIS",
                    })),
                }
            }
        })
        .collect();
    SnapshotPayload::Positions(PositionSnapshot { positions })
}

fn rates_up() -> Scenario {
    Scenario::new(
        "RATES_UP_1BP",
        vec![PerturbationRule {
            target: TargetSelector::AllCurves,
            shift: Shift::Absolute { offset: 0.0001 },
        }],
    )
}
