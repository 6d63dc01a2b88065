//! The perturbation engine: a pure function over market views.
//!
//! [`apply`] never mutates its input. It clones the base view (all
//! containers are owned, so a clone is a structurally independent deep
//! copy) and applies the scenario's rules in declaration order. Two calls
//! with identical inputs produce identical output, byte-for-byte under
//! canonical serialisation.

use super::{PerturbationRule, Scenario, Shift, TargetSelector};
use crate::market::MarketView;

/// Derive a perturbed market view from a base view and a scenario.
///
/// The base view is left untouched; the returned view shares no mutable
/// state with it. A `BASE` (empty-rule) scenario returns a value equal to
/// the input.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use valrun_core::market::{Curve, MarketView};
/// use valrun_core::scenario::{apply, PerturbationRule, Scenario, Shift, TargetSelector};
///
/// let mut base = MarketView::new(NaiveDate::from_ymd_opt(2026, 8, 28).unwrap());
/// base.insert_curve("USD.OIS", Curve::flat(0.03, &[1.0]));
///
/// let scenario = Scenario::new(
///     "RATES_UP_1BP",
///     vec![PerturbationRule {
///         target: TargetSelector::AllCurves,
///         shift: Shift::Absolute { offset: 0.0001 },
///     }],
/// );
///
/// let bumped = apply(&base, &scenario);
/// assert!((bumped.curves["USD.OIS"].nodes[0].rate - 0.0301).abs() < 1e-12);
/// assert!((base.curves["USD.OIS"].nodes[0].rate - 0.03).abs() < 1e-12);
/// ```
pub fn apply(base: &MarketView, scenario: &Scenario) -> MarketView {
    let mut view = base.clone();
    for rule in &scenario.rules {
        apply_rule(&mut view, rule);
    }
    view
}

fn apply_rule(view: &mut MarketView, rule: &PerturbationRule) {
    match &rule.target {
        TargetSelector::AllCurves => {
            for curve in view.curves.values_mut() {
                for node in &mut curve.nodes {
                    shift(&mut node.rate, &rule.shift);
                }
            }
        }
        TargetSelector::CurvesTagged { tag } => {
            for curve in view.curves.values_mut() {
                if curve.has_tag(tag) {
                    for node in &mut curve.nodes {
                        shift(&mut node.rate, &rule.shift);
                    }
                }
            }
        }
        TargetSelector::Curve { name } => {
            if let Some(curve) = view.curves.get_mut(name) {
                for node in &mut curve.nodes {
                    shift(&mut node.rate, &rule.shift);
                }
            }
        }
        TargetSelector::AllFxSpots => {
            for spot in view.fx_spots.values_mut() {
                shift(spot, &rule.shift);
            }
        }
        TargetSelector::FxSpot { pair } => {
            if let Some(spot) = view.fx_spots.get_mut(pair) {
                shift(spot, &rule.shift);
            }
        }
    }
}

fn shift(value: &mut f64, shift: &Shift) {
    match shift {
        Shift::Absolute { offset } => *value += offset,
        Shift::Relative { pct } => *value *= 1.0 + pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Curve;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn base_view() -> MarketView {
        let mut view = MarketView::new(chrono::NaiveDate::from_ymd_opt(2026, 8, 28).unwrap());
        view.insert_curve("USD.OIS", Curve::flat(0.030, &[0.25, 1.0, 5.0]));
        view.insert_curve("EUR.OIS", Curve::flat(0.020, &[0.25, 1.0, 5.0]));
        view.insert_curve(
            "ACME.CDS",
            Curve::flat(0.015, &[1.0, 5.0]).with_tag("spread"),
        );
        view.insert_fx_spot("EURUSD", 1.10);
        view.insert_fx_spot("GBPUSD", 1.27);
        view
    }

    #[test]
    fn test_base_scenario_is_identity() {
        let base = base_view();
        let out = apply(&base, &Scenario::base());
        assert_eq!(out, base);
    }

    #[test]
    fn test_all_curves_absolute_shift() {
        let base = base_view();
        let scenario = Scenario::new(
            "RATES_UP_1BP",
            vec![PerturbationRule {
                target: TargetSelector::AllCurves,
                shift: Shift::Absolute { offset: 0.0001 },
            }],
        );
        let out = apply(&base, &scenario);
        assert_relative_eq!(out.curves["USD.OIS"].nodes[0].rate, 0.0301, epsilon = 1e-12);
        assert_relative_eq!(out.curves["ACME.CDS"].nodes[0].rate, 0.0151, epsilon = 1e-12);
        // FX untouched
        assert_relative_eq!(out.fx_spots["EURUSD"], 1.10);
    }

    #[test]
    fn test_tagged_curves_only() {
        let base = base_view();
        let scenario = Scenario::new(
            "SPREADS_WIDER_25BP",
            vec![PerturbationRule {
                target: TargetSelector::CurvesTagged {
                    tag: "spread".to_string(),
                },
                shift: Shift::Absolute { offset: 0.0025 },
            }],
        );
        let out = apply(&base, &scenario);
        assert_relative_eq!(out.curves["ACME.CDS"].nodes[0].rate, 0.0175, epsilon = 1e-12);
        assert_relative_eq!(out.curves["USD.OIS"].nodes[0].rate, 0.030, epsilon = 1e-12);
    }

    #[test]
    fn test_fx_relative_shift() {
        let base = base_view();
        let scenario = Scenario::new(
            "FX_UP_1PCT",
            vec![PerturbationRule {
                target: TargetSelector::AllFxSpots,
                shift: Shift::Relative { pct: 0.01 },
            }],
        );
        let out = apply(&base, &scenario);
        assert_relative_eq!(out.fx_spots["EURUSD"], 1.10 * 1.01, epsilon = 1e-12);
        assert_relative_eq!(out.fx_spots["GBPUSD"], 1.27 * 1.01, epsilon = 1e-12);
    }

    #[test]
    fn test_named_targets_missing_from_view_select_nothing() {
        let base = base_view();
        let scenario = Scenario::new(
            "NOOP",
            vec![
                PerturbationRule {
                    target: TargetSelector::Curve {
                        name: "JPY.OIS".to_string(),
                    },
                    shift: Shift::Absolute { offset: 1.0 },
                },
                PerturbationRule {
                    target: TargetSelector::FxSpot {
                        pair: "USDJPY".to_string(),
                    },
                    shift: Shift::Relative { pct: 1.0 },
                },
            ],
        );
        assert_eq!(apply(&base, &scenario), base);
    }

    #[test]
    fn test_rules_apply_in_declaration_order() {
        let base = base_view();
        let scenario = Scenario::new(
            "COMPOUND",
            vec![
                PerturbationRule {
                    target: TargetSelector::FxSpot {
                        pair: "EURUSD".to_string(),
                    },
                    shift: Shift::Absolute { offset: 0.10 },
                },
                PerturbationRule {
                    target: TargetSelector::FxSpot {
                        pair: "EURUSD".to_string(),
                    },
                    shift: Shift::Relative { pct: 0.10 },
                },
            ],
        );
        let out = apply(&base, &scenario);
        assert_relative_eq!(out.fx_spots["EURUSD"], (1.10 + 0.10) * 1.10, epsilon = 1e-12);
    }

    fn arb_shift() -> impl Strategy<Value = Shift> {
        prop_oneof![
            (-0.01f64..0.01).prop_map(|offset| Shift::Absolute { offset }),
            (-0.5f64..0.5).prop_map(|pct| Shift::Relative { pct }),
        ]
    }

    fn arb_target() -> impl Strategy<Value = TargetSelector> {
        prop_oneof![
            Just(TargetSelector::AllCurves),
            Just(TargetSelector::AllFxSpots),
            Just(TargetSelector::CurvesTagged {
                tag: "spread".to_string()
            }),
            Just(TargetSelector::Curve {
                name: "USD.OIS".to_string()
            }),
            Just(TargetSelector::FxSpot {
                pair: "EURUSD".to_string()
            }),
        ]
    }

    fn arb_scenario() -> impl Strategy<Value = Scenario> {
        proptest::collection::vec(
            (arb_target(), arb_shift()).prop_map(|(target, shift)| PerturbationRule {
                target,
                shift,
            }),
            0..4,
        )
        .prop_map(|rules| Scenario::new("PROP", rules))
    }

    proptest! {
        #[test]
        fn prop_apply_never_mutates_input(scenario in arb_scenario()) {
            let base = base_view();
            let before = serde_json::to_vec(&base).unwrap();
            let _ = apply(&base, &scenario);
            prop_assert_eq!(serde_json::to_vec(&base).unwrap(), before);
        }

        #[test]
        fn prop_apply_is_deterministic(scenario in arb_scenario()) {
            let base = base_view();
            let first = serde_json::to_vec(&apply(&base, &scenario)).unwrap();
            let second = serde_json::to_vec(&apply(&base, &scenario)).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
