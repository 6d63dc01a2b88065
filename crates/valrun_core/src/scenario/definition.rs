//! Declarative scenario definitions.
//!
//! A scenario is a named list of perturbation rules. Each rule pairs a
//! target selector (which curves or FX spots to touch) with a shift
//! (absolute offset or relative multiplier). Scenarios are immutable once
//! referenced by a run; the catalog in the store layer enforces that.

use crate::types::ScenarioId;
use serde::{Deserialize, Serialize};

/// Which part of the market view a rule perturbs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum TargetSelector {
    /// Every node of every curve.
    AllCurves,
    /// Every node of curves carrying the given tag.
    CurvesTagged {
        /// Tag that selected curves must carry (e.g. `"spread"`).
        tag: String,
    },
    /// Every node of one named curve; selects nothing if the name is absent.
    Curve {
        /// Curve name (e.g. `"USD.OIS"`).
        name: String,
    },
    /// Every FX spot in the view.
    AllFxSpots,
    /// One FX spot; selects nothing if the pair is absent.
    FxSpot {
        /// Concatenated currency pair (e.g. `"EURUSD"`).
        pair: String,
    },
}

/// How a selected value is shifted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shift", rename_all = "snake_case")]
pub enum Shift {
    /// Add a fixed offset in rate (or spot) terms, e.g. `0.0001` for +1bp.
    Absolute {
        /// Offset added to each selected value.
        offset: f64,
    },
    /// Multiply by `(1 + pct)`, e.g. `0.01` for +1%.
    Relative {
        /// Fractional change applied multiplicatively.
        pct: f64,
    },
}

/// One perturbation rule: a target and a shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerturbationRule {
    /// What the rule touches.
    #[serde(flatten)]
    pub target: TargetSelector,
    /// How the touched values move.
    #[serde(flatten)]
    pub shift: Shift,
}

/// A named, declarative market perturbation.
///
/// # Example
///
/// ```
/// use valrun_core::scenario::{PerturbationRule, Scenario, Shift, TargetSelector};
///
/// let rates_up = Scenario::new(
///     "RATES_UP_1BP",
///     vec![PerturbationRule {
///         target: TargetSelector::AllCurves,
///         shift: Shift::Absolute { offset: 0.0001 },
///     }],
/// );
/// assert_eq!(rates_up.scenario_id.as_str(), "RATES_UP_1BP");
/// assert!(Scenario::base().rules.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// The scenario's stable identifier.
    pub scenario_id: ScenarioId,
    /// Rules applied in declaration order.
    pub rules: Vec<PerturbationRule>,
}

impl Scenario {
    /// Create a scenario from an id and rule list.
    pub fn new(id: impl Into<ScenarioId>, rules: Vec<PerturbationRule>) -> Self {
        Self {
            scenario_id: id.into(),
            rules,
        }
    }

    /// The identity scenario (`BASE`): no rules, view passes through.
    pub fn base() -> Self {
        Self {
            scenario_id: ScenarioId::base(),
            rules: Vec::new(),
        }
    }
}
