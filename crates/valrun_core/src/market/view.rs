//! Market view: named zero curves plus FX spots.
//!
//! A [`MarketView`] is the read-only market state handed to pricers. Views
//! are derived from an immutable market snapshot and, for non-BASE
//! scenarios, from the scenario engine's deep copy; pricers never observe a
//! view that another computation can mutate.

use super::MarketDataError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One node of a zero curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveNode {
    /// Tenor of the node in year fractions.
    pub tenor_years: f64,
    /// Continuously compounded zero rate at the node.
    pub rate: f64,
}

/// A zero curve with tag metadata.
///
/// Tags classify curves for scenario targeting (e.g. `"spread"` curves are
/// widened by a credit scenario while discount curves are left alone).
///
/// # Example
///
/// ```
/// use valrun_core::market::Curve;
///
/// let curve = Curve::flat(0.03, &[0.25, 1.0, 5.0]);
/// let df = curve.discount_factor(1.0).unwrap();
/// assert!((df - (-0.03f64).exp()).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    /// Classification tags (ordered for deterministic serialisation).
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Curve nodes in ascending tenor order.
    pub nodes: Vec<CurveNode>,
}

impl Curve {
    /// Build a flat curve at `rate` over the given tenors.
    pub fn flat(rate: f64, tenors: &[f64]) -> Self {
        Self {
            tags: BTreeSet::new(),
            nodes: tenors
                .iter()
                .map(|&tenor_years| CurveNode { tenor_years, rate })
                .collect(),
        }
    }

    /// Attach a classification tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Whether the curve carries the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Zero rate at tenor `t`, linearly interpolated between nodes and
    /// extrapolated flat beyond the first/last node.
    ///
    /// # Errors
    ///
    /// [`MarketDataError::EmptyCurve`] if the curve has no nodes. The curve
    /// name is not known here, so the message carries a placeholder; callers
    /// that know the name should prefer
    /// [`MarketView::zero_rate`].
    pub fn zero_rate(&self, t: f64) -> Result<f64, MarketDataError> {
        let first = self
            .nodes
            .first()
            .ok_or_else(|| MarketDataError::EmptyCurve("<unnamed>".to_string()))?;
        if t <= first.tenor_years {
            return Ok(first.rate);
        }
        let last = self.nodes.last().expect("non-empty checked above");
        if t >= last.tenor_years {
            return Ok(last.rate);
        }
        for pair in self.nodes.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if t >= lo.tenor_years && t <= hi.tenor_years {
                let w = (t - lo.tenor_years) / (hi.tenor_years - lo.tenor_years);
                return Ok(lo.rate + w * (hi.rate - lo.rate));
            }
        }
        // Unreachable: t is inside [first, last] and nodes are ordered.
        Ok(last.rate)
    }

    /// Discount factor `exp(-r(t) * t)` at tenor `t`.
    pub fn discount_factor(&self, t: f64) -> Result<f64, MarketDataError> {
        Ok((-self.zero_rate(t)? * t).exp())
    }
}

/// Read-only market state: named curves and FX spots as of a date.
///
/// All containers are ordered so that serialisation is canonical and
/// scenario application is reproducible byte-for-byte.
///
/// # Example
///
/// ```
/// use valrun_core::market::{Curve, MarketView};
/// use chrono::NaiveDate;
///
/// let mut view = MarketView::new(NaiveDate::from_ymd_opt(2026, 8, 28).unwrap());
/// view.insert_curve("USD.OIS", Curve::flat(0.03, &[1.0, 5.0]));
/// view.insert_fx_spot("EURUSD", 1.10);
///
/// assert!(view.curve("USD.OIS").is_ok());
/// assert!(view.fx_spot("GBPUSD").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketView {
    /// Valuation date of the market state.
    pub as_of: chrono::NaiveDate,
    /// Named zero curves.
    #[serde(default)]
    pub curves: BTreeMap<String, Curve>,
    /// FX spot rates keyed by concatenated pair (e.g. `"EURUSD"`).
    #[serde(default)]
    pub fx_spots: BTreeMap<String, f64>,
}

impl MarketView {
    /// Create an empty view as of the given date.
    pub fn new(as_of: chrono::NaiveDate) -> Self {
        Self {
            as_of,
            curves: BTreeMap::new(),
            fx_spots: BTreeMap::new(),
        }
    }

    /// Insert (or replace) a named curve.
    pub fn insert_curve(&mut self, name: impl Into<String>, curve: Curve) {
        self.curves.insert(name.into(), curve);
    }

    /// Insert (or replace) an FX spot.
    pub fn insert_fx_spot(&mut self, pair: impl Into<String>, spot: f64) {
        self.fx_spots.insert(pair.into(), spot);
    }

    /// Look up a curve by name.
    pub fn curve(&self, name: &str) -> Result<&Curve, MarketDataError> {
        self.curves
            .get(name)
            .ok_or_else(|| MarketDataError::UnknownCurve(name.to_string()))
    }

    /// Zero rate of a named curve at tenor `t`.
    pub fn zero_rate(&self, name: &str, t: f64) -> Result<f64, MarketDataError> {
        self.curve(name)?
            .zero_rate(t)
            .map_err(|_| MarketDataError::EmptyCurve(name.to_string()))
    }

    /// Discount factor of a named curve at tenor `t`.
    pub fn discount_factor(&self, name: &str, t: f64) -> Result<f64, MarketDataError> {
        self.curve(name)?
            .discount_factor(t)
            .map_err(|_| MarketDataError::EmptyCurve(name.to_string()))
    }

    /// Look up an FX spot by pair.
    pub fn fx_spot(&self, pair: &str) -> Result<f64, MarketDataError> {
        self.fx_spots
            .get(pair)
            .copied()
            .ok_or_else(|| MarketDataError::UnknownFxPair(pair.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn as_of() -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(2026, 8, 28).unwrap()
    }

    #[test]
    fn test_flat_curve_rate_and_df() {
        let curve = Curve::flat(0.05, &[0.5, 1.0, 2.0]);
        assert_relative_eq!(curve.zero_rate(1.5).unwrap(), 0.05);
        assert_relative_eq!(
            curve.discount_factor(2.0).unwrap(),
            (-0.05f64 * 2.0).exp(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_linear_interpolation_between_nodes() {
        let curve = Curve {
            tags: BTreeSet::new(),
            nodes: vec![
                CurveNode {
                    tenor_years: 1.0,
                    rate: 0.02,
                },
                CurveNode {
                    tenor_years: 3.0,
                    rate: 0.04,
                },
            ],
        };
        assert_relative_eq!(curve.zero_rate(2.0).unwrap(), 0.03, epsilon = 1e-12);
    }

    #[test]
    fn test_flat_extrapolation_outside_nodes() {
        let curve = Curve::flat(0.03, &[1.0, 2.0]);
        assert_relative_eq!(curve.zero_rate(0.1).unwrap(), 0.03);
        assert_relative_eq!(curve.zero_rate(10.0).unwrap(), 0.03);
    }

    #[test]
    fn test_empty_curve_errors() {
        let curve = Curve {
            tags: BTreeSet::new(),
            nodes: vec![],
        };
        assert!(matches!(
            curve.zero_rate(1.0),
            Err(MarketDataError::EmptyCurve(_))
        ));
    }

    #[test]
    fn test_view_lookup_errors_name_the_key() {
        let view = MarketView::new(as_of());
        assert_eq!(
            view.curve("USD.OIS").unwrap_err(),
            MarketDataError::UnknownCurve("USD.OIS".to_string())
        );
        assert_eq!(
            view.fx_spot("EURUSD").unwrap_err(),
            MarketDataError::UnknownFxPair("EURUSD".to_string())
        );
    }

    #[test]
    fn test_curve_tags() {
        let curve = Curve::flat(0.01, &[1.0]).with_tag("spread");
        assert!(curve.has_tag("spread"));
        assert!(!curve.has_tag("discount"));
    }

    #[test]
    fn test_view_serialisation_is_canonical() {
        let mut a = MarketView::new(as_of());
        a.insert_curve("USD.OIS", Curve::flat(0.03, &[1.0]));
        a.insert_curve("EUR.OIS", Curve::flat(0.02, &[1.0]));

        let mut b = MarketView::new(as_of());
        b.insert_curve("EUR.OIS", Curve::flat(0.02, &[1.0]));
        b.insert_curve("USD.OIS", Curve::flat(0.03, &[1.0]));

        // Insertion order must not matter for the serialised form.
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
