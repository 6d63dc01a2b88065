//! Snapshot payloads: immutable market and position datasets.
//!
//! A snapshot is the unit of content addressing: once stored its payload
//! never changes, and its identity is the SHA-256 hash of the canonical
//! serialised form (computed by the store layer). This module defines only
//! the payload shapes; persistence lives in `valrun_store`.

use crate::market::MarketView;
use crate::types::{InstrumentType, PositionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Immutable market dataset: one [`MarketView`] as of a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// The market state captured by this snapshot.
    pub view: MarketView,
}

/// Opaque instrument definition carried on a position.
///
/// The core never interprets instrument economics; pricers extract the
/// fields they need and fail with a typed error when one is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentDefinition(pub serde_json::Value);

impl InstrumentDefinition {
    /// Build a definition from a JSON value.
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Numeric field accessor; `None` when absent or non-numeric.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(|v| v.as_f64())
    }

    /// String field accessor; `None` when absent or non-string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }
}

/// One holding in a position snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Stable identifier of the position.
    pub position_id: PositionId,
    /// Instrument type key used to resolve a pricer.
    pub instrument_type: InstrumentType,
    /// Signed quantity held.
    pub quantity: f64,
    /// Instrument economics, opaque to the core.
    pub instrument: InstrumentDefinition,
}

/// Immutable position dataset: the holdings a run prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// All positions in the book, in snapshot order.
    pub positions: Vec<Position>,
}

impl PositionSnapshot {
    /// Distinct instrument types present in the snapshot, ordered.
    pub fn instrument_types(&self) -> BTreeSet<InstrumentType> {
        self.positions
            .iter()
            .map(|p| p.instrument_type.clone())
            .collect()
    }
}

/// A storable snapshot payload, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnapshotPayload {
    /// Market data snapshot.
    Market(MarketSnapshot),
    /// Position set snapshot.
    Positions(PositionSnapshot),
}

/// Kind discriminant for [`SnapshotPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Market data snapshot.
    Market,
    /// Position set snapshot.
    Positions,
}

impl SnapshotPayload {
    /// The kind of this payload.
    pub fn kind(&self) -> SnapshotKind {
        match self {
            SnapshotPayload::Market(_) => SnapshotKind::Market,
            SnapshotPayload::Positions(_) => SnapshotKind::Positions,
        }
    }

    /// Borrow the market snapshot, if this payload is one.
    pub fn as_market(&self) -> Option<&MarketSnapshot> {
        match self {
            SnapshotPayload::Market(m) => Some(m),
            SnapshotPayload::Positions(_) => None,
        }
    }

    /// Borrow the position snapshot, if this payload is one.
    pub fn as_positions(&self) -> Option<&PositionSnapshot> {
        match self {
            SnapshotPayload::Market(_) => None,
            SnapshotPayload::Positions(p) => Some(p),
        }
    }
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotKind::Market => f.write_str("market"),
            SnapshotKind::Positions => f.write_str("positions"),
        }
    }
}
