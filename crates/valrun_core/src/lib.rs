//! # valrun_core: Domain Foundation for the Valuation Run Engine
//!
//! ## Core Layer Role
//!
//! valrun_core is the bottom layer of the valrun workspace, providing:
//! - Identifier newtypes: `RunId`, `TaskId`, `SnapshotId`, ... (`types`)
//! - Market data view: `MarketView`, `Curve`, FX spots (`market`)
//! - Snapshot payloads: `MarketSnapshot`, `PositionSnapshot` (`snapshot`)
//! - Scenario definitions and the pure perturbation engine (`scenario`)
//! - The `Pricer` capability contract and `PricerRegistry` (`pricing`)
//!
//! ## Zero Dependency Principle
//!
//! The core layer has no dependencies on other valrun_* crates, with minimal
//! external dependencies:
//! - serde/serde_json: Payload serialisation
//! - chrono: Timestamps and market dates
//! - uuid: Run/task identifiers
//! - thiserror: Structured error types
//!
//! ## Determinism
//!
//! Every container in the market view is ordered (`BTreeMap`/`BTreeSet`) so
//! that canonical serialisation, content hashing and scenario application are
//! reproducible byte-for-byte across processes.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod market;
pub mod pricing;
pub mod scenario;
pub mod snapshot;
pub mod types;
