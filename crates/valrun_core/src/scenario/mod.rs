//! Scenario definitions and the perturbation engine.
//!
//! This module provides:
//! - [`Scenario`]: A named, declarative set of perturbation rules
//! - [`PerturbationRule`], [`TargetSelector`], [`Shift`]: The rule grammar
//! - [`apply`]: The pure function deriving a perturbed market view

mod definition;
mod engine;

pub use definition::{PerturbationRule, Scenario, Shift, TargetSelector};
pub use engine::apply;
