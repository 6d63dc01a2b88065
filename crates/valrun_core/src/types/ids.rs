//! Strongly typed identifiers.
//!
//! Every entity in the engine is keyed by its own newtype so that a task id
//! can never be passed where a run id is expected. String-backed ids
//! (`SnapshotId`, `ScenarioId`, `PositionId`, `InstrumentType`, `OwnerId`)
//! serialise transparently; uuid-backed ids (`RunId`, `TaskId`) are minted
//! as v4 uuids.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw string value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Mint a fresh random (v4) identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Borrow the underlying uuid.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Content-addressed snapshot identifier (`sha256:<hex>`).
    SnapshotId
}

string_id! {
    /// Named scenario identifier (e.g. `BASE`, `RATES_UP_1BP`).
    ScenarioId
}

string_id! {
    /// Position identifier as supplied by the position snapshot.
    PositionId
}

string_id! {
    /// Instrument type key used to resolve a pricer capability.
    InstrumentType
}

string_id! {
    /// Worker identity used for task lease ownership.
    OwnerId
}

uuid_id! {
    /// Identifier of one end-to-end analytics run.
    RunId
}

uuid_id! {
    /// Identifier of one claimable unit of work.
    TaskId
}

impl ScenarioId {
    /// The identity scenario: no perturbation applied.
    pub fn base() -> Self {
        Self::new("BASE")
    }

    /// Whether this is the identity scenario.
    pub fn is_base(&self) -> bool {
        self.as_str() == "BASE"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_id_roundtrip() {
        let id = ScenarioId::new("RATES_UP_1BP");
        assert_eq!(id.as_str(), "RATES_UP_1BP");
        assert_eq!(format!("{}", id), "RATES_UP_1BP");

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"RATES_UP_1BP\"");
        let back: ScenarioId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_base_scenario_id() {
        assert!(ScenarioId::base().is_base());
        assert!(!ScenarioId::new("RATES_UP_1BP").is_base());
    }

    #[test]
    fn test_uuid_ids_are_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_uuid_id_serde_transparent() {
        let id = TaskId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_ids_are_ordered() {
        let mut types = vec![
            InstrumentType::new("fx_forward"),
            InstrumentType::new("discount_bond"),
        ];
        types.sort();
        assert_eq!(types[0].as_str(), "discount_bond");
    }
}
