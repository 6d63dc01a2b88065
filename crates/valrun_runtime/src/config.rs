//! Runtime configuration: fanout, retry, lease and polling tunables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use valrun_core::types::InstrumentType;

fn default_shard_count() -> u32 {
    1
}

fn default_max_attempts() -> u32 {
    3
}

fn default_lease_seconds() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_backoff_max_ms() -> u64 {
    5_000
}

/// Fanout and retry configuration for the task scheduler.
///
/// Shard counts are part of a run's reproducibility contract: the same
/// position always lands in the same shard for a given count, so changing a
/// count is an explicit reconfiguration, never an automatic one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Shard count for instrument types without an explicit override.
    #[serde(default = "default_shard_count")]
    pub default_shard_count: u32,

    /// Per-instrument-type shard count overrides.
    #[serde(default)]
    pub shard_counts: BTreeMap<String, u32>,

    /// Failed attempts after which a task goes dead.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Lease duration granted on claim and renewal.
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_shard_count: default_shard_count(),
            shard_counts: BTreeMap::new(),
            max_attempts: default_max_attempts(),
            lease_seconds: default_lease_seconds(),
        }
    }
}

impl SchedulerConfig {
    /// Shard count for an instrument type (override or default, min 1).
    pub fn shard_count(&self, instrument_type: &InstrumentType) -> u32 {
        self.shard_counts
            .get(instrument_type.as_str())
            .copied()
            .unwrap_or(self.default_shard_count)
            .max(1)
    }

    /// Lease duration as a chrono duration.
    pub fn lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lease_seconds as i64)
    }
}

/// Worker loop tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Idle sleep between polls when no task is claimable.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound of the backoff applied on store unavailability.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Lease renewal cadence while processing; defaults to a third of the
    /// scheduler lease when absent.
    #[serde(default)]
    pub renew_interval_ms: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            renew_interval_ms: None,
        }
    }
}

impl WorkerConfig {
    /// Effective renewal cadence given the scheduler's lease.
    pub fn renew_interval(&self, scheduler: &SchedulerConfig) -> std::time::Duration {
        let ms = self
            .renew_interval_ms
            .unwrap_or((scheduler.lease_seconds * 1000 / 3).max(1));
        std::time::Duration::from_millis(ms)
    }
}

/// Run-level failure policy: what a dead task means for its run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailurePolicy {
    /// When true, any dead task fails the whole run; when false a run with
    /// surviving successes completes partially.
    #[serde(default)]
    pub fail_on_dead: bool,
}
