//! Stable position-to-shard assignment.
//!
//! Shard assignment must be identical across processes and releases: a
//! retried task has to see exactly the positions its first execution saw.
//! The standard library hasher is seeded per process, so the assignment
//! uses SHA-256 of the position id instead, taking the first eight digest
//! bytes as a big-endian integer modulo the shard count.

use sha2::{Digest, Sha256};
use valrun_core::types::PositionId;

/// Shard index of a position for a given shard count.
///
/// Deterministic: the same `(position_id, shard_count)` always yields the
/// same index, on every host. Re-sharding therefore happens only through an
/// explicit shard-count reconfiguration.
pub fn shard_for(position_id: &PositionId, shard_count: u32) -> u32 {
    if shard_count <= 1 {
        return 0;
    }
    let digest = Sha256::digest(position_id.as_str().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % shard_count as u64) as u32
}
