//! Content addressing: canonical serialisation and SHA-256 identity.
//!
//! A snapshot's identity is the SHA-256 digest of its canonical JSON form.
//! Canonicalisation goes through `serde_json::Value`, whose object maps are
//! ordered, so key order in the submitted payload cannot change the hash.
//! Byte-identical payloads therefore always resolve to the same id.

use crate::StoreError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use valrun_core::snapshot::SnapshotPayload;
use valrun_core::types::SnapshotId;

/// Canonical JSON bytes of a serialisable payload (sorted object keys).
pub fn canonical_bytes<T: Serialize>(payload: &T) -> Result<Vec<u8>, StoreError> {
    let value = serde_json::to_value(payload)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Content-addressed identifier of a snapshot payload: `sha256:<hex>`.
pub fn content_id(payload: &SnapshotPayload) -> Result<SnapshotId, StoreError> {
    let bytes = canonical_bytes(payload)?;
    let digest = Sha256::digest(&bytes);
    Ok(SnapshotId::new(format!("sha256:{}", hex::encode(digest))))
}
