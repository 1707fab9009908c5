//! Sample content addressing
//!
//! Every training sample is identified by a 64-bit XXH64 digest over the
//! little-endian byte concatenation `features || label`. The digest is a
//! lookup key: deterministic across calls and process restarts, collision-
//! tolerant but not collision-resistant. Nothing security-critical hangs
//! off it.

use crate::error::EnclaveError;
use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Fixed hash seed. Producers and consumers must agree on it or every
/// address changes; it is part of the wire contract.
pub const HASH_SEED: u64 = 1;

/// 64-bit content address of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleId(pub u64);

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for SampleId {
    fn from(raw: u64) -> Self {
        SampleId(raw)
    }
}

/// Hash a raw byte buffer into a sample address.
///
/// Pure and deterministic; cost is linear in the buffer length. Empty
/// input has no meaningful address and fails with `InvalidInput`.
pub fn hash_bytes(bytes: &[u8]) -> Result<SampleId, EnclaveError> {
    if bytes.is_empty() {
        return Err(EnclaveError::InvalidInput("cannot address an empty buffer".into()));
    }
    Ok(SampleId(xxh64(bytes, HASH_SEED)))
}

/// Content address of a sample given as float rows.
///
/// Bytes are the f32 little-endian encoding of `features` followed by
/// `label`, the same layout the flat boundary buffers use, so hashing on
/// either side of the boundary agrees byte for byte.
pub fn sample_id(features: &[f32], label: &[f32]) -> Result<SampleId, EnclaveError> {
    if features.is_empty() {
        return Err(EnclaveError::InvalidInput("sample has no features".into()));
    }
    let mut bytes = Vec::with_capacity((features.len() + label.len()) * 4);
    for v in features {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    for v in label {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    hash_bytes(&bytes)
}
