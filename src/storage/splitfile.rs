//! Shard assignment files
//!
//! An external partitioning utility decides which dataset rows belong to
//! which shard and, optionally, queues unlearning requests per shard. The
//! core only consumes the file: row indices select what `load_shard`
//! copies into the protected region, and queued requests are replayed
//! against the trained model by `drain_requests`. Generating these files
//! is out of scope here.

use crate::error::EnclaveError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Row assignment (and pending unlearning queue) for one shard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardSlice {
    /// Indices into the full dataset, row-major order.
    pub rows: Vec<usize>,
    /// Content addresses queued for removal, oldest first.
    #[serde(default)]
    pub requests: Vec<u64>,
}

/// The on-disk array-of-index-arrays file, JSON-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Splitfile {
    pub shards: Vec<ShardSlice>,
}

impl Splitfile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EnclaveError> {
        let json = std::fs::read_to_string(path.as_ref())
            .map_err(|e| EnclaveError::InvalidInput(format!("splitfile read: {e}")))?;
        let parsed: Splitfile = serde_json::from_str(&json)
            .map_err(|e| EnclaveError::InvalidInput(format!("splitfile parse: {e}")))?;
        Ok(parsed)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), EnclaveError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EnclaveError::InvalidInput(format!("splitfile serialize: {e}")))?;
        std::fs::write(path.as_ref(), json)
            .map_err(|e| EnclaveError::InvalidInput(format!("splitfile write: {e}")))?;
        Ok(())
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    pub fn shard(&self, index: usize) -> Result<&ShardSlice, EnclaveError> {
        self.shards.get(index).ok_or_else(|| {
            EnclaveError::InvalidInput(format!(
                "shard {} out of range, splitfile has {}",
                index,
                self.shards.len()
            ))
        })
    }

    /// Check every row index is in `[0, row_count)` and unique within its
    /// shard. A shard may legitimately be empty.
    pub fn validate(&self, row_count: usize) -> Result<(), EnclaveError> {
        for (i, shard) in self.shards.iter().enumerate() {
            let mut seen = HashSet::with_capacity(shard.rows.len());
            for &row in &shard.rows {
                if row >= row_count {
                    return Err(EnclaveError::InvalidInput(format!(
                        "shard {i} references row {row}, dataset has {row_count}"
                    )));
                }
                if !seen.insert(row) {
                    return Err(EnclaveError::InvalidInput(format!(
                        "shard {i} lists row {row} twice"
                    )));
                }
            }
        }
        Ok(())
    }
}
