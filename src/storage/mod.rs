//! Secure storage manager
//!
//! Owns the protected copy of the training dataset. Rows are copied in
//! from caller buffers exactly once, indexed by their content address as
//! they are ingested, and never leave the protected region in plaintext.
//! Loads are all-or-nothing: a failed load leaves whatever was previously
//! resident untouched.

pub mod splitfile;

pub use splitfile::{ShardSlice, Splitfile};

use crate::enclave::memory::SecureVec;
use crate::error::EnclaveError;
use crate::hash::{self, SampleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// One training sample resident in the protected region.
#[derive(Debug, Clone)]
pub struct Sample {
    features: SecureVec,
    label: SecureVec,
}

impl Sample {
    pub fn features(&self) -> &[f32] {
        self.features.as_slice()
    }

    pub fn label(&self) -> &[f32] {
        self.label.as_slice()
    }

    /// Bytes this sample occupies in the pool.
    pub fn byte_len(&self) -> usize {
        self.features.byte_len() + self.label.byte_len()
    }

    fn wipe(&mut self) {
        self.features.wipe();
        self.label.wipe();
    }
}

#[derive(Debug)]
struct StoredSample {
    sample: Sample,
    /// Position in the insertion-order list, kept current across removals.
    pos: usize,
}

/// Outcome of a successful bulk load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub rows_loaded: usize,
    pub duplicates_collapsed: usize,
    pub feature_dim: usize,
    pub label_dim: usize,
    pub bytes_stored: usize,
    pub loaded_at: DateTime<Utc>,
}

/// The enclave-resident dataset plus its content-address index.
#[derive(Debug, Default)]
pub struct SampleStore {
    records: HashMap<SampleId, StoredSample>,
    order: Vec<SampleId>,
    feature_dim: usize,
    label_dim: usize,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load a dataset from flat row-major buffers, replacing any
    /// previously resident dataset on success.
    ///
    /// `features` must hold exactly `rows * cols` values; `labels` must
    /// hold a whole number of values per row (the label width is inferred
    /// from the buffer). Each row is hashed as it is ingested; rows with
    /// identical content collapse onto one index entry.
    pub fn load(
        &mut self,
        features: &[f32],
        labels: &[f32],
        rows: usize,
        cols: usize,
    ) -> Result<LoadReport, EnclaveError> {
        if rows == 0 || cols == 0 {
            return Err(EnclaveError::InvalidInput(format!(
                "load requires positive dimensions, got {rows}x{cols}"
            )));
        }
        if features.len() != rows * cols {
            return Err(EnclaveError::ShapeMismatch(format!(
                "feature buffer holds {} values, expected {} ({}x{})",
                features.len(),
                rows * cols,
                rows,
                cols
            )));
        }
        if labels.is_empty() || labels.len() % rows != 0 {
            return Err(EnclaveError::ShapeMismatch(format!(
                "label buffer holds {} values, not a multiple of {} rows",
                labels.len(),
                rows
            )));
        }
        let label_dim = labels.len() / rows;

        // Stage into fresh containers first; the live dataset is only
        // replaced once every row has been ingested and indexed.
        let mut records: HashMap<SampleId, StoredSample> = HashMap::with_capacity(rows);
        let mut order: Vec<SampleId> = Vec::with_capacity(rows);
        let mut duplicates = 0usize;

        for row in 0..rows {
            let fslice = &features[row * cols..(row + 1) * cols];
            let lslice = &labels[row * label_dim..(row + 1) * label_dim];
            let id = hash::sample_id(fslice, lslice)?;

            if records.contains_key(&id) {
                log::warn!("row {} duplicates resident sample {}, collapsing", row, id);
                duplicates += 1;
                continue;
            }
            let sample = Sample {
                features: SecureVec::copy_from(fslice),
                label: SecureVec::copy_from(lslice),
            };
            records.insert(id, StoredSample { sample, pos: order.len() });
            order.push(id);
        }

        // Commit.
        self.records = records;
        self.order = order;
        self.feature_dim = cols;
        self.label_dim = label_dim;

        let report = LoadReport {
            rows_loaded: self.order.len(),
            duplicates_collapsed: duplicates,
            feature_dim: cols,
            label_dim,
            bytes_stored: self.total_bytes(),
            loaded_at: Utc::now(),
        };
        log::info!(
            "loaded {} samples ({}x{} features, label width {}, {} duplicates collapsed)",
            report.rows_loaded,
            rows,
            cols,
            label_dim,
            duplicates
        );
        Ok(report)
    }

    /// Resolve a content address to its resident sample.
    pub fn lookup(&self, id: SampleId) -> Result<&Sample, EnclaveError> {
        self.records
            .get(&id)
            .map(|r| &r.sample)
            .ok_or(EnclaveError::NotFound(id))
    }

    /// Remove a sample from the index and dataset, returning it.
    ///
    /// O(1): the insertion-order slot is swap-removed and the moved
    /// entry's position fixed up. Does not touch the model; removing a
    /// sample's trained influence is the unlearning engine's job.
    pub fn remove(&mut self, id: SampleId) -> Result<Sample, EnclaveError> {
        let record = self.records.remove(&id).ok_or(EnclaveError::NotFound(id))?;
        self.order.swap_remove(record.pos);
        if let Some(&moved) = self.order.get(record.pos) {
            self.records
                .get_mut(&moved)
                .expect("order list and record map out of sync")
                .pos = record.pos;
        }
        Ok(record.sample)
    }

    /// Iterate resident samples in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (SampleId, &Sample)> {
        self.order.iter().map(move |id| {
            (
                *id,
                &self
                    .records
                    .get(id)
                    .expect("order list and record map out of sync")
                    .sample,
            )
        })
    }

    pub fn ids(&self) -> &[SampleId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Feature width of the resident dataset (0 before any load).
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Label width of the resident dataset (0 before any load).
    pub fn label_dim(&self) -> usize {
        self.label_dim
    }

    /// Total pool bytes held by resident samples.
    pub fn total_bytes(&self) -> usize {
        self.records.values().map(|r| r.sample.byte_len()).sum()
    }

    /// SHA-256 over the ordered content addresses. Cheap audit handle for
    /// "which dataset is this model trained on".
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for id in &self.order {
            hasher.update(id.0.to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Wipe every resident buffer and drop the dataset.
    pub fn clear(&mut self) {
        for record in self.records.values_mut() {
            record.sample.wipe();
        }
        self.records.clear();
        self.order.clear();
        self.feature_dim = 0;
        self.label_dim = 0;
    }
}
