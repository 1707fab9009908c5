//! Unlearning engine
//!
//! Removes one sample's influence from the trained model by content
//! address: resolve the sample, subtract its rank-1 contribution from the
//! sufficient statistics, re-solve, and only then commit, so a failed
//! update leaves model, store, and pool exactly as they were. Cost is
//! governed by the feature width, never by how many rows were trained on;
//! falling back to a full refit is exactly what this path exists to avoid.

use crate::enclave::memory::SecurePool;
use crate::error::EnclaveError;
use crate::hash::SampleId;
use crate::storage::SampleStore;
use crate::train::RidgeModel;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

/// Outcome of one successful removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlearnReport {
    pub id: SampleId,
    pub rows_remaining: usize,
    /// Frobenius distance between the weights before and after removal.
    pub weight_delta_norm: f64,
    pub unlearned_at: DateTime<Utc>,
}

/// Remove the sample with the given content address from both the model
/// and the store.
///
/// A second call with the same identifier fails with `NotFound`: the
/// sample is gone from the index, so it cannot be unlearned twice.
pub fn remove(
    model: &mut RidgeModel,
    store: &mut SampleStore,
    pool: &mut SecurePool,
    id: SampleId,
) -> Result<UnlearnReport, EnclaveError> {
    // Resolve first: an unknown or already-removed id must fail before
    // anything is computed.
    let sample = store.lookup(id)?;

    // Build the fully-solved candidate while the live model is untouched.
    let candidate = model.without_sample(sample.features(), sample.label())?;
    let weight_delta_norm = model.weight_distance(&candidate);

    // Commit: model, then index/dataset, then pool accounting. The
    // removed buffers wipe themselves on drop.
    *model = candidate;
    let removed = store.remove(id)?;
    pool.release(removed.byte_len());

    let report = UnlearnReport {
        id,
        rows_remaining: store.len(),
        weight_delta_norm,
        unlearned_at: Utc::now(),
    };
    info!(
        "unlearned {} | {} rows remain | weight delta {:.6}",
        id, report.rows_remaining, weight_delta_norm
    );
    Ok(report)
}
