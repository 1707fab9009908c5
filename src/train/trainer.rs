//! Training pass over the resident dataset
//!
//! One sweep in insertion order accumulating sufficient statistics, one
//! Cholesky solve. Deterministic for a given dataset and configuration:
//! there is no randomness anywhere in the fit.

use crate::error::EnclaveError;
use crate::storage::SampleStore;
use crate::train::model::RidgeModel;
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

/// Training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Ridge penalty. Strictly positive; also what keeps the statistics
    /// invertible under later unlearning downdates.
    pub lambda: f64,
    /// Augment every row with a constant-1 intercept term.
    pub fit_intercept: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self { lambda: 1e-3, fit_intercept: true }
    }
}

/// Outcome of a training pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    pub rows: usize,
    pub feature_dim: usize,
    pub label_dim: usize,
    pub lambda: f64,
    /// Mean squared residual of the fitted model over the training set.
    pub residual_mse: f64,
    /// Fingerprint of the dataset the model was fitted on.
    pub fingerprint: String,
    pub trained_at: DateTime<Utc>,
}

/// Fit a model over every resident sample.
///
/// Invoked once per load; unlearning never re-enters this path. Calling
/// it again is permitted and simply refits from the current store.
pub fn fit(store: &SampleStore, config: &TrainConfig) -> Result<(RidgeModel, TrainReport), EnclaveError> {
    if store.is_empty() {
        return Err(EnclaveError::InvalidInput("cannot train on an empty dataset".into()));
    }

    let mut model = RidgeModel::new(
        store.feature_dim(),
        store.label_dim(),
        config.lambda,
        config.fit_intercept,
    )?;

    for (_, sample) in store.iter() {
        model.accumulate(sample.features(), sample.label())?;
    }
    model.refit()?;

    // Residual over the training set, for the report and the logs.
    let mut sq_err = 0.0f64;
    for (_, sample) in store.iter() {
        let score = model.score_row(sample.features())?;
        for (j, &y) in sample.label().iter().enumerate() {
            let diff = score[j] - y as f64;
            sq_err += diff * diff;
        }
    }
    let residual_mse = sq_err / (store.len() * store.label_dim()) as f64;

    let report = TrainReport {
        rows: store.len(),
        feature_dim: store.feature_dim(),
        label_dim: store.label_dim(),
        lambda: config.lambda,
        residual_mse,
        fingerprint: store.fingerprint(),
        trained_at: Utc::now(),
    };
    info!(
        "trained on {} samples ({}x{} -> {}) | lambda={:.1e} | residual_mse={:.6}",
        report.rows,
        report.rows,
        report.feature_dim,
        report.label_dim,
        report.lambda,
        report.residual_mse,
    );
    Ok((model, report))
}
