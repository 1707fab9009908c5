//! Enclave context — lifecycle and operation orchestration
//!
//! One `EnclaveContext` owns everything secret: the sample store, the
//! model, and the pool budget for the protected region. The lifecycle is
//! `Uninitialized -> Initialized -> Destroyed` with `Destroyed` terminal;
//! every operation checks it is running inside `Initialized` and fails
//! with `InvalidState` otherwise. The context is an owned object passed
//! to every operation, so several can coexist in tests; the process-wide
//! single-instance discipline of the foreign boundary lives in `api`,
//! not here.

use crate::enclave::memory::SecurePool;
use crate::error::EnclaveError;
use crate::hash::SampleId;
use crate::predict::{self, PredictionReport};
use crate::storage::{LoadReport, Sample, SampleStore, Splitfile};
use crate::train::{self, ModelSummary, RidgeModel, TrainConfig, TrainReport};
use crate::unlearn::{self, UnlearnReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default protected-region budget: 64 MiB.
pub const DEFAULT_POOL_CAPACITY: usize = 64 * 1024 * 1024;

/// Context configuration, fixed at initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnclaveConfig {
    /// Byte budget for the protected region.
    pub pool_capacity_bytes: usize,
    /// Training configuration used by `train`.
    pub train: TrainConfig,
}

impl Default for EnclaveConfig {
    fn default() -> Self {
        Self {
            pool_capacity_bytes: DEFAULT_POOL_CAPACITY,
            train: TrainConfig::default(),
        }
    }
}

/// Context lifecycle states. `Destroyed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Destroyed,
}

/// Identity of the enclave build, in the style of an SGX measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnclaveMeasurement {
    /// Hash of the enclave code identity.
    pub mrenclave: String,
    /// Hash of the signing identity.
    pub mrsigner: String,
    /// Security version number.
    pub isv_svn: u16,
}

impl EnclaveMeasurement {
    pub fn compute(code_identity: &str, signer: &str, svn: u16) -> Self {
        let mrenclave = {
            let mut h = Sha256::new();
            h.update(code_identity.as_bytes());
            h.update(b"mrenclave-v1");
            hex::encode(h.finalize())
        };
        let mrsigner = {
            let mut h = Sha256::new();
            h.update(signer.as_bytes());
            h.update(b"mrsigner-v1");
            hex::encode(h.finalize())
        };
        Self { mrenclave, mrsigner, isv_svn: svn }
    }

    /// True when the code and signer hashes match and the version is not
    /// older than expected.
    pub fn matches(&self, expected: &EnclaveMeasurement) -> bool {
        self.mrenclave == expected.mrenclave
            && self.mrsigner == expected.mrsigner
            && self.isv_svn >= expected.isv_svn
    }
}

/// Snapshot of a context, safe to report outside the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnclaveStatus {
    pub enclave_id: String,
    pub state: LifecycleState,
    pub created_at: DateTime<Utc>,
    pub samples_resident: usize,
    pub model: Option<ModelSummary>,
    pub pool_used_bytes: usize,
    pub pool_capacity_bytes: usize,
    pub dataset_fingerprint: Option<String>,
}

/// Per-shard replay of queued unlearning requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainReport {
    pub shard: usize,
    pub removed: Vec<UnlearnReport>,
    /// Requests whose address was not (or no longer) resident.
    pub missing: Vec<SampleId>,
}

/// The isolated execution context. Owns dataset, index, and model.
pub struct EnclaveContext {
    id: String,
    config: EnclaveConfig,
    state: LifecycleState,
    measurement: EnclaveMeasurement,
    pool: SecurePool,
    store: SampleStore,
    model: Option<RidgeModel>,
    created_at: DateTime<Utc>,
}

impl EnclaveContext {
    /// Allocate a fresh context with its secure memory budget.
    ///
    /// Precondition at the foreign boundary: at most one live context per
    /// handle; `api` guards double-initialize. In-process, contexts are
    /// independent values and any number may coexist.
    pub fn initialize(config: EnclaveConfig) -> Result<Self, EnclaveError> {
        if config.pool_capacity_bytes == 0 {
            return Err(EnclaveError::InitFailed("pool capacity must be positive".into()));
        }
        if !(config.train.lambda > 0.0) {
            return Err(EnclaveError::InitFailed(format!(
                "ridge lambda must be positive, got {}",
                config.train.lambda
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let measurement = EnclaveMeasurement::compute(
            concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION")),
            "unlearn-signer-key-v1",
            1,
        );
        log::info!(
            "enclave context initialized: id={}, pool={} bytes",
            &id[..8],
            config.pool_capacity_bytes
        );

        Ok(Self {
            id,
            pool: SecurePool::new(config.pool_capacity_bytes),
            config,
            state: LifecycleState::Initialized,
            measurement,
            store: SampleStore::new(),
            model: None,
            created_at: Utc::now(),
        })
    }

    fn ensure_initialized(&self) -> Result<(), EnclaveError> {
        match self.state {
            LifecycleState::Initialized => Ok(()),
            other => Err(EnclaveError::InvalidState(format!(
                "operation requires an initialized context, state is {other:?}"
            ))),
        }
    }

    /// Copy a dataset across the boundary into the protected region,
    /// replacing any resident dataset and invalidating the model.
    ///
    /// All-or-nothing: on any failure the previous dataset, model, and
    /// pool accounting are untouched.
    pub fn load_data(
        &mut self,
        features: &[f32],
        labels: &[f32],
        rows: usize,
        cols: usize,
    ) -> Result<LoadReport, EnclaveError> {
        self.ensure_initialized()?;

        // Reserve the upper bound up front so a dataset that cannot fit
        // fails before a single byte is copied.
        let incoming = (features.len() + labels.len()) * std::mem::size_of::<f32>();
        let resident = self.store.total_bytes();
        self.pool.charge(incoming)?;

        match self.store.load(features, labels, rows, cols) {
            Ok(report) => {
                // Give back the replaced dataset and duplicate slack.
                self.pool.release(resident + (incoming - report.bytes_stored));
                if let Some(mut stale) = self.model.take() {
                    stale.wipe();
                    log::info!("resident model invalidated by new dataset");
                }
                Ok(report)
            }
            Err(err) => {
                self.pool.release(incoming);
                Err(err)
            }
        }
    }

    /// Load only the rows a splitfile assigns to `shard`, from the same
    /// full flat buffers `load_data` takes.
    pub fn load_shard(
        &mut self,
        features: &[f32],
        labels: &[f32],
        rows: usize,
        cols: usize,
        splitfile: &Splitfile,
        shard: usize,
    ) -> Result<LoadReport, EnclaveError> {
        self.ensure_initialized()?;
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
        splitfile.validate(rows)?;
        let slice = splitfile.shard(shard)?;
        if slice.rows.is_empty() {
            return Err(EnclaveError::InvalidInput(format!("shard {shard} assigns no rows")));
        }

        let label_dim = labels.len() / rows;
        let mut sub_features = Vec::with_capacity(slice.rows.len() * cols);
        let mut sub_labels = Vec::with_capacity(slice.rows.len() * label_dim);
        for &row in &slice.rows {
            sub_features.extend_from_slice(&features[row * cols..(row + 1) * cols]);
            sub_labels.extend_from_slice(&labels[row * label_dim..(row + 1) * label_dim]);
        }
        log::info!("loading shard {} ({} of {} rows)", shard, slice.rows.len(), rows);
        self.load_data(&sub_features, &sub_labels, slice.rows.len(), cols)
    }

    /// Train over the resident dataset, replacing any previous model.
    pub fn train(&mut self) -> Result<TrainReport, EnclaveError> {
        self.ensure_initialized()?;
        if self.store.is_empty() {
            return Err(EnclaveError::InvalidState(
                "no dataset resident; load before training".into(),
            ));
        }
        let (model, report) = train::fit(&self.store, &self.config.train)?;
        if let Some(mut old) = self.model.replace(model) {
            old.wipe();
        }
        Ok(report)
    }

    /// Evaluate a batch against the live model. Read-only.
    pub fn predict(
        &self,
        features: &[f32],
        labels: &[f32],
        rows: usize,
    ) -> Result<PredictionReport, EnclaveError> {
        self.ensure_initialized()?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| EnclaveError::InvalidState("no model trained".into()))?;
        predict::evaluate(model, features, labels, rows)
    }

    /// Remove one sample's influence from the model, and the sample
    /// itself from the protected region.
    pub fn unlearn(&mut self, id: SampleId) -> Result<UnlearnReport, EnclaveError> {
        self.ensure_initialized()?;
        let model = self
            .model
            .as_mut()
            .ok_or_else(|| EnclaveError::InvalidState("no model trained".into()))?;
        unlearn::remove(model, &mut self.store, &mut self.pool, id)
    }

    /// Replay the unlearning requests a splitfile queues for `shard`.
    /// Addresses that are not resident are reported, not silently
    /// skipped; any other failure aborts the drain.
    pub fn drain_requests(
        &mut self,
        splitfile: &Splitfile,
        shard: usize,
    ) -> Result<DrainReport, EnclaveError> {
        self.ensure_initialized()?;
        let requests: Vec<u64> = splitfile.shard(shard)?.requests.clone();

        let mut report = DrainReport { shard, removed: Vec::new(), missing: Vec::new() };
        for raw in requests {
            let id = SampleId(raw);
            match self.unlearn(id) {
                Ok(r) => report.removed.push(r),
                Err(EnclaveError::NotFound(_)) => report.missing.push(id),
                Err(other) => return Err(other),
            }
        }
        log::info!(
            "drained shard {}: {} removed, {} missing",
            shard,
            report.removed.len(),
            report.missing.len()
        );
        Ok(report)
    }

    /// Resolve a content address to its resident sample.
    pub fn lookup(&self, id: SampleId) -> Result<&Sample, EnclaveError> {
        self.ensure_initialized()?;
        self.store.lookup(id)
    }

    /// Content addresses of the resident dataset, insertion order.
    pub fn sample_ids(&self) -> Result<&[SampleId], EnclaveError> {
        self.ensure_initialized()?;
        Ok(self.store.ids())
    }

    pub fn status(&self) -> EnclaveStatus {
        EnclaveStatus {
            enclave_id: self.id.clone(),
            state: self.state,
            created_at: self.created_at,
            samples_resident: self.store.len(),
            model: self.model.as_ref().map(|m| m.summary()),
            pool_used_bytes: self.pool.used_bytes(),
            pool_capacity_bytes: self.pool.capacity_bytes(),
            dataset_fingerprint: if self.store.is_empty() {
                None
            } else {
                Some(self.store.fingerprint())
            },
        }
    }

    /// Shape of the resident model, if one is trained.
    pub fn model_summary(&self) -> Option<ModelSummary> {
        self.model.as_ref().map(|m| m.summary())
    }

    pub fn measurement(&self) -> &EnclaveMeasurement {
        &self.measurement
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Tear the context down: wipe every buffer that held feature, label,
    /// or parameter data, release the pool, and enter the terminal state.
    /// Must be called before process exit; Drop wipes as a backstop but
    /// is not the contract.
    pub fn destroy(&mut self) -> Result<(), EnclaveError> {
        self.ensure_initialized()
            .map_err(|_| EnclaveError::TeardownFailed(format!("context is {:?}", self.state)))?;
        self.wipe_secrets();
        self.state = LifecycleState::Destroyed;
        log::info!("enclave context destroyed: id={}", &self.id[..8]);
        Ok(())
    }

    fn wipe_secrets(&mut self) {
        self.store.clear();
        if let Some(mut model) = self.model.take() {
            model.wipe();
        }
        self.pool.drain();
    }
}

impl Drop for EnclaveContext {
    fn drop(&mut self) {
        if self.state == LifecycleState::Initialized {
            log::warn!("enclave context dropped without destroy, wiping secrets");
            self.wipe_secrets();
        }
    }
}
