//! Crate-wide error type for the enclave core.
//!
//! Every boundary-crossing operation is fallible and returns one of these
//! kinds; the foreign interface maps them onto stable negative status
//! codes (see `api::status_code`). A failed operation either left state
//! untouched (safe to retry) or names the context unrecoverable; callers
//! can always tell which from the kind.

use crate::hash::SampleId;

/// Error kinds surfaced by the enclave core.
#[derive(Debug, thiserror::Error)]
pub enum EnclaveError {
    /// Operation issued outside the lifecycle state it requires.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Buffer or dimension mismatch on load or predict.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Unknown sample identifier on lookup or unlearn.
    #[error("sample {0} not found")]
    NotFound(SampleId),

    /// Secure memory pool exhausted.
    #[error("secure pool exhausted: need {needed} bytes, {available} available")]
    CapacityExceeded { needed: usize, available: usize },

    /// Isolated-context setup failure. Unrecoverable within this context.
    #[error("enclave initialization failed: {0}")]
    InitFailed(String),

    /// Isolated-context teardown failure.
    #[error("enclave teardown failed: {0}")]
    TeardownFailed(String),

    /// Model update could not be computed or applied; live state unchanged.
    #[error("unlearning failed: {0}")]
    UnlearnFailed(String),

    /// Malformed caller input (null, empty, or non-integral buffer).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EnclaveError {
    /// Short machine-readable kind name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EnclaveError::InvalidState(_) => "invalid_state",
            EnclaveError::ShapeMismatch(_) => "shape_mismatch",
            EnclaveError::NotFound(_) => "not_found",
            EnclaveError::CapacityExceeded { .. } => "capacity_exceeded",
            EnclaveError::InitFailed(_) => "init_failed",
            EnclaveError::TeardownFailed(_) => "teardown_failed",
            EnclaveError::UnlearnFailed(_) => "unlearn_failed",
            EnclaveError::InvalidInput(_) => "invalid_input",
        }
    }
}
