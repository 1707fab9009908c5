//! unlearn-core — enclave-resident training store with exact unlearning
//!
//! Ingests a dataset into an isolated execution context, trains a model
//! whose state decomposes into per-sample contributions, and removes a
//! single sample's influence by content address without retraining.

pub mod api;
pub mod enclave;
pub mod error;
pub mod hash;
pub mod predict;
pub mod storage;
pub mod train;
pub mod unlearn;

pub use enclave::{EnclaveConfig, EnclaveContext, EnclaveStatus, LifecycleState};
pub use error::EnclaveError;
pub use hash::SampleId;
pub use storage::{SampleStore, Splitfile};
pub use train::{RidgeModel, TrainConfig};
