//! Isolated execution context
//!
//! - **Context**: lifecycle manager owning dataset, index, and model
//! - **Memory**: zeroize-on-drop buffers and the protected-region budget

pub mod context;
pub mod memory;

pub use context::{
    DrainReport, EnclaveConfig, EnclaveContext, EnclaveMeasurement, EnclaveStatus,
    LifecycleState, DEFAULT_POOL_CAPACITY,
};
pub use memory::{SecurePool, SecureVec};
