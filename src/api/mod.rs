//! Foreign boundary
//!
//! The narrow-waist C surface the external harness loads from the shared
//! object. Buffers are copied by value across this boundary and raw
//! pointers are never retained; every entry point returns a plain status
//! code instead of unwinding.
//!
//! Status codes:
//! - `0` success
//! - `-1` invalid state, `-2` shape mismatch, `-3` not found,
//!   `-4` capacity exceeded, `-5` init failed, `-6` teardown failed,
//!   `-7` unlearn failed, `-8` invalid input, `-9` internal panic
//!
//! One context lives behind a writer-exclusive lock for the whole
//! process, matching the one-shared-library-handle usage: mutations
//! (load, train, unlearn, destroy) take the write lock, `predict` takes
//! the read lock so concurrent readers never observe a mid-mutation
//! model.

use crate::enclave::{EnclaveConfig, EnclaveContext};
use crate::error::EnclaveError;
use crate::hash::{self, SampleId};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub const STATUS_OK: i32 = 0;
pub const STATUS_INVALID_STATE: i32 = -1;
pub const STATUS_SHAPE_MISMATCH: i32 = -2;
pub const STATUS_NOT_FOUND: i32 = -3;
pub const STATUS_CAPACITY_EXCEEDED: i32 = -4;
pub const STATUS_INIT_FAILED: i32 = -5;
pub const STATUS_TEARDOWN_FAILED: i32 = -6;
pub const STATUS_UNLEARN_FAILED: i32 = -7;
pub const STATUS_INVALID_INPUT: i32 = -8;
pub const STATUS_INTERNAL: i32 = -9;

static CONTEXT: RwLock<Option<EnclaveContext>> = RwLock::new(None);

/// Map an error onto its stable boundary status code.
pub fn status_code(err: &EnclaveError) -> i32 {
    match err {
        EnclaveError::InvalidState(_) => STATUS_INVALID_STATE,
        EnclaveError::ShapeMismatch(_) => STATUS_SHAPE_MISMATCH,
        EnclaveError::NotFound(_) => STATUS_NOT_FOUND,
        EnclaveError::CapacityExceeded { .. } => STATUS_CAPACITY_EXCEEDED,
        EnclaveError::InitFailed(_) => STATUS_INIT_FAILED,
        EnclaveError::TeardownFailed(_) => STATUS_TEARDOWN_FAILED,
        EnclaveError::UnlearnFailed(_) => STATUS_UNLEARN_FAILED,
        EnclaveError::InvalidInput(_) => STATUS_INVALID_INPUT,
    }
}

fn report(result: Result<(), EnclaveError>) -> i32 {
    match result {
        Ok(()) => STATUS_OK,
        Err(err) => {
            log::warn!("boundary call failed ({}): {}", err.kind(), err);
            status_code(&err)
        }
    }
}

/// Panics must not unwind into a foreign caller.
fn contained(body: impl FnOnce() -> i32) -> i32 {
    catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|_| {
        log::error!("panic contained at the foreign boundary");
        STATUS_INTERNAL
    })
}

fn ensure_logging() {
    // The host process may never touch Rust logging; pick up RUST_LOG on
    // first entry. Errors just mean a logger is already installed.
    let _ = env_logger::Builder::from_default_env().try_init();
}

unsafe fn float_slice<'a>(ptr: *const f32, len: usize) -> Option<&'a [f32]> {
    if ptr.is_null() {
        return None;
    }
    Some(std::slice::from_raw_parts(ptr, len))
}

/// Create the process-wide enclave context.
///
/// At most one may be live: a second call without an intervening
/// `destroy_enclave` fails with `STATUS_INVALID_STATE`.
#[no_mangle]
pub extern "C" fn initialize_enclave() -> i32 {
    contained(|| {
        ensure_logging();
        let mut slot = CONTEXT.write();
        if slot.is_some() {
            log::warn!("initialize_enclave called with a live context");
            return STATUS_INVALID_STATE;
        }
        match EnclaveContext::initialize(EnclaveConfig::default()) {
            Ok(ctx) => {
                *slot = Some(ctx);
                STATUS_OK
            }
            Err(err) => status_code(&err),
        }
    })
}

/// Tear down the process-wide context, wiping all secrets.
#[no_mangle]
pub extern "C" fn destroy_enclave() -> i32 {
    contained(|| {
        let mut slot = CONTEXT.write();
        match slot.take() {
            Some(mut ctx) => report(ctx.destroy()),
            None => {
                log::warn!("destroy_enclave called without a live context");
                STATUS_INVALID_STATE
            }
        }
    })
}

/// Copy a dataset into the protected region. `features` holds
/// `row * col` f32 values row-major; `labels` holds `row` values (label
/// width is 1 at this boundary).
#[no_mangle]
pub extern "C" fn load_data(
    features: *const f32,
    labels: *const f32,
    row: i32,
    col: i32,
) -> i32 {
    contained(|| {
        if row <= 0 || col <= 0 {
            return STATUS_INVALID_INPUT;
        }
        let (rows, cols) = (row as usize, col as usize);
        let (features, labels) = unsafe {
            match (float_slice(features, rows * cols), float_slice(labels, rows)) {
                (Some(f), Some(l)) => (f, l),
                _ => return STATUS_INVALID_INPUT,
            }
        };
        let mut slot = CONTEXT.write();
        match slot.as_mut() {
            Some(ctx) => report(ctx.load_data(features, labels, rows, cols).map(|_| ())),
            None => STATUS_INVALID_STATE,
        }
    })
}

/// Train over the loaded dataset, producing the resident model.
#[no_mangle]
pub extern "C" fn init_enclave_storage() -> i32 {
    contained(|| {
        let mut slot = CONTEXT.write();
        match slot.as_mut() {
            Some(ctx) => report(ctx.train().map(|_| ())),
            None => STATUS_INVALID_STATE,
        }
    })
}

/// Content address of a raw buffer: XXH64 with the fixed wire seed over
/// `byte_len` bytes. Returns 0 (the reserved sentinel) for null or
/// non-positive input.
#[no_mangle]
pub extern "C" fn xxhash(buffer: *const f32, byte_len: i32) -> u64 {
    if buffer.is_null() || byte_len <= 0 {
        return 0;
    }
    let bytes = unsafe { std::slice::from_raw_parts(buffer as *const u8, byte_len as usize) };
    match hash::hash_bytes(bytes) {
        Ok(id) => id.0,
        Err(_) => 0,
    }
}

/// Remove the sample with content address `kid` from the trained model
/// and the protected region.
#[no_mangle]
pub extern "C" fn unlearning(kid: u64) -> i32 {
    contained(|| {
        let mut slot = CONTEXT.write();
        match slot.as_mut() {
            Some(ctx) => report(ctx.unlearn(SampleId(kid)).map(|_| ())),
            None => STATUS_INVALID_STATE,
        }
    })
}

/// Evaluate `row_count` rows against the live model. When `out_metrics`
/// is non-null it receives two f32 values: accuracy then MSE.
#[no_mangle]
pub extern "C" fn predict(
    features: *const f32,
    labels: *const f32,
    row_count: i32,
    out_metrics: *mut f32,
) -> i32 {
    contained(|| {
        if row_count <= 0 {
            return STATUS_INVALID_INPUT;
        }
        let rows = row_count as usize;

        let slot = CONTEXT.read();
        let ctx = match slot.as_ref() {
            Some(ctx) => ctx,
            None => return STATUS_INVALID_STATE,
        };
        let (cols, label_dim) = match ctx.model_summary() {
            Some(m) => (m.feature_dim, m.label_dim),
            None => return STATUS_INVALID_STATE,
        };
        let (features, labels) = unsafe {
            match (
                float_slice(features, rows * cols),
                float_slice(labels, rows * label_dim),
            ) {
                (Some(f), Some(l)) => (f, l),
                _ => return STATUS_INVALID_INPUT,
            }
        };
        match ctx.predict(features, labels, rows) {
            Ok(metrics) => {
                if !out_metrics.is_null() {
                    unsafe {
                        *out_metrics = metrics.accuracy as f32;
                        *out_metrics.add(1) = metrics.mse as f32;
                    }
                }
                STATUS_OK
            }
            Err(err) => {
                log::warn!("predict failed ({}): {}", err.kind(), err);
                status_code(&err)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            status_code(&EnclaveError::InvalidState("x".into())),
            STATUS_INVALID_STATE
        );
        assert_eq!(
            status_code(&EnclaveError::ShapeMismatch("x".into())),
            STATUS_SHAPE_MISMATCH
        );
        assert_eq!(status_code(&EnclaveError::NotFound(SampleId(1))), STATUS_NOT_FOUND);
        assert_eq!(
            status_code(&EnclaveError::CapacityExceeded { needed: 1, available: 0 }),
            STATUS_CAPACITY_EXCEEDED
        );
        assert_eq!(
            status_code(&EnclaveError::UnlearnFailed("x".into())),
            STATUS_UNLEARN_FAILED
        );
    }

    #[test]
    fn test_xxhash_sentinel_and_agreement() {
        assert_eq!(xxhash(std::ptr::null(), 12), 0);

        let row: Vec<f32> = vec![1.0, 2.0, 3.0];
        let raw = xxhash(row.as_ptr(), (row.len() * 4) as i32);
        let typed = hash::sample_id(&row, &[]).unwrap();
        assert_eq!(raw, typed.0);
    }

    /// The whole boundary lifecycle in one test, because the context slot
    /// is process-wide: init, double-init guard, load, train, predict,
    /// unlearn, predict again, destroy, post-destroy guard, re-init.
    #[test]
    fn test_ffi_lifecycle() {
        let features: Vec<f32> = vec![
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, //
            0.0, 0.0, 1.0,
        ];
        let labels: Vec<f32> = vec![0.0, 1.0, 0.0];

        // Operations before initialize fail with InvalidState.
        assert_eq!(
            load_data(features.as_ptr(), labels.as_ptr(), 3, 3),
            STATUS_INVALID_STATE
        );
        assert_eq!(init_enclave_storage(), STATUS_INVALID_STATE);
        assert_eq!(unlearning(1), STATUS_INVALID_STATE);
        assert_eq!(destroy_enclave(), STATUS_INVALID_STATE);

        assert_eq!(initialize_enclave(), STATUS_OK);
        assert_eq!(initialize_enclave(), STATUS_INVALID_STATE);

        // Null pointers are rejected before any copy.
        assert_eq!(load_data(std::ptr::null(), labels.as_ptr(), 3, 3), STATUS_INVALID_INPUT);
        assert_eq!(load_data(features.as_ptr(), labels.as_ptr(), 0, 3), STATUS_INVALID_INPUT);

        assert_eq!(load_data(features.as_ptr(), labels.as_ptr(), 3, 3), STATUS_OK);
        assert_eq!(init_enclave_storage(), STATUS_OK);

        let mut metrics = [0.0f32; 2];
        assert_eq!(
            predict(features.as_ptr(), labels.as_ptr(), 3, metrics.as_mut_ptr()),
            STATUS_OK
        );
        assert!(metrics[0] > 0.99, "accuracy {}", metrics[0]);

        // Address of row 1 computed over the same flat bytes the loader saw.
        let mut row1 = features[3..6].to_vec();
        row1.push(labels[1]);
        let kid = xxhash(row1.as_ptr(), (row1.len() * 4) as i32);
        assert_ne!(kid, 0);

        assert_eq!(unlearning(kid), STATUS_OK);
        assert_eq!(unlearning(kid), STATUS_NOT_FOUND);

        // Prediction still works against the mutated model.
        assert_eq!(
            predict(features.as_ptr(), labels.as_ptr(), 3, metrics.as_mut_ptr()),
            STATUS_OK
        );

        assert_eq!(destroy_enclave(), STATUS_OK);
        assert_eq!(init_enclave_storage(), STATUS_INVALID_STATE);
        assert_eq!(destroy_enclave(), STATUS_INVALID_STATE);

        // A destroyed handle can be re-created.
        assert_eq!(initialize_enclave(), STATUS_OK);
        assert_eq!(destroy_enclave(), STATUS_OK);
    }
}
