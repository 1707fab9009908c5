//! Protected memory primitives
//!
//! Sample content and model parameters only ever live inside `SecureVec`
//! buffers, which wipe themselves on drop, and every allocation is charged
//! against the context's `SecurePool` so the protected region has a hard
//! byte budget.

use crate::error::EnclaveError;
use std::fmt;
use std::ops::Deref;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Owned f32 buffer that zeroes its contents before the memory is
/// released. The only container sample rows are stored in.
#[derive(Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct SecureVec {
    data: Vec<f32>,
}

impl fmt::Debug for SecureVec {
    // Contents stay out of logs and panic messages.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureVec[{} f32]", self.data.len())
    }
}

impl SecureVec {
    /// Copy a plaintext slice into protected ownership.
    pub fn copy_from(slice: &[f32]) -> Self {
        Self { data: slice.to_vec() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Size of the buffer in bytes, as charged against the pool.
    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Wipe in place without waiting for drop.
    pub fn wipe(&mut self) {
        self.data.zeroize();
    }
}

impl Deref for SecureVec {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.data
    }
}

/// Byte-budget accounting for the protected region.
///
/// The pool does not allocate; it bounds what the context may hold so a
/// caller loading an oversized dataset fails with `CapacityExceeded`
/// instead of silently growing the secure footprint.
#[derive(Debug, Clone)]
pub struct SecurePool {
    capacity_bytes: usize,
    used_bytes: usize,
}

impl SecurePool {
    pub fn new(capacity_bytes: usize) -> Self {
        Self { capacity_bytes, used_bytes: 0 }
    }

    /// Reserve `bytes` from the pool, all or nothing.
    pub fn charge(&mut self, bytes: usize) -> Result<(), EnclaveError> {
        let available = self.capacity_bytes - self.used_bytes;
        if bytes > available {
            return Err(EnclaveError::CapacityExceeded { needed: bytes, available });
        }
        self.used_bytes += bytes;
        Ok(())
    }

    /// Return `bytes` to the pool. Saturates at zero; releasing more than
    /// was charged indicates an accounting bug upstream and is logged.
    pub fn release(&mut self, bytes: usize) {
        if bytes > self.used_bytes {
            log::warn!(
                "pool release of {} bytes exceeds {} in use, clamping",
                bytes,
                self.used_bytes
            );
            self.used_bytes = 0;
        } else {
            self.used_bytes -= bytes;
        }
    }

    /// Drop all charges, e.g. on context teardown.
    pub fn drain(&mut self) {
        self.used_bytes = 0;
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn available_bytes(&self) -> usize {
        self.capacity_bytes - self.used_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_vec_round_trip() {
        let v = SecureVec::copy_from(&[1.0, 2.0, 3.0]);
        assert_eq!(v.as_slice(), &[1.0, 2.0, 3.0]);
        assert_eq!(v.byte_len(), 12);
        assert!(!v.is_empty());
    }

    #[test]
    fn test_secure_vec_wipe() {
        let mut v = SecureVec::copy_from(&[4.0, 5.0]);
        v.wipe();
        assert_eq!(v.as_slice(), &[0.0, 0.0]);
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn test_pool_charge_and_release() {
        let mut pool = SecurePool::new(100);
        pool.charge(60).unwrap();
        assert_eq!(pool.used_bytes(), 60);
        assert_eq!(pool.available_bytes(), 40);

        pool.release(20);
        assert_eq!(pool.used_bytes(), 40);

        pool.drain();
        assert_eq!(pool.used_bytes(), 0);
    }

    #[test]
    fn test_pool_exhaustion_is_all_or_nothing() {
        let mut pool = SecurePool::new(100);
        pool.charge(90).unwrap();
        let err = pool.charge(20).unwrap_err();
        match err {
            EnclaveError::CapacityExceeded { needed, available } => {
                assert_eq!(needed, 20);
                assert_eq!(available, 10);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Failed charge must not consume anything.
        assert_eq!(pool.used_bytes(), 90);
    }

    #[test]
    fn test_pool_release_clamps() {
        let mut pool = SecurePool::new(50);
        pool.charge(10).unwrap();
        pool.release(999);
        assert_eq!(pool.used_bytes(), 0);
    }
}
