//! Pre-shared secret material

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{TransecError, TransecResult};

/// Shared secret size in bytes
pub const SECRET_SIZE: usize = 32;

/// 256-bit pre-shared secret.
///
/// Each peer owns its own copy; the ratchet replaces it wholesale. Wiped on
/// drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SECRET_SIZE]);

impl SharedSecret {
    /// Wrap exactly 32 bytes of secret material
    pub fn from_bytes(bytes: [u8; SECRET_SIZE]) -> Self {
        SharedSecret(bytes)
    }

    /// Copy a secret out of a slice, rejecting anything but 32 bytes
    pub fn from_slice(bytes: &[u8]) -> TransecResult<Self> {
        let array: [u8; SECRET_SIZE] = bytes.try_into().map_err(|_| {
            TransecError::config(format!(
                "shared secret must be exactly {} bytes, got {}",
                SECRET_SIZE,
                bytes.len()
            ))
        })?;
        Ok(SharedSecret(array))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}
