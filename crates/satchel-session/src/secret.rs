//! Shared secret used by backing stores for at-rest encryption.

use std::fmt;

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// A 256-bit key derived from the application secret.
///
/// The key material is zeroized on drop and never printed.
#[derive(Clone)]
pub struct SecretKey {
    key: Zeroizing<[u8; 32]>,
}

impl SecretKey {
    /// Derive a key from an application secret string.
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = Zeroizing::new([0u8; 32]);
        key.copy_from_slice(&digest);
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}
