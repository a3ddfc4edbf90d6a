//! AES-256-GCM sealing of value blobs.
//!
//! Sealed layout: a fresh 12-byte nonce followed by the ciphertext and tag.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use satchel_session::SecretKey;

use crate::error::{Result, SqliteStoreError};

const NONCE_LEN: usize = 12;

/// Encrypt `plaintext` under `key` with a random nonce.
pub(crate) fn seal(key: &SecretKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    getrandom::fill(&mut nonce_bytes).map_err(|e| SqliteStoreError::Crypto(e.to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| SqliteStoreError::Crypto(e.to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a blob produced by [`seal`]. Fails on a wrong key or tampering.
pub(crate) fn open(key: &SecretKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(SqliteStoreError::Crypto(format!(
            "sealed blob too short: {} bytes",
            sealed.len()
        )));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| SqliteStoreError::Crypto("decryption failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let key = SecretKey::new("k");
        let sealed = seal(&key, b"payload").unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + b"payload".len() + 16);
        assert_eq!(open(&key, &sealed).unwrap(), b"payload");
    }

    #[test]
    fn test_nonce_differs_per_seal() {
        let key = SecretKey::new("k");
        assert_ne!(seal(&key, b"same").unwrap(), seal(&key, b"same").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(&SecretKey::new("right"), b"payload").unwrap();
        assert!(open(&SecretKey::new("wrong"), &sealed).is_err());
    }

    #[test]
    fn test_tampered_blob_fails() {
        let key = SecretKey::new("k");
        let mut sealed = seal(&key, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(open(&key, &sealed).is_err());
        assert!(open(&key, &sealed[..4]).is_err());
    }
}
