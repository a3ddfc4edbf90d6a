//! Persistent backing store interface.
//!
//! The provider keeps live sessions in memory and talks to durable storage
//! only through [`BackingStore`]: one row per session id holding an opaque
//! value blob plus created/accessed timestamps. Encryption of the blob is the
//! store's business; it receives the provider's [`SecretKey`] on every call
//! that moves plaintext in or out.
//!
//! Store calls are blocking and are made while the provider holds one of its
//! own locks, so implementations must never call back into the provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::secret::SecretKey;

/// Errors reported by a backing store. Propagated to callers unchanged.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connectivity or driver failure.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Stored data could not be decrypted or is corrupt.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// A row for this session id already exists.
    #[error("Session row already exists: {0}")]
    Exists(String),

    /// No row exists for this session id.
    #[error("Session row not found: {0}")]
    NotFound(String),
}

/// Result type for backing store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A session row as read back from storage, blob already decrypted.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub blob: Vec<u8>,
}

/// Durable storage addressed by session id.
pub trait BackingStore: Send + Sync {
    /// Create an empty row for `session_id`.
    fn create(&self, session_id: &str, now: DateTime<Utc>) -> StoreResult<()>;

    /// Read and decrypt one row. `Ok(None)` if no row exists.
    fn read_one(&self, session_id: &str, key: &SecretKey) -> StoreResult<Option<StoredSession>>;

    /// Encrypt and replace the blob, stamping the accessed time. Fails with
    /// [`StoreError::NotFound`] if the row is gone.
    fn update(
        &self,
        session_id: &str,
        blob: &[u8],
        key: &SecretKey,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Delete the row. Deleting a missing row is not an error.
    fn delete(&self, session_id: &str) -> StoreResult<()>;
}

/// In-process store, for tests and single-process deployments that do not
/// need durability.
///
/// Blobs are kept as given; nothing is encrypted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, StoredSession>>,
    updates: AtomicUsize,
    fail_next_update: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `update` calls so far.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Make the next `update` call fail with a backend error.
    pub fn fail_next_update(&self) {
        self.fail_next_update.store(true, Ordering::SeqCst);
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.rows.lock().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    /// Insert a row directly, bypassing the provider.
    pub fn put(&self, session_id: &str, row: StoredSession) {
        self.rows.lock().insert(session_id.to_string(), row);
    }
}

impl BackingStore for MemoryStore {
    fn create(&self, session_id: &str, now: DateTime<Utc>) -> StoreResult<()> {
        let mut rows = self.rows.lock();
        if rows.contains_key(session_id) {
            return Err(StoreError::Exists(session_id.to_string()));
        }
        rows.insert(
            session_id.to_string(),
            StoredSession {
                created_at: now,
                accessed_at: now,
                blob: Vec::new(),
            },
        );
        Ok(())
    }

    fn read_one(&self, session_id: &str, _key: &SecretKey) -> StoreResult<Option<StoredSession>> {
        Ok(self.rows.lock().get(session_id).cloned())
    }

    fn update(
        &self,
        session_id: &str,
        blob: &[u8],
        _key: &SecretKey,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        if self.fail_next_update.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected update failure".to_string()));
        }
        let mut rows = self.rows.lock();
        let row = rows
            .get_mut(session_id)
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))?;
        row.blob = blob.to_vec();
        row.accessed_at = now;
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, session_id: &str) -> StoreResult<()> {
        self.rows.lock().remove(session_id);
        Ok(())
    }
}
