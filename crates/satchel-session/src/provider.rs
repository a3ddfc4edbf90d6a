//! Session providers.
//!
//! A [`Provider`] implements the session lifecycle against one backing
//! technology. [`CacheProvider`] keeps live sessions in a [`RecencyIndex`]
//! and reads through to a [`BackingStore`] on a miss. Writes are write-back:
//! values reach the store only when a session is flushed or closed.
//!
//! Locking: the index mutex is the coarse lock. It is held across the store
//! calls made by init, read, destroy and GC, and taken briefly by every
//! accessor touch. Entity locks are only ever taken after it, never before.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::codec::{self, Codec};
use crate::config::GcMode;
use crate::error::{Error, Result};
use crate::index::RecencyIndex;
use crate::persistence::BackingStore;
use crate::secret::SecretKey;
use crate::session::{Session, SessionStore};
use crate::ttl::Expiry;

/// Maximum session id length accepted by [`CacheProvider`].
pub const SESSION_ID_LEN: usize = 36;

/// Lifecycle operations every session backend implements.
pub trait Provider: Send + Sync {
    /// Supply backend-specific parameters. May be called again to replace
    /// them; sessions already live keep the parameters they were created with.
    fn init_provider(&self, params: ProviderParams) -> Result<()>;

    /// Create a new, empty session.
    fn session_init(&self, sid: &str) -> Result<Arc<dyn Session>>;

    /// Return the live session, loading it from storage on a miss. An id
    /// unknown to storage yields a new empty session.
    fn session_read(&self, sid: &str) -> Result<Arc<dyn Session>>;

    /// Delete the session from storage and memory. Idempotent.
    fn session_destroy(&self, sid: &str) -> Result<()>;

    /// Flush the session if it is live. The session stays in memory.
    fn session_close(&self, sid: &str) -> Result<()>;

    /// Evict expired sessions, returning how many were removed. `mode`
    /// selects how much of the live set is checked.
    fn session_gc(
        &self,
        max_lifetime: Duration,
        max_idle: Duration,
        mode: GcMode,
    ) -> Result<usize>;

    /// Longest session id this backend can store.
    fn session_id_len(&self) -> usize;
}

/// Initialization parameters for a provider.
#[derive(Clone, Default)]
pub struct ProviderParams {
    store: Option<Arc<dyn BackingStore>>,
    secret: Option<SecretKey>,
    codec: Option<Codec>,
}

impl ProviderParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: Arc<dyn BackingStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Secret used by the store for at-rest encryption.
    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = (!secret.is_empty()).then(|| SecretKey::new(secret));
        self
    }

    pub fn with_secret_key(mut self, key: SecretKey) -> Self {
        self.secret = Some(key);
        self
    }

    /// Codec for value blobs. Defaults to [`codec::global`].
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = Some(codec);
        self
    }
}

impl fmt::Debug for ProviderParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderParams")
            .field("has_store", &self.store.is_some())
            .field("has_secret", &self.secret.is_some())
            .field("codec", &self.codec)
            .finish()
    }
}

/// Everything a session needs to flush itself. Read-only once built.
pub(crate) struct Backend {
    pub(crate) store: Arc<dyn BackingStore>,
    pub(crate) key: SecretKey,
    pub(crate) codec: Codec,
}

/// Provider that caches live sessions in a recency-ordered index.
pub struct CacheProvider {
    index: Arc<Mutex<RecencyIndex>>,
    backend: RwLock<Option<Arc<Backend>>>,
}

impl CacheProvider {
    /// An uninitialized provider; call [`Provider::init_provider`] before use.
    pub fn new() -> Self {
        Self {
            index: Arc::new(Mutex::new(RecencyIndex::new())),
            backend: RwLock::new(None),
        }
    }

    /// Create and initialize in one step.
    pub fn with_params(params: ProviderParams) -> Result<Self> {
        let provider = Self::new();
        provider.init_provider(params)?;
        Ok(provider)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.lock().is_empty()
    }

    /// Whether `sid` is live, without touching it.
    pub fn contains(&self, sid: &str) -> bool {
        self.index.lock().contains(sid)
    }

    /// Live session ids from most to least recently touched.
    pub fn session_ids(&self) -> Vec<String> {
        self.index
            .lock()
            .iter()
            .map(|entity| entity.id().to_string())
            .collect()
    }

    fn backend(&self) -> Result<Arc<Backend>> {
        self.backend.read().clone().ok_or(Error::NotInitialized)
    }

    fn check_id(sid: &str) -> Result<()> {
        if sid.len() > SESSION_ID_LEN {
            return Err(Error::IdTooLong {
                len: sid.len(),
                max: SESSION_ID_LEN,
            });
        }
        Ok(())
    }

    fn init_locked(
        &self,
        index: &mut RecencyIndex,
        backend: &Arc<Backend>,
        sid: &str,
    ) -> Result<Arc<dyn Session>> {
        let now = Utc::now();
        let entity = Arc::new(SessionStore::new(
            sid,
            now,
            now,
            Default::default(),
            Arc::clone(backend),
            Arc::downgrade(&self.index),
        ));
        index.insert(Arc::clone(&entity))?;

        if let Err(e) = backend.store.create(sid, now) {
            index.remove(sid);
            return Err(e.into());
        }

        debug!(session_id = %sid, "Session created");
        Ok(entity)
    }

    fn destroy_locked(index: &mut RecencyIndex, backend: &Backend, sid: &str) -> Result<()> {
        backend.store.delete(sid)?;
        if index.remove(sid).is_some() {
            debug!(session_id = %sid, "Session removed from cache");
        }
        Ok(())
    }
}

impl Default for CacheProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for CacheProvider {
    fn init_provider(&self, params: ProviderParams) -> Result<()> {
        let store = params
            .store
            .ok_or_else(|| Error::InvalidParams("missing backing store".to_string()))?;
        let key = params
            .secret
            .ok_or_else(|| Error::InvalidParams("missing encryption secret".to_string()))?;
        let codec = params.codec.unwrap_or_else(codec::global);

        *self.backend.write() = Some(Arc::new(Backend { store, key, codec }));
        info!("Session provider initialized");
        Ok(())
    }

    fn session_init(&self, sid: &str) -> Result<Arc<dyn Session>> {
        let backend = self.backend()?;
        Self::check_id(sid)?;

        let mut index = self.index.lock();
        self.init_locked(&mut index, &backend, sid)
    }

    fn session_read(&self, sid: &str) -> Result<Arc<dyn Session>> {
        let backend = self.backend()?;
        Self::check_id(sid)?;

        let mut index = self.index.lock();
        let now = Utc::now();
        if index.touch(sid, now)
            && let Some(entity) = index.peek(sid)
        {
            debug!(session_id = %sid, "Session read from cache");
            return Ok(entity);
        }

        let Some(row) = backend.store.read_one(sid, &backend.key)? else {
            debug!(session_id = %sid, "Unknown session id, creating");
            return self.init_locked(&mut index, &backend, sid);
        };

        let values = backend.codec.decode(&row.blob)?;
        let entity = Arc::new(SessionStore::new(
            sid,
            row.created_at,
            now,
            values,
            Arc::clone(&backend),
            Arc::downgrade(&self.index),
        ));
        index.insert(Arc::clone(&entity))?;

        debug!(
            session_id = %sid,
            keys = entity.len(),
            cache_size = index.len(),
            "Session loaded from store"
        );
        Ok(entity)
    }

    fn session_destroy(&self, sid: &str) -> Result<()> {
        let backend = self.backend()?;
        let mut index = self.index.lock();
        Self::destroy_locked(&mut index, &backend, sid)
    }

    fn session_close(&self, sid: &str) -> Result<()> {
        // Release the index lock before the flush takes the entity lock.
        let entity = self.index.lock().peek(sid);
        match entity {
            Some(entity) => entity.flush(),
            None => Ok(()),
        }
    }

    fn session_gc(
        &self,
        max_lifetime: Duration,
        max_idle: Duration,
        mode: GcMode,
    ) -> Result<usize> {
        let Ok(backend) = self.backend() else {
            return Ok(0);
        };
        let expiry = Expiry::new(max_lifetime, max_idle);
        let now = Utc::now();

        let mut index = self.index.lock();
        let mut evicted = 0;

        match mode {
            GcMode::StaleEnd => {
                // Stops at the first fresh session. A session past its
                // lifetime but touched recently waits for a later sweep.
                while let Some(entity) = index.evict_candidate() {
                    if !entity.is_expired(&expiry, now) {
                        break;
                    }
                    Self::destroy_locked(&mut index, &backend, entity.id())?;
                    evicted += 1;
                }
            }
            GcMode::FullScan => {
                let expired: Vec<String> = index
                    .iter()
                    .filter(|entity| entity.is_expired(&expiry, now))
                    .map(|entity| entity.id().to_string())
                    .collect();
                for sid in expired {
                    Self::destroy_locked(&mut index, &backend, &sid)?;
                    evicted += 1;
                }
            }
        }

        if evicted > 0 {
            debug!(evicted, remaining = index.len(), "Expired sessions collected");
        }
        Ok(evicted)
    }

    fn session_id_len(&self) -> usize {
        SESSION_ID_LEN
    }
}
