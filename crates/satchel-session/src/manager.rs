//! Process-facing session manager.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{GcMode, ManagerConfig};
use crate::error::{Error, Result};
use crate::gc::GcTask;
use crate::provider::{Provider, ProviderParams};
use crate::registry::ProviderRegistry;
use crate::session::Session;

/// Entry point for starting, closing and destroying sessions.
///
/// Every lifecycle call (and every GC sweep) is serialized by one lock
/// across all sessions. Accessor calls on started sessions do not take it.
pub struct Manager {
    lock: Mutex<()>,
    provider: Arc<dyn Provider>,
    max_lifetime: Duration,
    max_idle: Duration,
    gc_mode: GcMode,
}

impl Manager {
    /// Build a manager around a provider from the global registry.
    ///
    /// `params`, if given, are forwarded to the provider's initialization.
    pub fn new(
        provider_name: &str,
        max_lifetime: Duration,
        max_idle: Duration,
        params: Option<ProviderParams>,
    ) -> Result<Self> {
        Self::with_registry(
            ProviderRegistry::global(),
            provider_name,
            max_lifetime,
            max_idle,
            params,
        )
    }

    /// Build a manager around a provider from `registry`.
    pub fn with_registry(
        registry: &ProviderRegistry,
        provider_name: &str,
        max_lifetime: Duration,
        max_idle: Duration,
        params: Option<ProviderParams>,
    ) -> Result<Self> {
        let provider = registry.get(provider_name)?;
        if let Some(params) = params {
            provider.init_provider(params)?;
        }

        debug!(
            provider = %provider_name,
            max_lifetime_secs = max_lifetime.as_secs(),
            max_idle_secs = max_idle.as_secs(),
            "Session manager created"
        );

        Ok(Self {
            lock: Mutex::new(()),
            provider,
            max_lifetime,
            max_idle,
            gc_mode: GcMode::default(),
        })
    }

    /// Build a manager from configuration, using the global registry.
    pub fn from_config(config: &ManagerConfig, params: Option<ProviderParams>) -> Result<Self> {
        Ok(Self::new(
            &config.provider,
            config.max_lifetime,
            config.max_idle,
            params,
        )?
        .with_gc_mode(config.gc_mode))
    }

    /// Sweep strategy used by [`Manager::gc`] and the recurring task.
    pub fn with_gc_mode(mut self, mode: GcMode) -> Self {
        self.gc_mode = mode;
        self
    }

    pub fn gc_mode(&self) -> GcMode {
        self.gc_mode
    }

    /// (Re)initialize the provider with backend-specific parameters.
    pub fn init_provider(&self, params: ProviderParams) -> Result<()> {
        self.provider.init_provider(params)
    }

    pub fn session_id_len(&self) -> usize {
        self.provider.session_id_len()
    }

    pub fn max_lifetime(&self) -> Duration {
        self.max_lifetime
    }

    pub fn max_idle(&self) -> Duration {
        self.max_idle
    }

    /// Start a session. An empty `sid` creates a new session under a
    /// generated id; otherwise the session is read, or created if unknown.
    pub fn start(&self, sid: &str) -> Result<Arc<dyn Session>> {
        let _guard = self.lock.lock();

        if sid.is_empty() {
            let sid = generate_session_id();
            if sid.is_empty() {
                return Err(Error::IdGeneration);
            }
            return self.provider.session_init(&sid);
        }
        self.provider.session_read(sid)
    }

    /// Flush a live session. Empty ids are ignored.
    pub fn close(&self, sid: &str) -> Result<()> {
        if sid.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock();
        self.provider.session_close(sid)
    }

    /// Delete a session from memory and storage. Empty ids are ignored.
    pub fn destroy(&self, sid: &str) -> Result<()> {
        if sid.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock();
        self.provider.session_destroy(sid)
    }

    /// Run one GC sweep now, returning the number of sessions evicted.
    pub fn gc(&self) -> Result<usize> {
        let _guard = self.lock.lock();
        self.provider
            .session_gc(self.max_lifetime, self.max_idle, self.gc_mode)
    }

    /// Start the recurring GC sweep on the current tokio runtime.
    ///
    /// The first sweep runs `max_idle` from now, and each later one
    /// `max_idle` after the previous finished. The sweep stops when the
    /// returned handle is cancelled or dropped.
    pub fn spawn_gc(self: &Arc<Self>) -> GcTask {
        GcTask::spawn(Arc::clone(self))
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("max_lifetime", &self.max_lifetime)
            .field("max_idle", &self.max_idle)
            .field("gc_mode", &self.gc_mode)
            .finish_non_exhaustive()
    }
}

/// Generate a 36-character session id from 16 random bytes, grouped
/// 4-2-2-2-6 in lowercase hex.
///
/// Returns an empty string if the randomness source fails.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    if let Err(e) = getrandom::fill(&mut bytes) {
        warn!(error = %e, "Randomness source failed, no session id generated");
        return String::new();
    }
    Uuid::from_bytes(bytes).hyphenated().to_string()
}
