//! CLI command handlers.

pub mod destroy;
pub mod show;
pub mod start;

use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use satchel_session::{
    BackingStore, CacheProvider, DEFAULT_PROVIDER, Manager, ProviderParams, ProviderRegistry,
};
use satchel_sqlite::SqliteStore;
use tracing::debug;

use crate::config::SatchelConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: SatchelConfig,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Open the configured store.
    pub fn open_store(&self) -> Result<Arc<SqliteStore>> {
        let path = self.config.db_path()?;
        let store = SqliteStore::open(&path)
            .with_context(|| format!("failed to open session store at {}", path.display()))?;
        Ok(Arc::new(store))
    }

    /// The encryption secret, read from the configured environment variable.
    pub fn secret(&self) -> Result<String> {
        let var = &self.config.store.secret_env;
        match std::env::var(var) {
            Ok(secret) if !secret.is_empty() => Ok(secret),
            _ => bail!("encryption secret not set; export {var}"),
        }
    }

    /// Build a manager whose cache provider writes through to `store`.
    pub fn manager(&self, store: &Arc<SqliteStore>) -> Result<Manager> {
        let registry = ProviderRegistry::global();
        if !registry.contains(DEFAULT_PROVIDER) {
            registry.register(DEFAULT_PROVIDER, Arc::new(CacheProvider::new()))?;
        }

        let params = ProviderParams::new()
            .with_store(Arc::clone(store) as Arc<dyn BackingStore>)
            .with_secret(&self.secret()?);
        let manager = Manager::from_config(&self.config.manager, Some(params))?;
        debug!(?manager, "Manager ready");
        Ok(manager)
    }
}
