//! Name → provider registry.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::provider::Provider;

static GLOBAL: LazyLock<ProviderRegistry> = LazyLock::new(ProviderRegistry::new);

/// Append-only registry of session providers.
///
/// Populate it at startup, before any [`Manager`](crate::Manager) is built.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by [`Manager::new`](crate::Manager::new).
    pub fn global() -> &'static ProviderRegistry {
        &GLOBAL
    }

    /// Make `provider` available under `name`. Fails if the name is taken.
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Result<()> {
        let name = name.into();
        let mut providers = self.providers.write();
        if providers.contains_key(&name) {
            return Err(Error::DuplicateProvider(name));
        }
        debug!(provider = %name, "Session provider registered");
        providers.insert(name, provider);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::CacheProvider;

    #[test]
    fn test_register_and_get() {
        let registry = ProviderRegistry::new();
        registry
            .register("memory", Arc::new(CacheProvider::new()))
            .unwrap();
        assert!(registry.contains("memory"));
        assert_eq!(registry.get("memory").unwrap().session_id_len(), 36);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = ProviderRegistry::new();
        registry.register("a", Arc::new(CacheProvider::new())).unwrap();
        let err = registry
            .register("a", Arc::new(CacheProvider::new()))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateProvider(name) if name == "a"));
    }

    #[test]
    fn test_unknown_name() {
        let registry = ProviderRegistry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(Error::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_names_sorted() {
        let registry = ProviderRegistry::new();
        registry.register("b", Arc::new(CacheProvider::new())).unwrap();
        registry.register("a", Arc::new(CacheProvider::new())).unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
    }
}
