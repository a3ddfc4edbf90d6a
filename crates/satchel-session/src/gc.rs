//! Recurring GC sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::manager::Manager;

/// Lower bound on the sweep interval, so a zero idle limit cannot spin.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to a running GC sweep. Dropping it stops the sweep.
pub struct GcTask {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl GcTask {
    pub(crate) fn spawn(manager: Arc<Manager>) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let interval = manager.max_idle().max(MIN_INTERVAL);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                // Store calls block, so the sweep runs off the async workers.
                let sweeper = Arc::clone(&manager);
                match tokio::task::spawn_blocking(move || sweeper.gc()).await {
                    Ok(Ok(evicted)) => debug!(evicted, "GC sweep finished"),
                    Ok(Err(e)) => warn!(error = %e, "GC sweep failed"),
                    Err(e) => warn!(error = %e, "GC sweep aborted"),
                }
            }
            debug!("GC task stopped");
        });

        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Ask the task to stop after any sweep in progress.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for GcTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::codec::Codec;
    use crate::persistence::{BackingStore, MemoryStore};
    use crate::provider::{CacheProvider, ProviderParams};
    use crate::registry::ProviderRegistry;
    use crate::session::Session;

    fn manager(max_idle: Duration) -> (Arc<Manager>, Arc<MemoryStore>) {
        let registry = ProviderRegistry::new();
        registry
            .register("memory", Arc::new(CacheProvider::new()))
            .unwrap();
        let store = Arc::new(MemoryStore::new());
        let params = ProviderParams::new()
            .with_store(Arc::clone(&store) as Arc<dyn BackingStore>)
            .with_secret("gc")
            .with_codec(Codec::primitives());
        let manager = Manager::with_registry(
            &registry,
            "memory",
            Duration::from_secs(3600),
            max_idle,
            Some(params),
        )
        .unwrap();
        (Arc::new(manager), store)
    }

    #[tokio::test]
    async fn test_idle_session_collected_by_task() {
        let (manager, store) = manager(Duration::from_millis(50));
        let session = manager.start("").unwrap();
        let sid = session.session_id().to_string();

        let task = manager.spawn_gc();
        tokio::time::sleep(Duration::from_millis(300)).await;
        task.shutdown().await;

        assert!(!store.contains(&sid));
    }

    #[tokio::test]
    async fn test_cancelled_task_stops_sweeping() {
        let (manager, store) = manager(Duration::from_millis(50));
        let task = manager.spawn_gc();
        task.cancel();
        assert!(task.is_cancelled());
        task.shutdown().await;

        let session = manager.start("").unwrap();
        let sid = session.session_id().to_string();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(store.contains(&sid));
    }
}
