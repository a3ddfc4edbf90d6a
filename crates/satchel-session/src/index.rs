//! Recency index of live sessions.
//!
//! An unbounded [`LruCache`] provides both halves of the index at once: the
//! id → node map and the intrusive recency list, kept consistent by the
//! cache itself. Capacity is never the eviction trigger here; sessions leave
//! only through destroy or a GC sweep.
//!
//! The index carries no lock of its own. The provider wraps it in the coarse
//! lock, and every method below assumes that lock is held.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lru::LruCache;
use tracing::trace;

use crate::error::{Error, Result};
use crate::session::SessionStore;

pub struct RecencyIndex {
    entries: LruCache<String, Arc<SessionStore>>,
}

impl RecencyIndex {
    pub fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }

    /// Move `id` to the fresh end and stamp its access time.
    ///
    /// Returns `false` if the id is not indexed.
    pub fn touch(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        match self.entries.get(id) {
            Some(entry) => {
                entry.mark_accessed(now);
                trace!(session_id = %id, "Session touched");
                true
            }
            None => false,
        }
    }

    /// Touch `entity` only if it is the session indexed under its id. A
    /// handle kept past a destroy must not refresh a later session that
    /// reuses the id.
    pub fn touch_entity(&mut self, entity: &SessionStore, now: DateTime<Utc>) -> bool {
        let indexed = self
            .entries
            .peek(entity.id())
            .is_some_and(|current| std::ptr::eq(Arc::as_ptr(current), entity));
        indexed && self.touch(entity.id(), now)
    }

    /// Add a session at the fresh end. Fails if its id is already indexed.
    pub fn insert(&mut self, entity: Arc<SessionStore>) -> Result<()> {
        let id = entity.id().to_string();
        if self.entries.contains(&id) {
            return Err(Error::AlreadyExists(id));
        }
        self.entries.put(id, entity);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<SessionStore>> {
        self.entries.pop(id)
    }

    /// Look up a session without changing its position.
    pub fn peek(&self, id: &str) -> Option<Arc<SessionStore>> {
        self.entries.peek(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains(id)
    }

    /// The least recently touched session.
    pub fn evict_candidate(&self) -> Option<Arc<SessionStore>> {
        self.entries.peek_lru().map(|(_, entity)| Arc::clone(entity))
    }

    /// Sessions from most to least recently touched.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SessionStore>> {
        self.entries.iter().map(|(_, entity)| entity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RecencyIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use crate::session::tests::detached_session;

    fn index_of(ids: &[&str]) -> RecencyIndex {
        let mut index = RecencyIndex::new();
        for id in ids {
            index.insert(detached_session(id)).unwrap();
        }
        index
    }

    fn order(index: &RecencyIndex) -> Vec<String> {
        index.iter().map(|e| e.id().to_string()).collect()
    }

    #[test]
    fn test_insert_goes_to_fresh_end() {
        let index = index_of(&["a", "b", "c"]);
        assert_eq!(order(&index), vec!["c", "b", "a"]);
        assert_eq!(index.evict_candidate().unwrap().id(), "a");
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let mut index = index_of(&["a"]);
        let err = index.insert(detached_session("a")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(id) if id == "a"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_touch_moves_to_fresh_end() {
        let mut index = index_of(&["a", "b", "c"]);
        let now = Utc::now();
        assert!(index.touch("a", now));
        assert_eq!(order(&index), vec!["a", "c", "b"]);
        assert_eq!(index.peek("a").unwrap().time_accessed(), now);
        assert_eq!(index.evict_candidate().unwrap().id(), "b");
    }

    #[test]
    fn test_touch_entity_ignores_replaced_session() {
        let mut index = index_of(&["a", "b"]);
        let old = index.peek("a").unwrap();
        index.remove("a");
        let current = detached_session("a");
        index.insert(Arc::clone(&current)).unwrap();
        index.touch("b", Utc::now());

        assert!(!index.touch_entity(&old, Utc::now()));
        assert_eq!(order(&index), vec!["b", "a"]);

        assert!(index.touch_entity(&current, Utc::now()));
        assert_eq!(order(&index), vec!["a", "b"]);
    }

    #[test]
    fn test_touch_missing_is_noop() {
        let mut index = index_of(&["a"]);
        assert!(!index.touch("zzz", Utc::now()));
        assert_eq!(order(&index), vec!["a"]);
    }

    #[test]
    fn test_peek_does_not_reorder() {
        let index = index_of(&["a", "b"]);
        assert!(index.peek("a").is_some());
        assert_eq!(index.evict_candidate().unwrap().id(), "a");
    }

    #[test]
    fn test_remove_keeps_map_and_order_consistent() {
        let mut index = index_of(&["a", "b", "c"]);
        assert!(index.remove("b").is_some());
        assert!(index.remove("b").is_none());
        assert!(!index.contains("b"));
        assert_eq!(order(&index), vec!["c", "a"]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_empty_has_no_candidate() {
        let mut index = RecencyIndex::new();
        assert!(index.evict_candidate().is_none());
        index.insert(detached_session("a")).unwrap();
        index.remove("a");
        assert!(index.evict_candidate().is_none());
        assert!(index.is_empty());
    }
}
