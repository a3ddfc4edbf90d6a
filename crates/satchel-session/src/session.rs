//! Live session entities and the accessor interface handed to callers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::error::Result;
use crate::index::RecencyIndex;
use crate::provider::Backend;
use crate::ttl::Expiry;
use crate::value::Value;

/// Accessors available on a started session.
///
/// Reads and writes act on memory only. Nothing reaches the backing store
/// until [`Session::flush`] is called, directly or through a provider close.
pub trait Session: Send + Sync + fmt::Debug {
    /// Store `value` under `key`, marking the session dirty if it changed.
    fn set(&self, key: &str, value: Value);

    /// The raw value under `key`.
    fn get(&self, key: &str) -> Option<Value>;

    /// Remove `key`, returning the previous value.
    fn delete(&self, key: &str) -> Option<Value>;

    fn session_id(&self) -> &str;

    /// Write the values back to the store if they changed since the last
    /// successful flush.
    fn flush(&self) -> Result<()>;

    fn time_created(&self) -> DateTime<Utc>;

    fn time_accessed(&self) -> DateTime<Utc>;

    /// Whether unflushed changes exist.
    fn is_dirty(&self) -> bool;

    /// Sorted snapshot of keys. Does not count as an access.
    fn keys(&self) -> Vec<String>;

    /// `false` unless `key` holds a bool.
    fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Empty unless `key` holds a string or bytes.
    fn get_string(&self, key: &str) -> String {
        self.get(key).and_then(|v| v.as_string()).unwrap_or_default()
    }

    /// `0` unless `key` holds an integer of either width.
    fn get_int(&self, key: &str) -> i64 {
        self.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    /// `0.0` unless `key` holds a float of either width.
    fn get_float(&self, key: &str) -> f64 {
        self.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    fn get_time(&self, key: &str) -> Option<DateTime<Utc>> {
        self.get(key).and_then(|v| v.as_time())
    }
}

impl dyn Session {
    /// Clone out a registered application value of type `T`.
    pub fn get_as<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        self.get(key)?.downcast_ref::<T>().cloned()
    }
}

/// Values and dirty flag, guarded together by the entity lock.
#[derive(Debug, Default)]
struct SessionState {
    values: HashMap<String, Value>,
    dirty: bool,
}

/// In-memory state of one live session.
///
/// Lock order: the provider's index lock may be taken before this entity's
/// lock, never after. Accessors therefore release the entity lock before
/// touching the index. The access timestamp has its own leaf lock.
pub struct SessionStore {
    id: String,
    created_at: DateTime<Utc>,
    accessed_at: Mutex<DateTime<Utc>>,
    state: RwLock<SessionState>,
    backend: Arc<Backend>,
    index: Weak<Mutex<RecencyIndex>>,
}

impl SessionStore {
    pub(crate) fn new(
        id: &str,
        created_at: DateTime<Utc>,
        accessed_at: DateTime<Utc>,
        values: HashMap<String, Value>,
        backend: Arc<Backend>,
        index: Weak<Mutex<RecencyIndex>>,
    ) -> Self {
        Self {
            id: id.to_string(),
            created_at,
            accessed_at: Mutex::new(accessed_at),
            state: RwLock::new(SessionState {
                values,
                dirty: false,
            }),
            backend,
            index,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn mark_accessed(&self, now: DateTime<Utc>) {
        *self.accessed_at.lock() = now;
    }

    /// Number of keys currently held.
    pub fn len(&self) -> usize {
        self.state.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().values.is_empty()
    }

    pub(crate) fn is_expired(&self, expiry: &Expiry, now: DateTime<Utc>) -> bool {
        expiry.is_expired(self.created_at, *self.accessed_at.lock(), now)
    }

    /// Move this session to the fresh end of the owning index.
    ///
    /// Must be called with the entity lock released.
    fn touch(&self) {
        if let Some(index) = self.index.upgrade() {
            index.lock().touch_entity(self, Utc::now());
        }
    }
}

impl Session for SessionStore {
    fn set(&self, key: &str, value: Value) {
        {
            let mut state = self.state.write();
            if state.values.get(key) != Some(&value) {
                state.values.insert(key.to_string(), value);
                state.dirty = true;
            }
        }
        self.touch();
    }

    fn get(&self, key: &str) -> Option<Value> {
        let value = self.state.read().values.get(key).cloned();
        self.touch();
        value
    }

    fn delete(&self, key: &str) -> Option<Value> {
        let removed = {
            let mut state = self.state.write();
            let removed = state.values.remove(key);
            if removed.is_some() {
                state.dirty = true;
            }
            removed
        };
        self.touch();
        removed
    }

    fn session_id(&self) -> &str {
        &self.id
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.write();
        if !state.dirty {
            trace!(session_id = %self.id, "Flush skipped, session clean");
            return Ok(());
        }

        let blob = self.backend.codec.encode(&state.values)?;
        self.backend
            .store
            .update(&self.id, &blob, &self.backend.key, Utc::now())?;
        state.dirty = false;

        debug!(session_id = %self.id, bytes = blob.len(), "Session flushed");
        Ok(())
    }

    fn time_created(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn time_accessed(&self) -> DateTime<Utc> {
        *self.accessed_at.lock()
    }

    fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.state.read().values.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("accessed_at", &*self.accessed_at.lock())
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::thread;

    use crate::codec::Codec;
    use crate::persistence::{BackingStore, MemoryStore};
    use crate::secret::SecretKey;

    fn backend_with(store: Arc<MemoryStore>) -> Arc<Backend> {
        Arc::new(Backend {
            store,
            key: SecretKey::new("test"),
            codec: Codec::primitives(),
        })
    }

    /// A session with a throwaway store and no owning index.
    pub(crate) fn detached_session(id: &str) -> Arc<SessionStore> {
        let now = Utc::now();
        Arc::new(SessionStore::new(
            id,
            now,
            now,
            HashMap::new(),
            backend_with(Arc::new(MemoryStore::new())),
            Weak::new(),
        ))
    }

    fn stored_session(id: &str) -> (Arc<SessionStore>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        store.create(id, now).unwrap();
        let session = Arc::new(SessionStore::new(
            id,
            now,
            now,
            HashMap::new(),
            backend_with(Arc::clone(&store)),
            Weak::new(),
        ));
        (session, store)
    }

    #[test]
    fn test_set_marks_dirty() {
        let session = detached_session("s");
        assert!(!session.is_dirty());
        session.set("k", Value::from(1));
        assert!(session.is_dirty());
        assert_eq!(session.get("k"), Some(Value::Int(1)));
    }

    #[test]
    fn test_set_nan_twice_keeps_clean() {
        let (session, _store) = stored_session("s");
        session.set("ratio", Value::Float(f64::NAN));
        session.flush().unwrap();
        session.set("ratio", Value::Float(f64::NAN));
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_set_equal_value_keeps_clean() {
        let (session, _store) = stored_session("s");
        session.set("k", Value::from("v"));
        session.flush().unwrap();
        session.set("k", Value::from("v"));
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_typed_getters_zero_values() {
        let session = detached_session("s");
        session.set("text", Value::from("hello"));
        assert!(!session.get_bool("missing"));
        assert_eq!(session.get_string("missing"), "");
        assert_eq!(session.get_int("missing"), 0);
        assert_eq!(session.get_float("missing"), 0.0);
        assert_eq!(session.get_int("text"), 0);
        assert!(!session.get_bool("text"));
        assert!(session.get_time("text").is_none());
    }

    #[test]
    fn test_typed_getters_coerce() {
        let session = detached_session("s");
        session.set("i64", Value::Int(7));
        session.set("isize", Value::Isize(7));
        session.set("f32", Value::Float32(0.5));
        session.set("bytes", Value::Bytes(b"raw".to_vec()));
        session.set("flag", Value::Bool(true));
        assert_eq!(session.get_int("i64"), session.get_int("isize"));
        assert_eq!(session.get_float("f32"), 0.5);
        assert_eq!(session.get_string("bytes"), "raw");
        assert!(session.get_bool("flag"));
    }

    #[test]
    fn test_get_as_custom() {
        #[derive(Debug, Clone, PartialEq)]
        struct Basket(Vec<u32>);

        let session: Arc<dyn Session> = detached_session("s");
        session.set("basket", Value::custom(Basket(vec![1, 2])));
        assert_eq!(session.get_as::<Basket>("basket"), Some(Basket(vec![1, 2])));
        assert_eq!(session.get_as::<String>("basket"), None);
    }

    #[test]
    fn test_delete_marks_dirty_only_when_present() {
        let (session, _store) = stored_session("s");
        assert!(session.delete("missing").is_none());
        assert!(!session.is_dirty());

        session.set("k", Value::from(true));
        session.flush().unwrap();
        assert_eq!(session.delete("k"), Some(Value::Bool(true)));
        assert!(session.is_dirty());
    }

    #[test]
    fn test_keys_sorted() {
        let session = detached_session("s");
        session.set("b", Value::from(2));
        session.set("a", Value::from(1));
        assert_eq!(session.keys(), vec!["a", "b"]);
    }

    #[test]
    fn test_flush_twice_writes_once() {
        let (session, store) = stored_session("s");
        session.set("k", Value::from(1.25));
        session.flush().unwrap();
        session.flush().unwrap();
        assert_eq!(store.update_count(), 1);
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_failed_flush_stays_dirty() {
        let (session, store) = stored_session("s");
        session.set("k", Value::from(1));
        store.fail_next_update();
        assert!(session.flush().is_err());
        assert!(session.is_dirty());

        session.flush().unwrap();
        assert!(!session.is_dirty());
        assert_eq!(store.update_count(), 1);
    }

    #[test]
    fn test_flush_encode_error_stays_dirty() {
        #[derive(Debug, PartialEq)]
        struct NotRegistered;

        let (session, store) = stored_session("s");
        session.set("k", Value::custom(NotRegistered));
        assert!(session.flush().is_err());
        assert!(session.is_dirty());
        assert_eq!(store.update_count(), 0);
    }

    #[test]
    fn test_concurrent_sets_on_one_key() {
        let session = detached_session("s");
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let session = Arc::clone(&session);
                thread::spawn(move || session.set("k", Value::Int(i)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let survivor = session.get_int("k");
        assert!((0..16).contains(&survivor));
        assert!(session.is_dirty());
        assert_eq!(session.len(), 1);
    }
}
