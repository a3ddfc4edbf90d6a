//! Session row storage in SQLite.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use satchel_session::{BackingStore, SecretKey, StoreResult, StoredSession};
use tracing::{debug, info};

use crate::crypto;
use crate::error::{Result, SqliteStoreError};

/// Current schema version.
const SCHEMA_VERSION: i32 = 1;

/// Session store backed by SQLite.
///
/// One connection behind a mutex; WAL mode so readers in other processes
/// are not blocked by a flush.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a store at the given path.
    ///
    /// Creates the parent directory and the schema if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;

        info!("Session store opened at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.initialize()?;

        info!("In-memory session store created");
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::create_schema(&conn)
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version >= SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            return Ok(());
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS session_vals (
                id TEXT PRIMARY KEY,
                create_time TEXT NOT NULL,
                accessed_time TEXT NOT NULL,
                val BLOB
            );

            CREATE INDEX IF NOT EXISTS idx_session_vals_accessed_time
                ON session_vals(accessed_time);
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        info!("Schema created (version {})", SCHEMA_VERSION);
        Ok(())
    }

    /// Number of stored session rows.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM session_vals", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Whether a row exists for `session_id`.
    pub fn contains(&self, session_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM session_vals WHERE id = ?1",
                params![session_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Stored session ids, sorted.
    pub fn session_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM session_vals ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// The raw, still-sealed value column for `session_id`.
    pub fn raw_value(&self, session_id: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let val: Option<Option<Vec<u8>>> = conn
            .query_row(
                "SELECT val FROM session_vals WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(val.flatten())
    }

    fn insert_row(&self, session_id: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock();
        let now = now.to_rfc3339();
        conn.execute(
            "INSERT INTO session_vals (id, create_time, accessed_time, val) VALUES (?1, ?2, ?3, NULL)",
            params![session_id, now, now],
        )?;
        debug!(session_id = %session_id, "Session row inserted");
        Ok(())
    }

    fn select_row(&self, session_id: &str, key: &SecretKey) -> Result<Option<StoredSession>> {
        let row: Option<(String, String, Option<Vec<u8>>)> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT create_time, accessed_time, val FROM session_vals WHERE id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
        };

        let Some((created, accessed, sealed)) = row else {
            return Ok(None);
        };

        let blob = match sealed {
            Some(sealed) if !sealed.is_empty() => crypto::open(key, &sealed)?,
            _ => Vec::new(),
        };

        Ok(Some(StoredSession {
            created_at: parse_time(&created)?,
            accessed_at: parse_time(&accessed)?,
            blob,
        }))
    }

    fn update_row(
        &self,
        session_id: &str,
        blob: &[u8],
        key: &SecretKey,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let sealed = crypto::seal(key, blob)?;
        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE session_vals SET val = ?2, accessed_time = ?3 WHERE id = ?1",
            params![session_id, sealed, now.to_rfc3339()],
        )?;
        if rows == 0 {
            return Err(SqliteStoreError::NotFound(session_id.to_string()));
        }
        debug!(session_id = %session_id, bytes = sealed.len(), "Session row updated");
        Ok(())
    }

    fn delete_row(&self, session_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "DELETE FROM session_vals WHERE id = ?1",
            params![session_id],
        )?;
        debug!(session_id = %session_id, rows, "Session row deleted");
        Ok(())
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SqliteStoreError::InvalidData(format!("bad timestamp '{s}': {e}")))
}

impl BackingStore for SqliteStore {
    fn create(&self, session_id: &str, now: DateTime<Utc>) -> StoreResult<()> {
        Ok(self.insert_row(session_id, now)?)
    }

    fn read_one(&self, session_id: &str, key: &SecretKey) -> StoreResult<Option<StoredSession>> {
        Ok(self.select_row(session_id, key)?)
    }

    fn update(
        &self,
        session_id: &str,
        blob: &[u8],
        key: &SecretKey,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        Ok(self.update_row(session_id, blob, key, now)?)
    }

    fn delete(&self, session_id: &str) -> StoreResult<()> {
        Ok(self.delete_row(session_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use satchel_session::StoreError;

    fn key() -> SecretKey {
        SecretKey::new("test-secret")
    }

    #[test]
    fn test_create_and_read_empty() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        store.create("s1", now).unwrap();

        let row = store.read_one("s1", &key()).unwrap().unwrap();
        assert!(row.blob.is_empty());
        assert_eq!(row.created_at.timestamp_micros(), now.timestamp_micros());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_read_missing() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.read_one("nope", &key()).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_create_is_exists() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create("s1", Utc::now()).unwrap();
        let err = store.create("s1", Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::Exists(_)));
    }

    #[test]
    fn test_update_round_trip_and_sealed_at_rest() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = Utc::now();
        store.create("s1", created).unwrap();
        let later = created + chrono::TimeDelta::seconds(5);
        store.update("s1", b"{\"user\":1}", &key(), later).unwrap();

        let raw = store.raw_value("s1").unwrap().unwrap();
        assert!(!raw.windows(4).any(|w| w == b"user"));

        let row = store.read_one("s1", &key()).unwrap().unwrap();
        assert_eq!(row.blob, b"{\"user\":1}");
        assert_eq!(row.accessed_at.timestamp(), later.timestamp());
        assert_eq!(row.created_at.timestamp(), created.timestamp());
    }

    #[test]
    fn test_wrong_secret_is_integrity_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create("s1", Utc::now()).unwrap();
        store.update("s1", b"data", &key(), Utc::now()).unwrap();

        let err = store
            .read_one("s1", &SecretKey::new("other-secret"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store
            .update("ghost", b"data", &key(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "ghost"));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create("a", Utc::now()).unwrap();
        store.create("b", Utc::now()).unwrap();
        store.delete("a").unwrap();
        store.delete("missing").unwrap();
        assert_eq!(store.session_ids().unwrap(), vec!["b"]);
        assert!(!store.contains("a").unwrap());
        assert!(store.contains("b").unwrap());
    }
}
