//! SQLite backing store for satchel sessions.
//!
//! Each session is one row in `session_vals`, keyed by session id. The value
//! blob is sealed with AES-256-GCM under the provider's secret before it is
//! written, so the database file never holds session values in the clear.
//!
//! ```text
//! session_vals
//! ┌──────────────┬─────────────┬───────────────┬──────────────────────────┐
//! │ id (PK)      │ create_time │ accessed_time │ val                      │
//! │ TEXT         │ TEXT        │ TEXT          │ BLOB nonce || ciphertext │
//! └──────────────┴─────────────┴───────────────┴──────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use satchel_session::{BackingStore, ProviderParams};
//! use satchel_sqlite::SqliteStore;
//!
//! let store = SqliteStore::open("sessions.db")?;
//! let params = ProviderParams::new()
//!     .with_store(Arc::new(store) as Arc<dyn BackingStore>)
//!     .with_secret("hunter2");
//! # Ok::<(), satchel_sqlite::SqliteStoreError>(())
//! ```

mod crypto;
mod error;
mod store;

pub use error::{Result, SqliteStoreError};
pub use store::SqliteStore;
