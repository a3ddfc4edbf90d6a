//! Server-side session management with encrypted persistence.
//!
//! A [`Manager`] hands out [`Session`]s from a named [`Provider`]. The
//! bundled [`CacheProvider`] keeps live sessions in memory, ordered by
//! recency, and writes their values through a [`BackingStore`] on close.
//! Stale sessions are collected by an explicit [`Manager::gc`] or by a
//! background [`GcTask`].
//!
//! # Example
//!
//! ```rust,ignore
//! use satchel_session::{CacheProvider, Manager, ProviderParams, ProviderRegistry, Value};
//!
//! ProviderRegistry::global().register("sqlite", Arc::new(CacheProvider::new()))?;
//!
//! let params = ProviderParams::new().with_store(store).with_secret("hunter2");
//! let manager = Arc::new(Manager::new("sqlite", lifetime, idle, Some(params))?);
//! let _gc = manager.spawn_gc();
//!
//! let session = manager.start("")?;
//! session.set("user", Value::from("ada"));
//! manager.close(session.session_id())?;
//! ```

pub mod codec;
mod config;
mod error;
mod gc;
mod index;
mod manager;
mod persistence;
mod provider;
mod registry;
mod secret;
mod session;
mod ttl;
mod value;

pub use codec::{Codec, CodecError, TypeRegistry};
pub use config::{DEFAULT_MAX_IDLE, DEFAULT_MAX_LIFETIME, DEFAULT_PROVIDER, GcMode, ManagerConfig};
pub use error::{Error, Result};
pub use gc::GcTask;
pub use index::RecencyIndex;
pub use manager::{Manager, generate_session_id};
pub use persistence::{BackingStore, MemoryStore, StoreError, StoreResult, StoredSession};
pub use provider::{CacheProvider, Provider, ProviderParams, SESSION_ID_LEN};
pub use registry::ProviderRegistry;
pub use secret::SecretKey;
pub use session::{Session, SessionStore};
pub use ttl::Expiry;
pub use value::{CustomValue, Value};
