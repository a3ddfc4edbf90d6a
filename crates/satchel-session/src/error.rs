//! Error types for session management.

use crate::codec::CodecError;
use crate::persistence::StoreError;

/// Error type for session lifecycle and accessor operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No provider is registered under the requested name.
    #[error("Unknown session provider: {0}")]
    UnknownProvider(String),

    /// A provider with the same name is already registered.
    #[error("Session provider registered twice: {0}")]
    DuplicateProvider(String),

    /// Provider initialization parameters are missing or unusable.
    #[error("Invalid provider parameters: {0}")]
    InvalidParams(String),

    /// The provider was used before a backing store was supplied.
    #[error("Provider not initialized")]
    NotInitialized,

    /// The session id is longer than the backend accepts.
    #[error("Session id length {len} exceeds maximum of {max}")]
    IdTooLong { len: usize, max: usize },

    /// A live session with this id is already indexed.
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    /// The randomness source failed while generating a session id.
    #[error("Failed to generate session id")]
    IdGeneration,

    /// Encoding or decoding of session values failed.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The persistent backing store reported an error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;
