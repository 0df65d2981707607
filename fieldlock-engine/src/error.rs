//! Error types for the sync engine.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport-level failure (connection, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an unexpected status.
    #[error("server error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The server rejected a field batch because of stale versions.
    #[error("version conflict on fields: {}", conflicting_keys.join(", "))]
    Conflict { conflicting_keys: Vec<String> },

    /// Encryption or decryption failed.
    #[error(transparent)]
    Crypto(#[from] fieldlock_crypto::CryptoError),

    /// Local store failure.
    #[error(transparent)]
    Store(#[from] fieldlock_store::StoreError),

    /// Key rotation aborted; the old key remains active.
    #[error("key rotation failed: {0}")]
    Rotation(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
