//! Error types for the sync server.

use thiserror::Error;

/// Result type for server-side store operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server store and API.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record (or canary) not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Create refused because the target already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// At least one field in a batch carried a stale expected version.
    /// Nothing in the batch was written.
    #[error("version conflict on fields: {}", conflicting_keys.join(", "))]
    VersionConflict { conflicting_keys: Vec<String> },

    /// Malformed input (bad timestamp, bad body).
    #[error("invalid data: {0}")]
    InvalidData(String),
}
