//! Core type definitions for fieldlock.
//!
//! This crate defines the fundamental types shared by the client engine and
//! the server:
//! - Record identifiers (`RecordKind`, `RecordId`, `RecordKey`)
//! - The opaque sync `Checkpoint`
//! - Wire DTOs exchanged over the HTTP sync API
//!
//! Domain-specific record shapes (what fields a "candidate" or "task"
//! carries) do not belong here — records are open-ended maps of named
//! fields, and both sides of the wire are generic over kinds.

mod checkpoint;
mod ids;
pub mod wire;

pub use checkpoint::Checkpoint;
pub use ids::{RecordId, RecordKey, RecordKind};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid record key: {0}")]
    InvalidKey(String),
}
