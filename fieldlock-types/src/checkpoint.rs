//! The sync checkpoint.
//!
//! An opaque "synced up to here" token. The only source of a checkpoint is
//! the `sync_timestamp` of a server pull response; clients store it and echo
//! it back verbatim on the next pull. It is deliberately not a parsed
//! timestamp on the client side — deriving one from the client clock would
//! reintroduce the clock-skew bugs the server-issued token exists to avoid.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque server-issued sync position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(String);

impl Checkpoint {
    /// Wraps a server-issued `sync_timestamp`.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checkpoint {
    fn from(s: String) -> Self {
        Self(s)
    }
}
