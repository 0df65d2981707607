//! fieldlock sync server.
//!
//! Stores per-field authenticated ciphertext with optimistic versioning and
//! serves the pull/push HTTP API. The server never holds a key and never
//! sees plaintext — confidentiality lives entirely client-side; the server
//! contributes availability, the change feed, and conflict detection.

mod api;
mod error;
mod store;

pub use api::build_router;
pub use error::{ServerError, ServerResult};
pub use store::ServerStore;
