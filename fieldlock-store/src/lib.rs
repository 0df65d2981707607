//! Client-local persistence for fieldlock.
//!
//! A small SQLite store holding the plaintext side of sync: record shells,
//! per-field `{value, version, dirty}` triples, and the server-issued
//! checkpoint. The server-side ciphertext store lives in `fieldlock-server`;
//! this crate never sees ciphertext.

mod error;
mod field_store;

pub use error::{StoreError, StoreResult};
pub use field_store::FieldStore;
