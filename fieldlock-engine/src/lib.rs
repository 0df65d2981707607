//! Pull/push sync engine for fieldlock.
//!
//! Clients hold plaintext locally (`fieldlock-store`); the server only ever
//! holds per-field ciphertext. This crate bridges the two:
//!
//! - **ApiClient**: typed HTTP calls to the sync server
//! - **SyncEngine**: decrypting pulls, encrypting pushes, and the combined
//!   pull-then-push pass
//! - **KeyRotation**: re-encryption of the full dataset under a new key
//!
//! # Sync pass
//!
//! 1. **Pull**: fetch changes since the stored checkpoint, apply record
//!    shells, decrypt and apply field rows (newer versions only), adopt the
//!    server's `sync_timestamp` as the next checkpoint
//! 2. **Push**: for every record with unconfirmed state, create its shell
//!    if needed and submit one batch of dirty fields with expected versions
//! 3. Per-record failures (version conflicts, transport errors) accumulate
//!    in the pass report; the pass never aborts early and never retries
//!
//! # Example
//!
//! ```no_run
//! use fieldlock_crypto::{derive_key, KdfParams};
//! use fieldlock_engine::{ApiClient, SyncEngine};
//! use fieldlock_store::FieldStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let key = derive_key("team passphrase", &KdfParams::default())?;
//! let store = FieldStore::open_in_memory()?;
//! let engine = SyncEngine::new(ApiClient::new("http://localhost:8471"), store, key);
//!
//! if engine.verify_passphrase().await? {
//!     let report = engine.sync().await?;
//!     println!("pushed {} records", report.push.pushed);
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod engine;
mod error;
mod rotation;

pub use client::ApiClient;
pub use engine::{PullStats, PushFailure, PushReport, SyncEngine, SyncReport};
pub use error::{EngineError, EngineResult};
pub use rotation::{KeyRotation, RotationPhase};
