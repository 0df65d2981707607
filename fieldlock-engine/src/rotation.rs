//! Key rotation — re-encrypts the whole dataset under a new key.
//!
//! Protocol: full pull under the old key, reset every local version to 0,
//! push everything back under the new key. The version reset makes the
//! server treat the re-push as fresh writes; it has no notion of "the key
//! changed". A third-party write landing between the pull and the push is
//! silently overwritten — a known, accepted race of this protocol.
//!
//! The new key is handed back only after the push phase completes. Any
//! failure leaves the old key active, and rotation is safely retryable from
//! scratch because the full pull is idempotent.

use crate::client::ApiClient;
use crate::engine::SyncEngine;
use crate::error::{EngineError, EngineResult};
use fieldlock_crypto::DerivedKey;
use fieldlock_store::FieldStore;
use tracing::{info, warn};

/// Where a rotation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPhase {
    Idle,
    PullingOld,
    Reencrypting,
    PushingNew,
    Done,
    Failed,
}

/// Drives one key rotation over a store and server.
pub struct KeyRotation {
    api: ApiClient,
    store: FieldStore,
    phase: RotationPhase,
}

impl KeyRotation {
    pub fn new(api: ApiClient, store: FieldStore) -> Self {
        Self {
            api,
            store,
            phase: RotationPhase::Idle,
        }
    }

    pub fn phase(&self) -> RotationPhase {
        self.phase
    }

    /// Rotates from `old_key` to `new_key`. On success the returned key is
    /// the one the caller must persist as active; on error nothing about the
    /// active key changes.
    pub async fn rotate(
        &mut self,
        old_key: DerivedKey,
        new_key: DerivedKey,
    ) -> EngineResult<DerivedKey> {
        let result = self.run(old_key, new_key).await;
        if result.is_err() {
            self.phase = RotationPhase::Failed;
            warn!("key rotation failed; old key remains active");
        }
        result
    }

    async fn run(
        &mut self,
        old_key: DerivedKey,
        new_key: DerivedKey,
    ) -> EngineResult<DerivedKey> {
        self.phase = RotationPhase::PullingOld;
        info!("rotation: full pull under the old key");
        let old_engine = SyncEngine::new(self.api.clone(), self.store.clone(), old_key);
        old_engine.full_pull().await?;

        self.phase = RotationPhase::Reencrypting;
        let reset = self.store.reset_versions_for_rotation()?;
        info!("rotation: reset {reset} fields for fresh push");

        self.phase = RotationPhase::PushingNew;
        let new_engine = SyncEngine::new(self.api.clone(), self.store.clone(), new_key.clone());
        let report = new_engine.push().await?;
        if !report.is_clean() {
            return Err(EngineError::Rotation(format!(
                "{} records failed to re-push",
                report.failures.len()
            )));
        }

        self.phase = RotationPhase::Done;
        info!("rotation: complete, new key is active");
        Ok(new_key)
    }
}
