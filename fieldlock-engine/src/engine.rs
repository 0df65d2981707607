//! Sync engine — pull, push, and the combined sync pass.
//!
//! Pull before push: pulling first updates local versions, so two clients
//! editing different fields of the same record both push cleanly instead of
//! tripping over each other's version bumps.
//!
//! A pass runs sequentially on the calling task and performs no retries —
//! per-record failures land in the pass's report and are retried naturally
//! on the next pass. Callers serialize their own sync invocations; the
//! engine does not guard against running twice concurrently.

use crate::client::ApiClient;
use crate::error::{EngineError, EngineResult};
use fieldlock_crypto::{
    create_canary, decrypt_value, encrypt_value, verify_canary, DerivedKey,
};
use fieldlock_model::Record;
use fieldlock_store::FieldStore;
use fieldlock_types::wire::FieldWrite;
use fieldlock_types::{Checkpoint, RecordKey};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What a pull applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullStats {
    /// Record shells created locally.
    pub records_new: usize,
    /// Record shells that already existed locally.
    pub records_updated: usize,
    /// Field rows that actually applied (stale rows don't count).
    pub fields_applied: usize,
}

/// One record that failed to push. The rest of the pass continued past it.
#[derive(Debug, Clone, Serialize)]
pub struct PushFailure {
    pub record: RecordKey,
    pub error: String,
    /// Field names the server reported as stale (empty for transport
    /// failures).
    pub conflicting_keys: Vec<String>,
}

/// Outcome of a push pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PushReport {
    /// Records whose batches were accepted.
    pub pushed: usize,
    /// Records that failed, with why.
    pub failures: Vec<PushFailure>,
}

impl PushReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of a full sync pass (pull then push).
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub pull: PullStats,
    pub push: PushReport,
}

/// The client sync engine: decrypting pulls, encrypting pushes.
pub struct SyncEngine {
    api: ApiClient,
    store: FieldStore,
    key: DerivedKey,
}

impl SyncEngine {
    /// Creates an engine over an API client, local store and working key.
    pub fn new(api: ApiClient, store: FieldStore, key: DerivedKey) -> Self {
        Self { api, store, key }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &FieldStore {
        &self.store
    }

    // ── Passphrase verification ──────────────────────────────────

    /// Confirms the working key matches the key this server's data was
    /// encrypted under. A server with no canary yet gets one (first client
    /// initializes); losing the initialization race falls back to verifying
    /// the winner's canary.
    pub async fn verify_passphrase(&self) -> EngineResult<bool> {
        match self.api.get_canary().await? {
            Some(blob) => Ok(verify_canary(&self.key, &blob)),
            None => {
                let canary = create_canary(&self.key)?;
                if self.api.put_canary(&canary).await? {
                    info!("initialized server canary");
                    return Ok(true);
                }
                // Raced: someone else initialized between our GET and POST
                match self.api.get_canary().await? {
                    Some(blob) => Ok(verify_canary(&self.key, &blob)),
                    None => Ok(false),
                }
            }
        }
    }

    // ── Pull ─────────────────────────────────────────────────────

    /// Incremental pull from the stored checkpoint (full pull if no
    /// checkpoint exists yet).
    pub async fn pull(&self) -> EngineResult<PullStats> {
        let since = self.store.checkpoint()?;
        self.pull_since(since.as_ref()).await
    }

    /// Full pull of all history, regardless of checkpoint.
    pub async fn full_pull(&self) -> EngineResult<PullStats> {
        self.pull_since(None).await
    }

    async fn pull_since(&self, since: Option<&Checkpoint>) -> EngineResult<PullStats> {
        let changes = self.api.fetch_changes(since).await?;
        let mut stats = PullStats::default();

        // Shells first, so every field row that follows has a parent.
        for row in &changes.records {
            let key = RecordKey::new(row.kind.clone(), row.id.clone());
            if self.store.upsert_remote_shell(&key, row.deleted)? {
                stats.records_new += 1;
            } else {
                stats.records_updated += 1;
            }
        }

        for row in &changes.fields {
            let key = RecordKey::new(row.kind.clone(), row.record_id.clone());
            let value = match decrypt_value(&self.key, &row.encrypted_value) {
                Ok(value) => value,
                Err(e) => {
                    warn!("skipping field {key}#{}: {e}", row.name);
                    continue;
                }
            };
            if self.store.apply_pull(&key, &row.name, value, row.version)? {
                stats.fields_applied += 1;
            }
        }

        // The checkpoint is the server's clock, never ours — adopting the
        // response timestamp means skewed client clocks can't lose updates.
        self.store
            .set_checkpoint(&Checkpoint::new(changes.sync_timestamp))?;

        info!(
            "pull applied {} fields ({} new records, {} updated)",
            stats.fields_applied, stats.records_new, stats.records_updated
        );
        Ok(stats)
    }

    // ── Push ─────────────────────────────────────────────────────

    /// Pushes every record with unconfirmed local state. One record's
    /// conflict or transport failure never blocks another's push.
    pub async fn push(&self) -> EngineResult<PushReport> {
        let mut report = PushReport::default();

        for record in self.store.dirty_records()? {
            let key = record.key.clone();
            match self.push_record(&record).await {
                Ok(()) => report.pushed += 1,
                Err(EngineError::Conflict { conflicting_keys }) => {
                    warn!(
                        "version conflict on {key}: {}",
                        conflicting_keys.join(", ")
                    );
                    report.failures.push(PushFailure {
                        record: key,
                        error: "version conflict".to_string(),
                        conflicting_keys,
                    });
                }
                Err(e) => {
                    warn!("push failed for {key}: {e}");
                    report.failures.push(PushFailure {
                        record: key,
                        error: e.to_string(),
                        conflicting_keys: Vec::new(),
                    });
                }
            }
        }

        info!(
            "push pass complete: {} pushed, {} failed",
            report.pushed,
            report.failures.len()
        );
        Ok(report)
    }

    /// Pushes a single record: shell creation if the server has never seen
    /// it, then one batch of all dirty fields with their expected versions.
    async fn push_record(&self, record: &Record) -> EngineResult<()> {
        if !record.is_synced() {
            self.api.create_record(&record.key).await?;
        }

        let mut fields = Vec::new();
        for (name, field) in &record.fields {
            if !field.is_dirty() {
                continue;
            }
            let encrypted = encrypt_value(&self.key, field.value())?;
            fields.push(FieldWrite::new(name.clone(), encrypted, field.version()));
        }

        if fields.is_empty() {
            // Shell-only record (created but nothing set yet)
            self.store.mark_synced(&record.key)?;
            return Ok(());
        }

        debug!("pushing {} fields for {}", fields.len(), record.key);
        let response = self.api.update_fields(&record.key, fields).await?;

        for updated in &response.updated {
            self.store
                .apply_push_result(&record.key, &updated.key, updated.version)?;
        }
        self.store.mark_synced(&record.key)?;
        Ok(())
    }

    // ── Combined pass ────────────────────────────────────────────

    /// One sync pass: pull first (to refresh versions), then push.
    pub async fn sync(&self) -> EngineResult<SyncReport> {
        let pull = self.pull().await?;
        let push = self.push().await?;
        Ok(SyncReport { pull, push })
    }
}
