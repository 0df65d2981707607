//! Server-side field store.
//!
//! Stores record shells (metadata only), per-field ciphertext rows, and the
//! key-verification canary. The server never decrypts anything — field
//! values are opaque base64 strings from its point of view.
//!
//! `update_fields` is the heart of the optimistic-concurrency protocol:
//! every field in a batch is validated against its stored version and the
//! whole batch is applied — or rejected — atomically inside one SQLite
//! transaction. A multi-field write is one logical edit; applying half of
//! it would leave a record no client ever intended.

use crate::error::{ServerError, ServerResult};
use chrono::{DateTime, SecondsFormat, Utc};
use fieldlock_types::wire::{FieldRow, FieldVersion, FieldWrite, RecordRow, SyncChanges};
use fieldlock_types::{RecordId, RecordKey, RecordKind};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// SQLite-backed store for encrypted field rows and record metadata.
pub struct ServerStore {
    conn: Arc<Mutex<Connection>>,
}

impl ServerStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: &Path) -> ServerResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> ServerResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> ServerResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                deleted_at TEXT,
                PRIMARY KEY (kind, id)
            );

            CREATE TABLE IF NOT EXISTS fields (
                kind TEXT NOT NULL,
                record_id TEXT NOT NULL,
                name TEXT NOT NULL,
                encrypted_value TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (kind, record_id, name)
            );
            CREATE INDEX IF NOT EXISTS ix_fields_updated ON fields (updated_at);

            CREATE TABLE IF NOT EXISTS key_verification (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                encrypted_canary TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Records ──────────────────────────────────────────────────

    /// Creates a record shell. Fields arrive separately via `update_fields`.
    pub fn create_record(&self, key: &RecordKey) -> ServerResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_text();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO records (kind, id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![key.kind.as_str(), key.id.as_str(), now],
        )?;
        if inserted == 0 {
            return Err(ServerError::AlreadyExists(key.to_string()));
        }
        debug!("created record {key}");
        Ok(())
    }

    pub fn record_exists(&self, key: &RecordKey) -> ServerResult<bool> {
        let conn = self.conn.lock().unwrap();
        exists(&conn, key)
    }

    /// Soft-deletes a record. The delete marker travels through the change
    /// feed like any other metadata update; ciphertext rows stay in place.
    pub fn delete_record(&self, key: &RecordKey) -> ServerResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = now_text();
        let updated = conn.execute(
            "UPDATE records SET deleted = 1, deleted_at = ?3, updated_at = ?3
             WHERE kind = ?1 AND id = ?2",
            params![key.kind.as_str(), key.id.as_str(), now],
        )?;
        if updated == 0 {
            return Err(ServerError::NotFound(key.to_string()));
        }
        Ok(())
    }

    // ── Field batches ────────────────────────────────────────────

    /// Applies one record's field batch with version checking.
    ///
    /// Validate phase first (no writes): every field's expected version is
    /// compared to the stored version (absent = 0). Any mismatch aborts the
    /// entire batch — even its non-conflicting fields — with the full list
    /// of stale keys. An expected version of 0 is a fresh-write claim and
    /// passes validation unconditionally; key rotation depends on this.
    ///
    /// Apply phase: existing fields get the new ciphertext and `version + 1`,
    /// absent fields are inserted at version 1. Both phases run inside a
    /// single transaction, so no other writer can move a version between
    /// validation and commit.
    pub fn update_fields(
        &self,
        key: &RecordKey,
        batch: &[FieldWrite],
    ) -> ServerResult<Vec<FieldVersion>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        if !exists(&tx, key)? {
            return Err(ServerError::NotFound(key.to_string()));
        }

        // Validate phase — no writes yet.
        let mut stored_versions = Vec::with_capacity(batch.len());
        let mut conflicting_keys = Vec::new();
        for field in batch {
            let stored: Option<i64> = tx
                .query_row(
                    "SELECT version FROM fields WHERE kind = ?1 AND record_id = ?2 AND name = ?3",
                    params![key.kind.as_str(), key.id.as_str(), field.key],
                    |row| row.get(0),
                )
                .optional()?;
            let stored = stored.unwrap_or(0) as u64;
            if field.version != 0 && field.version != stored {
                conflicting_keys.push(field.key.clone());
            }
            stored_versions.push(stored);
        }

        if !conflicting_keys.is_empty() {
            // Dropping the transaction rolls back; nothing was written anyway.
            return Err(ServerError::VersionConflict { conflicting_keys });
        }

        // Apply phase — all or nothing.
        let now = now_text();
        let mut updated = Vec::with_capacity(batch.len());
        for (field, stored) in batch.iter().zip(&stored_versions) {
            let new_version = stored + 1;
            tx.execute(
                "INSERT INTO fields (kind, record_id, name, encrypted_value, version, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (kind, record_id, name)
                 DO UPDATE SET encrypted_value = ?4, version = ?5, updated_at = ?6",
                params![
                    key.kind.as_str(),
                    key.id.as_str(),
                    field.key,
                    field.encrypted_value,
                    new_version as i64,
                    now
                ],
            )?;
            updated.push(FieldVersion {
                key: field.key.clone(),
                version: new_version,
            });
        }

        tx.commit()?;
        debug!("updated {} fields for {key}", updated.len());
        Ok(updated)
    }

    /// Current version of one field (absent = none). For inspection/tests.
    pub fn field_version(&self, key: &RecordKey, name: &str) -> ServerResult<Option<u64>> {
        let conn = self.conn.lock().unwrap();
        let version: Option<i64> = conn
            .query_row(
                "SELECT version FROM fields WHERE kind = ?1 AND record_id = ?2 AND name = ?3",
                params![key.kind.as_str(), key.id.as_str(), name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.map(|v| v as u64))
    }

    // ── Change feed ──────────────────────────────────────────────

    /// Everything changed strictly after `since` (all history when `None`),
    /// plus a fresh server-clock `sync_timestamp` for the client to adopt.
    pub fn changes_since(&self, since: Option<&DateTime<Utc>>) -> ServerResult<SyncChanges> {
        let conn = self.conn.lock().unwrap();
        let cutoff = since.map(ts_to_text);

        let mut records = Vec::new();
        {
            let (sql, bind): (&str, Vec<String>) = match &cutoff {
                Some(ts) => (
                    "SELECT kind, id, created_at, updated_at, deleted FROM records
                     WHERE created_at > ?1 OR updated_at > ?1 ORDER BY kind, id",
                    vec![ts.clone()],
                ),
                None => (
                    "SELECT kind, id, created_at, updated_at, deleted FROM records ORDER BY kind, id",
                    Vec::new(),
                ),
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(bind.iter()), |row| {
                Ok(RecordRow {
                    kind: RecordKind::new(row.get::<_, String>(0)?),
                    id: RecordId::new(row.get::<_, String>(1)?),
                    created_at: row.get(2)?,
                    updated_at: row.get(3)?,
                    deleted: row.get(4)?,
                })
            })?;
            for row in rows {
                records.push(row?);
            }
        }

        let mut fields = Vec::new();
        {
            let (sql, bind): (&str, Vec<String>) = match &cutoff {
                Some(ts) => (
                    "SELECT kind, record_id, name, encrypted_value, version, updated_at
                     FROM fields WHERE updated_at > ?1 ORDER BY kind, record_id, name",
                    vec![ts.clone()],
                ),
                None => (
                    "SELECT kind, record_id, name, encrypted_value, version, updated_at
                     FROM fields ORDER BY kind, record_id, name",
                    Vec::new(),
                ),
            };
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(bind.iter()), |row| {
                Ok(FieldRow {
                    kind: RecordKind::new(row.get::<_, String>(0)?),
                    record_id: RecordId::new(row.get::<_, String>(1)?),
                    name: row.get(2)?,
                    encrypted_value: row.get(3)?,
                    version: row.get::<_, i64>(4)? as u64,
                    updated_at: row.get(5)?,
                })
            })?;
            for row in rows {
                fields.push(row?);
            }
        }

        Ok(SyncChanges {
            records,
            fields,
            sync_timestamp: now_text(),
        })
    }

    // ── Key verification ─────────────────────────────────────────

    /// The stored canary, if one was ever initialized.
    pub fn canary(&self) -> ServerResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let canary = conn
            .query_row(
                "SELECT encrypted_canary FROM key_verification WHERE id = 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(canary)
    }

    /// Stores the canary, first write only.
    pub fn init_canary(&self, encrypted_canary: &str) -> ServerResult<()> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO key_verification (id, encrypted_canary, created_at)
             VALUES (1, ?1, ?2)",
            params![encrypted_canary, now_text()],
        )?;
        if inserted == 0 {
            return Err(ServerError::AlreadyExists("key verification".to_string()));
        }
        Ok(())
    }
}

fn exists(conn: &Connection, key: &RecordKey) -> ServerResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM records WHERE kind = ?1 AND id = ?2",
            params![key.kind.as_str(), key.id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// RFC3339 with fixed microsecond precision — lexicographic order on these
/// strings is chronological order, which the feed queries rely on.
fn ts_to_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now_text() -> String {
    ts_to_text(&Utc::now())
}
