//! SQLite-backed local field store.
//!
//! Holds the client's plaintext copy of every record: shells in `records`,
//! the `{value, version, dirty}` triple per field in `fields`, and the sync
//! checkpoint in `sync_meta`. All mutations that touch a triple go through
//! `Versioned`, so the store cannot express a state the model forbids.
//!
//! Timestamps in this store are local-clock bookkeeping (creation times, the
//! acknowledged marker). The sync checkpoint is the one skew-sensitive datum
//! and it is stored verbatim as issued by the server.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use fieldlock_model::{Record, Versioned};
use fieldlock_types::{Checkpoint, RecordKey};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

const CHECKPOINT_KEY: &str = "checkpoint";

/// Client-local store for records, fields and the sync checkpoint.
#[derive(Clone)]
pub struct FieldStore {
    conn: Arc<Mutex<Connection>>,
}

impl FieldStore {
    /// Opens (or creates) a field store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory field store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_synced TEXT,
                deleted INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (kind, id)
            );

            CREATE TABLE IF NOT EXISTS fields (
                kind TEXT NOT NULL,
                record_id TEXT NOT NULL,
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                dirty INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (kind, record_id, name)
            );

            CREATE TABLE IF NOT EXISTS sync_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Records ──────────────────────────────────────────────────

    /// Inserts a record shell if absent. Shells created here are local-only
    /// (`last_synced` unset) until a push or pull acknowledges them.
    pub fn ensure_record(&self, key: &RecordKey) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = ts_to_text(&Utc::now());
        conn.execute(
            "INSERT OR IGNORE INTO records (kind, id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![key.kind.as_str(), key.id.as_str(), now],
        )?;
        Ok(())
    }

    /// Upserts a record shell from a pull. Returns true if the shell was new
    /// locally. Pulled shells are acknowledged by definition.
    pub fn upsert_remote_shell(&self, key: &RecordKey, deleted: bool) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let now = ts_to_text(&Utc::now());
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO records (kind, id, created_at, updated_at, last_synced, deleted)
             VALUES (?1, ?2, ?3, ?3, ?3, ?4)",
            params![key.kind.as_str(), key.id.as_str(), now, deleted],
        )?;
        if inserted == 0 {
            conn.execute(
                "UPDATE records SET last_synced = ?3, deleted = ?4 WHERE kind = ?1 AND id = ?2",
                params![key.kind.as_str(), key.id.as_str(), now, deleted],
            )?;
        }
        Ok(inserted > 0)
    }

    /// Marks a record as acknowledged by the server.
    pub fn mark_synced(&self, key: &RecordKey) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = ts_to_text(&Utc::now());
        let updated = conn.execute(
            "UPDATE records SET last_synced = ?3 WHERE kind = ?1 AND id = ?2",
            params![key.kind.as_str(), key.id.as_str(), now],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(())
    }

    /// Soft-deletes a record locally. Fields are kept — only the owning
    /// record carries a delete marker, fields are never deleted one by one.
    pub fn mark_deleted(&self, key: &RecordKey) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = ts_to_text(&Utc::now());
        let updated = conn.execute(
            "UPDATE records SET deleted = 1, updated_at = ?3 WHERE kind = ?1 AND id = ?2",
            params![key.kind.as_str(), key.id.as_str(), now],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(())
    }

    /// Loads a record with all its fields.
    pub fn get_record(&self, key: &RecordKey) -> StoreResult<Option<Record>> {
        let conn = self.conn.lock().unwrap();
        let shell = conn
            .query_row(
                "SELECT created_at, updated_at, last_synced, deleted
                 FROM records WHERE kind = ?1 AND id = ?2",
                params![key.kind.as_str(), key.id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((created_at, updated_at, last_synced, deleted)) = shell else {
            return Ok(None);
        };

        let mut record = Record::new(key.clone());
        record.created_at = ts_from_text(&created_at)?;
        record.updated_at = ts_from_text(&updated_at)?;
        record.last_synced = match last_synced {
            Some(ts) => Some(ts_from_text(&ts)?),
            None => None,
        };
        record.deleted = deleted;
        record.fields = load_fields(&conn, key)?;
        Ok(Some(record))
    }

    /// Loads every record in the store.
    pub fn list_records(&self) -> StoreResult<Vec<Record>> {
        let keys = self.record_keys("SELECT kind, id FROM records ORDER BY kind, id")?;
        keys.iter()
            .map(|key| {
                self.get_record(key)?
                    .ok_or_else(|| StoreError::NotFound(key.to_string()))
            })
            .collect()
    }

    /// Records that need a push: at least one dirty field, or never
    /// acknowledged by the server.
    pub fn dirty_records(&self) -> StoreResult<Vec<Record>> {
        let keys = self.record_keys(
            "SELECT DISTINCT r.kind, r.id FROM records r
             LEFT JOIN fields f ON f.kind = r.kind AND f.record_id = r.id AND f.dirty = 1
             WHERE f.name IS NOT NULL OR r.last_synced IS NULL
             ORDER BY r.kind, r.id",
        )?;
        keys.iter()
            .map(|key| {
                self.get_record(key)?
                    .ok_or_else(|| StoreError::NotFound(key.to_string()))
            })
            .collect()
    }

    fn record_keys(&self, sql: &str) -> StoreResult<Vec<RecordKey>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut keys = Vec::new();
        for row in rows {
            let (kind, id) = row?;
            keys.push(RecordKey::new(kind.as_str(), id.as_str()));
        }
        Ok(keys)
    }

    // ── Fields ───────────────────────────────────────────────────

    /// Sets a field to a local value: value overwritten, dirty set, version
    /// untouched. The field (and its record shell) is created implicitly on
    /// first set.
    pub fn set_field(
        &self,
        key: &RecordKey,
        name: &str,
        value: &serde_json::Value,
    ) -> StoreResult<()> {
        self.ensure_record(key)?;
        let conn = self.conn.lock().unwrap();
        let json = serde_json::to_string(value)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO fields (kind, record_id, name, value, version, dirty)
             VALUES (?1, ?2, ?3, ?4, 0, 1)",
            params![key.kind.as_str(), key.id.as_str(), name, json],
        )?;
        if inserted == 0 {
            conn.execute(
                "UPDATE fields SET value = ?4, dirty = 1
                 WHERE kind = ?1 AND record_id = ?2 AND name = ?3",
                params![key.kind.as_str(), key.id.as_str(), name, json],
            )?;
        }
        let now = ts_to_text(&Utc::now());
        conn.execute(
            "UPDATE records SET updated_at = ?3 WHERE kind = ?1 AND id = ?2",
            params![key.kind.as_str(), key.id.as_str(), now],
        )?;
        Ok(())
    }

    /// Records a server-confirmed push: version adopted, dirty cleared.
    pub fn apply_push_result(
        &self,
        key: &RecordKey,
        name: &str,
        new_version: u64,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE fields SET version = ?4, dirty = 0
             WHERE kind = ?1 AND record_id = ?2 AND name = ?3",
            params![key.kind.as_str(), key.id.as_str(), name, new_version as i64],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("{key}#{name}")));
        }
        Ok(())
    }

    /// Applies a pulled field. Returns whether it applied (strictly newer
    /// versions only; stale pulls are a no-op, which makes pulls idempotent).
    pub fn apply_pull(
        &self,
        key: &RecordKey,
        name: &str,
        value: serde_json::Value,
        version: u64,
    ) -> StoreResult<bool> {
        self.ensure_record(key)?;
        let conn = self.conn.lock().unwrap();
        let existing = conn
            .query_row(
                "SELECT value, version, dirty FROM fields
                 WHERE kind = ?1 AND record_id = ?2 AND name = ?3",
                params![key.kind.as_str(), key.id.as_str(), name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()?;

        let mut field = match existing {
            Some((json, stored_version, dirty)) => Versioned::from_parts(
                serde_json::from_str(&json)?,
                stored_version as u64,
                dirty,
            ),
            None => {
                // Field unknown locally — an incoming version of 1+ always
                // beats the implicit version 0.
                Versioned::from_parts(serde_json::Value::Null, 0, false)
            }
        };

        if !field.apply_pull(value, version) {
            return Ok(false);
        }

        let json = serde_json::to_string(field.value())?;
        conn.execute(
            "INSERT INTO fields (kind, record_id, name, value, version, dirty)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)
             ON CONFLICT (kind, record_id, name)
             DO UPDATE SET value = ?4, version = ?5, dirty = 0",
            params![
                key.kind.as_str(),
                key.id.as_str(),
                name,
                json,
                field.version() as i64
            ],
        )?;
        Ok(true)
    }

    /// Resets every field for key rotation: version 0, dirty set. The next
    /// push then carries the entire dataset as fresh writes.
    pub fn reset_versions_for_rotation(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("UPDATE fields SET version = 0, dirty = 1", [])?;
        Ok(changed)
    }

    // ── Checkpoint ───────────────────────────────────────────────

    /// The stored sync checkpoint, if any pull has completed yet.
    pub fn checkpoint(&self) -> StoreResult<Option<Checkpoint>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = ?1",
                params![CHECKPOINT_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value.map(Checkpoint::new))
    }

    /// Stores the server-issued checkpoint verbatim.
    pub fn set_checkpoint(&self, checkpoint: &Checkpoint) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sync_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = ?2",
            params![CHECKPOINT_KEY, checkpoint.as_str()],
        )?;
        Ok(())
    }
}

fn load_fields(
    conn: &Connection,
    key: &RecordKey,
) -> StoreResult<BTreeMap<String, Versioned<serde_json::Value>>> {
    let mut stmt = conn.prepare(
        "SELECT name, value, version, dirty FROM fields
         WHERE kind = ?1 AND record_id = ?2",
    )?;
    let rows = stmt.query_map(params![key.kind.as_str(), key.id.as_str()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, bool>(3)?,
        ))
    })?;

    let mut fields = BTreeMap::new();
    for row in rows {
        let (name, json, version, dirty) = row?;
        let value: serde_json::Value = serde_json::from_str(&json)?;
        fields.insert(name, Versioned::from_parts(value, version as u64, dirty));
    }
    Ok(fields)
}

fn ts_to_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn ts_from_text(text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("bad timestamp '{text}': {e}")))
}
