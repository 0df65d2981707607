use crate::Versioned;
use chrono::{DateTime, Utc};
use fieldlock_types::RecordKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A client-side record: identity, metadata, and a map of named fields.
///
/// Fields are open-ended — a "candidate" carries whatever fields the
/// application sets on it. Each field is an independently versioned,
/// independently synced `Versioned<serde_json::Value>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub key: RecordKey,
    pub fields: BTreeMap<String, Versioned<serde_json::Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last time the server acknowledged this record. `None` means the
    /// server has never seen it, so a push must create the shell first.
    pub last_synced: Option<DateTime<Utc>>,
    pub deleted: bool,
}

impl Record {
    /// Creates a fresh local record with no fields.
    pub fn new(key: RecordKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            fields: BTreeMap::new(),
            created_at: now,
            updated_at: now,
            last_synced: None,
            deleted: false,
        }
    }

    /// Sets a field to a local value, creating it at version 0 if absent.
    pub fn set_field(&mut self, name: impl Into<String>, value: serde_json::Value) {
        let name = name.into();
        match self.fields.get_mut(&name) {
            Some(field) => field.set(value),
            None => {
                self.fields.insert(name, Versioned::local(value));
            }
        }
        self.updated_at = Utc::now();
    }

    pub fn field(&self, name: &str) -> Option<&Versioned<serde_json::Value>> {
        self.fields.get(name)
    }

    /// Names of fields with unconfirmed local edits, in map order.
    pub fn dirty_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, f)| f.is_dirty())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn has_dirty_fields(&self) -> bool {
        self.fields.values().any(Versioned::is_dirty)
    }

    /// Whether the server has ever acknowledged this record.
    pub fn is_synced(&self) -> bool {
        self.last_synced.is_some()
    }
}
