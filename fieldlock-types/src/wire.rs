//! Wire DTOs for the HTTP sync API.
//!
//! Shared by the client engine and the server so the two sides cannot drift.
//! All ciphertext travels as the base64 envelope produced by
//! `fieldlock-crypto`; the server stores and returns it as an opaque string.

use crate::{RecordId, RecordKind};
use serde::{Deserialize, Serialize};

/// One field in a batched write: ciphertext plus the version the client
/// expects the server to hold.
///
/// An expected version of 0 claims the field is a fresh write. The server
/// accepts fresh-write claims unconditionally — this is what lets key
/// rotation re-submit the whole dataset without a round of version
/// negotiation (and is the documented lost-update window of rotation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldWrite {
    pub key: String,
    pub encrypted_value: String,
    pub version: u64,
}

impl FieldWrite {
    pub fn new(key: impl Into<String>, encrypted_value: impl Into<String>, version: u64) -> Self {
        Self {
            key: key.into(),
            encrypted_value: encrypted_value.into(),
            version,
        }
    }
}

/// Body of `PUT /api/records/{kind}/{id}/fields`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldWriteRequest {
    pub fields: Vec<FieldWrite>,
}

/// One confirmed field version in a write response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldVersion {
    pub key: String,
    pub version: u64,
}

/// Success body of a field write: the server-assigned version per field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldWriteResponse {
    pub updated: Vec<FieldVersion>,
}

/// 409 body: every field whose expected version was stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictBody {
    pub message: String,
    pub conflicting_keys: Vec<String>,
}

/// Body of `POST /api/records` — creates the record shell, no fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordCreate {
    pub kind: RecordKind,
    pub id: RecordId,
}

/// A record shell in a pull response (entity metadata, no field content).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRow {
    pub kind: RecordKind,
    pub id: RecordId,
    pub created_at: String,
    pub updated_at: String,
    pub deleted: bool,
}

/// An encrypted field row in a pull response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRow {
    pub kind: RecordKind,
    pub record_id: RecordId,
    pub name: String,
    pub encrypted_value: String,
    pub version: u64,
    pub updated_at: String,
}

/// Body of `GET /api/sync`: everything changed since the checkpoint, plus
/// the server-computed timestamp the client must adopt as its next
/// checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncChanges {
    pub records: Vec<RecordRow>,
    pub fields: Vec<FieldRow>,
    pub sync_timestamp: String,
}

/// Body of the key-verification endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanaryEnvelope {
    pub encrypted_canary: String,
}
