//! HTTP client for the fieldlock sync API.
//!
//! A thin typed wrapper over reqwest: one method per endpoint, status codes
//! mapped into `EngineError`. Ciphertext passes through untouched — the
//! engine encrypts before calling and decrypts after.

use crate::error::{EngineError, EngineResult};
use fieldlock_types::wire::{
    CanaryEnvelope, ConflictBody, FieldWrite, FieldWriteRequest, FieldWriteResponse,
    RecordCreate, SyncChanges,
};
use fieldlock_types::{Checkpoint, RecordKey};
use reqwest::{Client, StatusCode};
use tracing::debug;

/// Typed client for the sync server's HTTP API.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a client for the given base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetches the stored canary, or `None` if the server has none yet.
    pub async fn get_canary(&self) -> EngineResult<Option<String>> {
        let url = format!("{}/api/key-verification", self.base_url);
        let resp = self.client.get(&url).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: CanaryEnvelope = error_for_status(resp).await?.json().await?;
        Ok(Some(body.encrypted_canary))
    }

    /// Stores the canary. Returns false if the server already has one
    /// (first write wins; somebody else initialized concurrently).
    pub async fn put_canary(&self, encrypted_canary: &str) -> EngineResult<bool> {
        let url = format!("{}/api/key-verification", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&CanaryEnvelope {
                encrypted_canary: encrypted_canary.to_string(),
            })
            .send()
            .await?;

        if resp.status() == StatusCode::BAD_REQUEST {
            return Ok(false);
        }
        error_for_status(resp).await?;
        Ok(true)
    }

    /// Fetches everything changed since the checkpoint; omitting it asks for
    /// the full history.
    pub async fn fetch_changes(&self, since: Option<&Checkpoint>) -> EngineResult<SyncChanges> {
        let url = format!("{}/api/sync", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(checkpoint) = since {
            request = request.query(&[("since", checkpoint.as_str())]);
        }
        let resp = error_for_status(request.send().await?).await?;
        Ok(resp.json().await?)
    }

    /// Creates the record shell server-side. A shell that already exists is
    /// success — another client got there first, which is all the same to a
    /// push that only needs the shell to exist.
    pub async fn create_record(&self, key: &RecordKey) -> EngineResult<()> {
        let url = format!("{}/api/records", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&RecordCreate {
                kind: key.kind.clone(),
                id: key.id.clone(),
            })
            .send()
            .await?;

        if resp.status() == StatusCode::BAD_REQUEST {
            debug!("record {key} already exists server-side, continuing");
            return Ok(());
        }
        error_for_status(resp).await?;
        Ok(())
    }

    /// Submits one record's field batch. A 409 is surfaced as
    /// `EngineError::Conflict` carrying every stale key.
    pub async fn update_fields(
        &self,
        key: &RecordKey,
        fields: Vec<FieldWrite>,
    ) -> EngineResult<FieldWriteResponse> {
        let url = format!("{}/fields", self.record_url(key));
        let resp = self
            .client
            .put(&url)
            .json(&FieldWriteRequest { fields })
            .send()
            .await?;

        if resp.status() == StatusCode::CONFLICT {
            let body: ConflictBody = resp.json().await?;
            return Err(EngineError::Conflict {
                conflicting_keys: body.conflicting_keys,
            });
        }
        let resp = error_for_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Soft-deletes a record server-side.
    pub async fn delete_record(&self, key: &RecordKey) -> EngineResult<()> {
        let resp = self.client.delete(self.record_url(key)).send().await?;
        error_for_status(resp).await?;
        Ok(())
    }

    /// Record ids are free-form strings and may contain '/', so both path
    /// segments are percent-encoded.
    fn record_url(&self, key: &RecordKey) -> String {
        format!(
            "{}/api/records/{}/{}",
            self.base_url,
            urlencoding::encode(key.kind.as_str()),
            urlencoding::encode(key.id.as_str())
        )
    }
}

/// Converts non-2xx responses into `EngineError::Api` with the body text.
async fn error_for_status(resp: reqwest::Response) -> EngineResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(EngineError::Api {
        status: status.as_u16(),
        message,
    })
}
