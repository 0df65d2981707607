use fieldlock_server::{build_router, ServerStore};
use fieldlock_types::wire::{
    CanaryEnvelope, ConflictBody, FieldWrite, FieldWriteRequest, FieldWriteResponse, RecordCreate,
    SyncChanges,
};
use fieldlock_types::{RecordId, RecordKind};
use std::sync::Arc;

/// Spin up the HTTP server on an OS-assigned port, returning the base URL.
async fn spawn_test_server() -> String {
    let store = Arc::new(ServerStore::open_in_memory().unwrap());
    let app = build_router(store);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

fn record_body(kind: &str, id: &str) -> RecordCreate {
    RecordCreate {
        kind: RecordKind::new(kind),
        id: RecordId::new(id),
    }
}

fn fields_body(fields: Vec<(&str, &str, u64)>) -> FieldWriteRequest {
    FieldWriteRequest {
        fields: fields
            .into_iter()
            .map(|(key, value, version)| FieldWrite::new(key, value, version))
            .collect(),
    }
}

#[tokio::test]
async fn create_record_then_duplicate() {
    let base = spawn_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/records"))
        .json(&record_body("candidate", "c-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("{base}/api/records"))
        .json(&record_body("candidate", "c-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn field_update_roundtrip() {
    let base = spawn_test_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/api/records"))
        .json(&record_body("candidate", "c-1"))
        .send()
        .await
        .unwrap();

    let resp = client
        .put(format!("{base}/api/records/candidate/c-1/fields"))
        .json(&fields_body(vec![("name", "ciphertext", 0)]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: FieldWriteResponse = resp.json().await.unwrap();
    assert_eq!(body.updated.len(), 1);
    assert_eq!(body.updated[0].key, "name");
    assert_eq!(body.updated[0].version, 1);
}

#[tokio::test]
async fn conflict_returns_409_with_keys() {
    let base = spawn_test_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/api/records"))
        .json(&record_body("candidate", "c-1"))
        .send()
        .await
        .unwrap();

    // Both clients saw version 0; A wins, server moves to 1
    let url = format!("{base}/api/records/candidate/c-1/fields");
    client
        .put(&url)
        .json(&fields_body(vec![("name", "from-a", 0)]))
        .send()
        .await
        .unwrap();
    client
        .put(&url)
        .json(&fields_body(vec![("name", "from-a-2", 1)]))
        .send()
        .await
        .unwrap();

    // B still expects version 1 — now stale
    let resp = client
        .put(&url)
        .json(&fields_body(vec![("name", "from-b", 1)]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let body: ConflictBody = resp.json().await.unwrap();
    assert_eq!(body.conflicting_keys, vec!["name"]);
    assert!(body.message.contains("name"));
}

#[tokio::test]
async fn update_fields_unknown_record_404() {
    let base = spawn_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("{base}/api/records/candidate/ghost/fields"))
        .json(&fields_body(vec![("name", "x", 0)]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn sync_full_then_incremental() {
    let base = spawn_test_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/api/records"))
        .json(&record_body("candidate", "c-1"))
        .send()
        .await
        .unwrap();
    client
        .put(format!("{base}/api/records/candidate/c-1/fields"))
        .json(&fields_body(vec![("name", "enc", 0)]))
        .send()
        .await
        .unwrap();

    // Full sync: everything
    let full: SyncChanges = client
        .get(format!("{base}/api/sync"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(full.records.len(), 1);
    assert_eq!(full.fields.len(), 1);

    // Incremental from the returned timestamp: quiet
    let quiet: SyncChanges = client
        .get(format!("{base}/api/sync"))
        .query(&[("since", full.sync_timestamp.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(quiet.records.is_empty());
    assert!(quiet.fields.is_empty());
}

#[tokio::test]
async fn sync_rejects_malformed_since() {
    let base = spawn_test_server().await;
    let resp = reqwest::get(format!("{base}/api/sync?since=yesterday"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn key_verification_lifecycle() {
    let base = spawn_test_server().await;
    let client = reqwest::Client::new();
    let url = format!("{base}/api/key-verification");

    // Not initialized yet
    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    // First write wins
    let resp = client
        .post(&url)
        .json(&CanaryEnvelope {
            encrypted_canary: "canary-blob".to_string(),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Second write refused
    let resp = client
        .post(&url)
        .json(&CanaryEnvelope {
            encrypted_canary: "other-blob".to_string(),
        })
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Read back the original
    let body: CanaryEnvelope = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(body.encrypted_canary, "canary-blob");
}

#[tokio::test]
async fn delete_record_propagates_marker() {
    let base = spawn_test_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/api/records"))
        .json(&record_body("candidate", "c-1"))
        .send()
        .await
        .unwrap();

    let resp = client
        .delete(format!("{base}/api/records/candidate/c-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let full: SyncChanges = client
        .get(format!("{base}/api/sync"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(full.records[0].deleted);
}
