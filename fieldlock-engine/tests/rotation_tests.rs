//! Key rotation against the real server: full pull under the old key,
//! forced re-push under the new key, clean failure behavior.

use fieldlock_crypto::{derive_key, DerivedKey, KdfParams};
use fieldlock_engine::{ApiClient, KeyRotation, RotationPhase, SyncEngine};
use fieldlock_server::{build_router, ServerStore};
use fieldlock_store::FieldStore;
use fieldlock_types::RecordKey;
use serde_json::json;
use std::sync::Arc;

async fn spawn_server() -> (String, Arc<ServerStore>) {
    let store = Arc::new(ServerStore::open_in_memory().unwrap());
    let app = build_router(store.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://127.0.0.1:{}", port), store)
}

fn key(passphrase: &str) -> DerivedKey {
    derive_key(passphrase, &KdfParams::test()).unwrap()
}

fn engine(base: &str, store: FieldStore, passphrase: &str) -> SyncEngine {
    SyncEngine::new(ApiClient::new(base), store, key(passphrase))
}

#[tokio::test]
async fn rotation_reencrypts_the_full_dataset() {
    let (base, server_store) = spawn_server().await;
    let cand = RecordKey::new("candidate", "c-1");
    let task = RecordKey::new("task", "c-1/screening");

    // Seed data under the old key
    let alice_store = FieldStore::open_in_memory().unwrap();
    let alice = engine(&base, alice_store.clone(), "old passphrase");
    alice.store().set_field(&cand, "name", &json!("Ada")).unwrap();
    alice
        .store()
        .set_field(&cand, "email", &json!("ada@example.com"))
        .unwrap();
    alice.store().set_field(&task, "status", &json!("done")).unwrap();
    assert!(alice.push().await.unwrap().is_clean());

    // Rotate on a fresh store, as a recovering client would
    let rotation_store = FieldStore::open_in_memory().unwrap();
    let mut rotation = KeyRotation::new(ApiClient::new(&base), rotation_store);
    let active = rotation
        .rotate(key("old passphrase"), key("new passphrase"))
        .await
        .unwrap();
    assert_eq!(rotation.phase(), RotationPhase::Done);
    assert_eq!(active.as_bytes(), key("new passphrase").as_bytes());

    // Forced re-push bumped versions past the originals
    assert_eq!(server_store.field_version(&cand, "name").unwrap(), Some(2));
    assert_eq!(server_store.field_version(&task, "status").unwrap(), Some(2));

    // A client holding the new key reads everything
    let bob = engine(&base, FieldStore::open_in_memory().unwrap(), "new passphrase");
    let stats = bob.full_pull().await.unwrap();
    assert_eq!(stats.fields_applied, 3);
    let record = bob.store().get_record(&cand).unwrap().unwrap();
    assert_eq!(record.field("name").unwrap().value(), &json!("Ada"));

    // The old key can no longer decrypt anything
    let stale = engine(&base, FieldStore::open_in_memory().unwrap(), "old passphrase");
    let stats = stale.full_pull().await.unwrap();
    assert_eq!(stats.fields_applied, 0);
}

#[tokio::test]
async fn rotation_with_wrong_old_key_pushes_nothing_useful() {
    // Rotating with a wrong old key cannot decrypt the pulled data; those
    // fields never materialize locally, so nothing readable is lost — but
    // nothing is re-encrypted either. The canary check exists to catch this
    // before anyone calls rotate.
    let (base, server_store) = spawn_server().await;
    let cand = RecordKey::new("candidate", "c-1");

    let alice = engine(&base, FieldStore::open_in_memory().unwrap(), "old passphrase");
    alice.store().set_field(&cand, "name", &json!("Ada")).unwrap();
    alice.push().await.unwrap();

    let mut rotation = KeyRotation::new(
        ApiClient::new(&base),
        FieldStore::open_in_memory().unwrap(),
    );
    rotation
        .rotate(key("not the old passphrase"), key("new passphrase"))
        .await
        .unwrap();

    // The undecryptable field was skipped, not overwritten
    assert_eq!(server_store.field_version(&cand, "name").unwrap(), Some(1));
}

#[tokio::test]
async fn rotation_fails_cleanly_when_server_unreachable() {
    // Nothing listens on port 1; the pull phase fails immediately
    let mut rotation = KeyRotation::new(
        ApiClient::new("http://127.0.0.1:1"),
        FieldStore::open_in_memory().unwrap(),
    );
    let result = rotation.rotate(key("old"), key("new")).await;

    assert!(result.is_err());
    assert_eq!(rotation.phase(), RotationPhase::Failed);
}

#[tokio::test]
async fn failed_rotation_is_retryable_from_scratch() {
    let (base, _server) = spawn_server().await;
    let cand = RecordKey::new("candidate", "c-1");

    let alice = engine(&base, FieldStore::open_in_memory().unwrap(), "old passphrase");
    alice.store().set_field(&cand, "name", &json!("Ada")).unwrap();
    alice.push().await.unwrap();

    // First attempt dies on an unreachable server
    let rotation_store = FieldStore::open_in_memory().unwrap();
    let mut failed = KeyRotation::new(ApiClient::new("http://127.0.0.1:1"), rotation_store.clone());
    assert!(failed.rotate(key("old passphrase"), key("new passphrase")).await.is_err());

    // Retry against the live server with the same store succeeds — the
    // full pull is idempotent, so a half-done attempt leaves no damage
    let mut retry = KeyRotation::new(ApiClient::new(&base), rotation_store);
    retry
        .rotate(key("old passphrase"), key("new passphrase"))
        .await
        .unwrap();
    assert_eq!(retry.phase(), RotationPhase::Done);

    let bob = engine(&base, FieldStore::open_in_memory().unwrap(), "new passphrase");
    let stats = bob.full_pull().await.unwrap();
    assert_eq!(stats.fields_applied, 1);
}
