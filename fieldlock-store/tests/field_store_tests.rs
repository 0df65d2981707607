use fieldlock_store::FieldStore;
use fieldlock_types::{Checkpoint, RecordKey};
use serde_json::json;

fn store() -> FieldStore {
    FieldStore::open_in_memory().unwrap()
}

fn candidate(id: &str) -> RecordKey {
    RecordKey::new("candidate", id)
}

#[test]
fn set_field_creates_record_and_field_implicitly() {
    let store = store();
    let key = candidate("c-1");

    store.set_field(&key, "name", &json!("Ada")).unwrap();

    let record = store.get_record(&key).unwrap().unwrap();
    assert!(!record.is_synced());
    let field = record.field("name").unwrap();
    assert_eq!(field.value(), &json!("Ada"));
    assert_eq!(field.version(), 0);
    assert!(field.is_dirty());
}

#[test]
fn set_field_keeps_confirmed_version() {
    let store = store();
    let key = candidate("c-1");

    store.set_field(&key, "name", &json!("Ada")).unwrap();
    store.apply_push_result(&key, "name", 3).unwrap();
    store.set_field(&key, "name", &json!("Grace")).unwrap();

    let record = store.get_record(&key).unwrap().unwrap();
    let field = record.field("name").unwrap();
    assert_eq!(field.version(), 3);
    assert!(field.is_dirty());
    assert_eq!(field.value(), &json!("Grace"));
}

#[test]
fn apply_push_result_clears_dirty() {
    let store = store();
    let key = candidate("c-1");

    store.set_field(&key, "name", &json!("Ada")).unwrap();
    store.apply_push_result(&key, "name", 1).unwrap();

    let record = store.get_record(&key).unwrap().unwrap();
    let field = record.field("name").unwrap();
    assert_eq!(field.version(), 1);
    assert!(!field.is_dirty());
}

#[test]
fn apply_push_result_unknown_field_errors() {
    let store = store();
    let key = candidate("c-1");
    store.ensure_record(&key).unwrap();
    assert!(store.apply_push_result(&key, "ghost", 1).is_err());
}

#[test]
fn apply_pull_newer_wins_and_clears_dirty() {
    let store = store();
    let key = candidate("c-1");

    store.set_field(&key, "name", &json!("local edit")).unwrap();
    let applied = store.apply_pull(&key, "name", json!("remote"), 2).unwrap();
    assert!(applied);

    let record = store.get_record(&key).unwrap().unwrap();
    let field = record.field("name").unwrap();
    assert_eq!(field.value(), &json!("remote"));
    assert_eq!(field.version(), 2);
    assert!(!field.is_dirty());
}

#[test]
fn apply_pull_stale_is_noop() {
    let store = store();
    let key = candidate("c-1");

    store.apply_pull(&key, "name", json!("v3"), 3).unwrap();
    assert!(!store.apply_pull(&key, "name", json!("v3 again"), 3).unwrap());
    assert!(!store.apply_pull(&key, "name", json!("v1"), 1).unwrap());

    let record = store.get_record(&key).unwrap().unwrap();
    assert_eq!(record.field("name").unwrap().value(), &json!("v3"));
    assert_eq!(record.field("name").unwrap().version(), 3);
}

#[test]
fn apply_pull_creates_unknown_field() {
    let store = store();
    let key = candidate("c-1");

    let applied = store.apply_pull(&key, "email", json!("a@b.c"), 1).unwrap();
    assert!(applied);

    let record = store.get_record(&key).unwrap().unwrap();
    let field = record.field("email").unwrap();
    assert_eq!(field.version(), 1);
    assert!(!field.is_dirty());
}

#[test]
fn dirty_records_includes_unacknowledged_and_dirty() {
    let store = store();
    let clean = candidate("clean");
    let edited = candidate("edited");
    let fresh = candidate("fresh");

    // clean: acknowledged, no dirty fields
    store.upsert_remote_shell(&clean, false).unwrap();
    store.apply_pull(&clean, "name", json!("x"), 1).unwrap();

    // edited: acknowledged but carries a local edit
    store.upsert_remote_shell(&edited, false).unwrap();
    store.set_field(&edited, "name", &json!("y")).unwrap();

    // fresh: never acknowledged
    store.ensure_record(&fresh).unwrap();

    let dirty: Vec<String> = store
        .dirty_records()
        .unwrap()
        .into_iter()
        .map(|r| r.key.id.as_str().to_string())
        .collect();
    assert_eq!(dirty, vec!["edited", "fresh"]);
}

#[test]
fn upsert_remote_shell_acknowledges() {
    let store = store();
    let key = candidate("c-1");

    let was_new = store.upsert_remote_shell(&key, false).unwrap();
    assert!(was_new);
    assert!(store.get_record(&key).unwrap().unwrap().is_synced());

    let was_new = store.upsert_remote_shell(&key, true).unwrap();
    assert!(!was_new);
    assert!(store.get_record(&key).unwrap().unwrap().deleted);
}

#[test]
fn reset_versions_for_rotation_marks_everything_dirty() {
    let store = store();
    let a = candidate("a");
    let b = RecordKey::new("task", "t-1");

    store.apply_pull(&a, "name", json!("Ada"), 4).unwrap();
    store.apply_pull(&b, "status", json!("done"), 2).unwrap();

    let reset = store.reset_versions_for_rotation().unwrap();
    assert_eq!(reset, 2);

    for key in [&a, &b] {
        let record = store.get_record(key).unwrap().unwrap();
        for field in record.fields.values() {
            assert_eq!(field.version(), 0);
            assert!(field.is_dirty());
        }
    }
}

#[test]
fn checkpoint_roundtrip() {
    let store = store();
    assert!(store.checkpoint().unwrap().is_none());

    store
        .set_checkpoint(&Checkpoint::new("2026-02-01T10:00:00.000000Z"))
        .unwrap();
    assert_eq!(
        store.checkpoint().unwrap().unwrap().as_str(),
        "2026-02-01T10:00:00.000000Z"
    );

    // Overwrites, never accumulates
    store
        .set_checkpoint(&Checkpoint::new("2026-02-02T10:00:00.000000Z"))
        .unwrap();
    assert_eq!(
        store.checkpoint().unwrap().unwrap().as_str(),
        "2026-02-02T10:00:00.000000Z"
    );
}

#[test]
fn mark_deleted_keeps_fields() {
    let store = store();
    let key = candidate("c-1");
    store.set_field(&key, "name", &json!("Ada")).unwrap();

    store.mark_deleted(&key).unwrap();

    let record = store.get_record(&key).unwrap().unwrap();
    assert!(record.deleted);
    assert!(record.field("name").is_some());
}

#[test]
fn persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("client.db");
    let key = candidate("c-1");

    {
        let store = FieldStore::open(&path).unwrap();
        store.set_field(&key, "name", &json!("Ada")).unwrap();
        store.apply_push_result(&key, "name", 1).unwrap();
        store
            .set_checkpoint(&Checkpoint::new("2026-03-01T00:00:00.000000Z"))
            .unwrap();
    }

    let store = FieldStore::open(&path).unwrap();
    let record = store.get_record(&key).unwrap().unwrap();
    assert_eq!(record.field("name").unwrap().version(), 1);
    assert!(store.checkpoint().unwrap().is_some());
}
