use fieldlock_model::Record;
use fieldlock_types::RecordKey;
use serde_json::json;

fn candidate(id: &str) -> Record {
    Record::new(RecordKey::new("candidate", id))
}

#[test]
fn new_record_is_unsynced_and_empty() {
    let record = candidate("c-1");
    assert!(!record.is_synced());
    assert!(!record.has_dirty_fields());
    assert!(record.fields.is_empty());
    assert!(!record.deleted);
}

#[test]
fn set_field_creates_at_version_zero() {
    let mut record = candidate("c-1");
    record.set_field("name", json!("Ada"));

    let field = record.field("name").unwrap();
    assert_eq!(field.version(), 0);
    assert!(field.is_dirty());
}

#[test]
fn set_field_on_existing_keeps_confirmed_version() {
    let mut record = candidate("c-1");
    record.set_field("name", json!("Ada"));
    record.fields.get_mut("name").unwrap().confirm_push(2);

    record.set_field("name", json!("Grace"));
    let field = record.field("name").unwrap();
    assert_eq!(field.version(), 2);
    assert!(field.is_dirty());
}

#[test]
fn dirty_fields_lists_only_pending_edits() {
    let mut record = candidate("c-1");
    record.set_field("name", json!("Ada"));
    record.set_field("email", json!("ada@example.com"));
    record.fields.get_mut("email").unwrap().confirm_push(1);

    assert_eq!(record.dirty_fields(), vec!["name"]);
    assert!(record.has_dirty_fields());
}

#[test]
fn set_field_bumps_updated_at() {
    let mut record = candidate("c-1");
    let before = record.updated_at;
    std::thread::sleep(std::time::Duration::from_millis(2));
    record.set_field("notes", json!("called back"));
    assert!(record.updated_at > before);
}
