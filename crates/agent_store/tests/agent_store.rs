use std::fs;

use agent_store::{
    load_as, new_session_id, save_as, store_root, Envelope, FileStore, KeyValueStore, MemoryStore,
    StoreError, STORE_VERSION,
};
use serde_json::json;
use tempfile::TempDir;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

fn file_store() -> (TempDir, FileStore) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = FileStore::new(store_root(dir.path()));
    (dir, store)
}

#[test]
fn missing_blob_loads_as_none() {
    let (_dir, store) = file_store();
    assert_eq!(store.load("session-1", "history").expect("load"), None);
    assert!(store.keys("session-1").expect("keys").is_empty());
}

#[test]
fn file_store_round_trips_blobs_in_versioned_envelopes() {
    let (dir, store) = file_store();
    let value = json!({"x": 12.5, "y": -3});

    store.save("session-1", "origin", &value).expect("save");
    assert_eq!(store.load("session-1", "origin").expect("load"), Some(value.clone()));

    let path = store_root(dir.path()).join("session-1").join("origin.json");
    let envelope: Envelope =
        serde_json::from_str(&fs::read_to_string(path).expect("blob file")).expect("envelope");
    assert_eq!(envelope.version, STORE_VERSION);
    assert_eq!(envelope.value, value);
    assert!(OffsetDateTime::parse(&envelope.saved_at, &Rfc3339).is_ok());
}

#[test]
fn keys_are_listed_sorted_and_remove_is_idempotent() {
    let (_dir, store) = file_store();
    for key in ["todos", "history", "model"] {
        store.save("s", key, &json!(null)).expect("save");
    }

    assert_eq!(store.keys("s").expect("keys"), vec!["history", "model", "todos"]);

    store.remove("s", "model").expect("remove");
    store.remove("s", "model").expect("second remove");
    assert_eq!(store.keys("s").expect("keys"), vec!["history", "todos"]);
}

#[test]
fn sessions_are_isolated() {
    let store = MemoryStore::new();
    store.save("a", "model", &json!("fast")).expect("save");

    assert_eq!(store.load("b", "model").expect("load"), None);
    assert_eq!(store.load("a", "model").expect("load"), Some(json!("fast")));
}

#[test]
fn corrupt_file_is_reported_with_key() {
    let (dir, store) = file_store();
    let session_dir = store_root(dir.path()).join("s");
    fs::create_dir_all(&session_dir).expect("session dir");
    fs::write(session_dir.join("history.json"), "{not json").expect("write corrupt");

    let error = store.load("s", "history").expect_err("corrupt blob must fail");
    assert!(matches!(error, StoreError::Corrupt { ref key, .. } if key == "history"));
}

#[test]
fn unsupported_version_and_bad_timestamp_are_rejected() {
    let (dir, store) = file_store();
    let session_dir = store_root(dir.path()).join("s");
    fs::create_dir_all(&session_dir).expect("session dir");
    fs::write(
        session_dir.join("a.json"),
        json!({"version": 2, "saved_at": "2026-02-14T00:00:00Z", "value": 1}).to_string(),
    )
    .expect("write");
    fs::write(
        session_dir.join("b.json"),
        json!({"version": 1, "saved_at": "yesterday", "value": 1}).to_string(),
    )
    .expect("write");

    assert!(matches!(
        store.load("s", "a"),
        Err(StoreError::UnsupportedVersion { found: 2, .. })
    ));
    assert!(matches!(
        store.load("s", "b"),
        Err(StoreError::InvalidTimestamp { .. })
    ));
}

#[test]
fn path_like_segments_are_rejected() {
    let (_dir, store) = file_store();

    for segment in ["../escape", "", ".hidden", "a/b"] {
        assert!(matches!(
            store.save("s", segment, &json!(1)),
            Err(StoreError::InvalidSegment { .. })
        ));
        assert!(matches!(
            store.load(segment, "k"),
            Err(StoreError::InvalidSegment { .. })
        ));
    }
}

#[test]
fn typed_helpers_decode_and_flag_shape_mismatches() {
    let store = MemoryStore::new();
    save_as(&store, "s", "todos", &vec!["one", "two"]).expect("save");

    let todos: Option<Vec<String>> = load_as(&store, "s", "todos").expect("load");
    assert_eq!(todos, Some(vec!["one".to_string(), "two".to_string()]));

    let mismatch = load_as::<u32>(&store, "s", "todos").expect_err("shape mismatch");
    assert!(matches!(mismatch, StoreError::Corrupt { .. }));
}

#[test]
fn memory_store_clones_share_state() {
    let store = MemoryStore::new();
    let handle = store.clone();
    handle.save("s", "model", &json!("x")).expect("save");

    assert_eq!(store.load("s", "model").expect("load"), Some(json!("x")));
    assert!(store.envelope("s", "model").is_some());
}

#[test]
fn session_ids_are_unique_uuids() {
    let first = new_session_id();
    let second = new_session_id();
    assert_ne!(first, second);
    assert_eq!(first.len(), 36);
    assert!(agent_store::validate_segment(&first).is_ok());
}
