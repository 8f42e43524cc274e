//! Unit tests for the JSON-file and in-memory history stores.

use boxwatch::detector::Fingerprint;
use boxwatch::history::{
    HistoryRecord, HistoryStore, JsonFileStore, MemoryStore, FIRST_CAPTURE_DESCRIPTION,
};
use boxwatch::AppError;

fn record(hex: &str, description: &str, is_the_same: bool) -> HistoryRecord {
    HistoryRecord::new(
        Fingerprint::from_hex(hex).expect("valid hex"),
        description.to_owned(),
        is_the_same,
    )
}

#[test]
fn first_capture_description_text() {
    assert_eq!(FIRST_CAPTURE_DESCRIPTION, "No previous image. This is the first one.");
}

#[test]
fn absent_file_loads_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonFileStore::new(dir.path().join("db.json"));

    assert!(store.load().expect("load").is_empty());
    assert!(store.latest().expect("latest").is_none());
}

#[test]
fn empty_file_loads_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db.json");
    std::fs::write(&path, "  \n").expect("write");

    assert!(JsonFileStore::new(&path).load().expect("load").is_empty());
}

#[test]
fn corrupt_file_loads_as_empty_without_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db.json");
    std::fs::write(&path, "{not json").expect("write");
    let store = JsonFileStore::new(&path);

    let loaded = store.load().expect("corruption is not an error");
    assert!(loaded.is_empty());

    let strict = store.try_load().expect_err("try_load surfaces corruption");
    assert!(matches!(strict, AppError::StoreCorrupt(_)), "got {strict:?}");
}

#[test]
fn non_array_json_is_treated_as_corrupt() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db.json");
    std::fs::write(&path, r#"{"description": "not a list"}"#).expect("write");

    assert!(JsonFileStore::new(&path).load().expect("load").is_empty());
}

#[test]
fn corrupt_file_is_replaced_on_next_append() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db.json");
    std::fs::write(&path, "[{\"truncated\": ").expect("write");
    let store = JsonFileStore::new(&path);

    store
        .append(record("0011223344556677", "mug", false))
        .expect("append");

    let loaded = store.try_load().expect("file is valid again");
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].description, "mug");
}

#[test]
fn appends_preserve_insertion_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonFileStore::new(dir.path().join("db.json"));

    let first = record("0000000000000000", "first", false);
    let second = record("ffffffffffffffff", "second", false);
    let third = record("0f0f0f0f0f0f0f0f", "third", true);
    for r in [first.clone(), second.clone(), third.clone()] {
        store.append(r).expect("append");
    }

    assert_eq!(store.load().expect("load"), vec![first, second, third.clone()]);
    assert_eq!(store.latest().expect("latest"), Some(third));
}

#[test]
fn file_is_pretty_printed_json_array() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db.json");
    let store = JsonFileStore::new(&path);
    store
        .append(record("a1b2c3d4e5f60718", "blue box", true))
        .expect("append");

    let raw = std::fs::read_to_string(&path).expect("read");
    assert!(raw.starts_with("[\n  {\n"), "expected 2-space pretty JSON: {raw}");

    let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    let entry = &value[0];
    assert_eq!(entry["fingerprint"], "a1b2c3d4e5f60718");
    assert_eq!(entry["description"], "blue box");
    assert_eq!(entry["is_the_same"], true);
    assert!(entry["timestamp"].is_string());
}

#[test]
fn missing_parent_directory_is_created() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("state").join("db.json");
    let store = JsonFileStore::new(&path);

    store
        .append(record("0000000000000000", "mug", false))
        .expect("append");

    assert!(path.exists());
    assert_eq!(store.path(), path.as_path());
}

#[test]
fn legacy_records_without_fingerprint_or_timestamp_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db.json");
    std::fs::write(
        &path,
        r#"[{"description": "old entry", "is_the_same": false, "extra": 1}]"#,
    )
    .expect("write");

    let loaded = JsonFileStore::new(&path).load().expect("load");
    assert_eq!(loaded.len(), 1);
    assert!(loaded[0].fingerprint.is_none());
    assert_eq!(loaded[0].description, "old entry");
    assert_eq!(loaded[0].timestamp.timestamp(), 0);
}

#[test]
fn memory_store_counts_appends_but_not_seeding() {
    let seeded = record("0000000000000000", "seed", false);
    let store = MemoryStore::with_records(vec![seeded.clone()]);
    assert_eq!(store.append_count(), 0);
    assert_eq!(store.latest().expect("latest"), Some(seeded));

    let next = record("ffffffffffffffff", "next", false);
    store.append(next.clone()).expect("append");

    assert_eq!(store.append_count(), 1);
    assert_eq!(store.load().expect("load").len(), 2);
    assert_eq!(store.latest().expect("latest"), Some(next));
}

#[test]
fn memory_store_starts_empty() {
    let store = MemoryStore::new();
    assert!(store.load().expect("load").is_empty());
    assert_eq!(store.append_count(), 0);
}

#[test]
fn unreadable_fingerprint_drops_only_that_fingerprint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("db.json");
    std::fs::write(
        &path,
        r#"[
  {"fingerprint": "0011223344556677", "description": "mug", "is_the_same": false},
  {"fingerprint": "zz", "description": "bottle", "is_the_same": true},
  {"fingerprint": 42, "description": "box", "is_the_same": true}
]"#,
    )
    .expect("write");
    let store = JsonFileStore::new(&path);

    let loaded = store.try_load().expect("a bad fingerprint does not corrupt the file");
    assert_eq!(loaded.len(), 3);
    assert!(loaded[0].fingerprint.is_some());
    assert!(loaded[1].fingerprint.is_none());
    assert_eq!(loaded[1].description, "bottle");
    assert!(loaded[2].fingerprint.is_none());

    store
        .append(record("ffffffffffffffff", "cup", false))
        .expect("append");
    let after = store.try_load().expect("load");
    assert_eq!(after.len(), 4, "existing history survives the next append");
    assert_eq!(after[1].description, "bottle");
}
