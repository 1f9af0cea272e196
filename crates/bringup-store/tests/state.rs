//! State directory tests: run logs and the snapshot index on disk.

use bringup_schema::{SnapshotId, TargetId};
use bringup_store::{RunLogStore, SnapshotIndex, SnapshotRecord, StateLayout, StoreError};
use chrono::{TimeZone, Utc};
use std::fs;
use std::io::Write;

fn target() -> TargetId {
    TargetId::new("192.168.8.1")
}

fn snapshot(id: &str, created_at: &str) -> SnapshotRecord {
    SnapshotRecord {
        id: SnapshotId::new(id),
        target: target(),
        created_at: created_at.to_owned(),
        run_id: None,
    }
}

#[test]
fn interrupted_run_log_is_still_listed() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StateLayout::new(dir.path());
    layout.initialize().unwrap();
    let store = RunLogStore::new(layout);

    let started = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let mut writer = store.create(&target(), started).unwrap();
    writer
        .append(&serde_json::json!({"record": "event", "event": "stepStarted", "index": 0}))
        .unwrap();
    let path = writer.finish().unwrap();

    // crash halfway through the next record
    let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(br#"{"record":"event","ev"#).unwrap();

    let runs = store.list().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].records, 2);
    assert_eq!(runs[0].outcome, None);
}

#[test]
fn runs_started_in_the_same_second_get_distinct_logs() {
    let dir = tempfile::tempdir().unwrap();
    let store = RunLogStore::new(StateLayout::new(dir.path()));
    let started = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

    let first = store.create(&target(), started).unwrap();
    let second = store.create(&target(), started).unwrap();
    assert_ne!(first.run_id(), second.run_id());
    assert!(second.run_id().ends_with("-2"));
    first.finish().unwrap();
    second.finish().unwrap();

    assert_eq!(store.list_for(&target()).unwrap().len(), 2);
    assert!(store.list_for(&TargetId::new("10.0.0.9")).unwrap().is_empty());
}

#[test]
fn edited_snapshot_index_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StateLayout::new(dir.path());
    let index = SnapshotIndex::new(layout.clone());
    index
        .record(snapshot("/root/bringup-backup-a.tar.gz", "2026-03-01T12:00:00+00:00"))
        .unwrap();

    let path = layout.snapshot_index();
    let tampered = fs::read_to_string(&path)
        .unwrap()
        .replace("bringup-backup-a", "bringup-backup-b");
    fs::write(&path, tampered).unwrap();

    assert!(matches!(
        index.list(None),
        Err(StoreError::IntegrityFailure { .. })
    ));
}

#[test]
fn snapshot_index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let layout = StateLayout::new(dir.path());
    {
        let index = SnapshotIndex::new(layout.clone());
        index
            .record(snapshot("/root/old.tar.gz", "2026-03-01T12:00:00+00:00"))
            .unwrap();
        index
            .record(snapshot("/root/new.tar.gz", "2026-03-02T12:00:00+00:00"))
            .unwrap();
    }

    let reopened = SnapshotIndex::new(layout);
    let latest = reopened.latest(&target()).unwrap().unwrap();
    assert_eq!(latest.id.as_str(), "/root/new.tar.gz");

    reopened.remove("/root/new.tar.gz").unwrap();
    assert!(matches!(
        reopened.remove("/root/new.tar.gz"),
        Err(StoreError::SnapshotNotFound(_))
    ));
    assert_eq!(reopened.list(None).unwrap().len(), 1);
}
