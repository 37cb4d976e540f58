// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn record(seq: u64) -> EventRecord {
    EventRecord {
        origin_daemon_id: "d_test".to_string(),
        sequence: seq,
        kind: "message.created".to_string(),
        created_at: 1_000 + seq,
        payload: json!({"n": seq}),
    }
}

#[test]
fn append_then_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut log = EventLog::open(&path).unwrap();
    log.append(&record(1)).unwrap();
    log.append(&record(2)).unwrap();

    let records = read_event_log(&path).unwrap();
    assert_eq!(records, vec![record(1), record(2)]);
    assert_eq!(log.line_count().unwrap(), Some(2));
}

#[test]
fn blank_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut content = serde_json::to_string(&record(1)).unwrap();
    content.push_str("\n\n");
    std::fs::write(&path, content).unwrap();
    assert_eq!(read_event_log(&path).unwrap().len(), 1);
}

#[test]
fn malformed_line_is_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    std::fs::write(&path, "{broken\n").unwrap();
    assert!(matches!(read_event_log(&path), Err(StoreError::Corrupt(_))));

    let log = EventLog::open(&path).unwrap();
    assert_eq!(log.line_count().unwrap(), None);
}

#[test]
fn rebuild_replaces_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut log = EventLog::open(&path).unwrap();
    log.append(&record(9)).unwrap();

    log.rebuild(&[record(1), record(2), record(3)]).unwrap();
    let records = read_event_log(&path).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].sequence, 1);

    // Appends keep working after a rebuild.
    log.append(&record(4)).unwrap();
    assert_eq!(read_event_log(&path).unwrap().len(), 4);
}

#[test]
fn quarantine_moves_file_aside() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let mut log = EventLog::open(&path).unwrap();
    log.append(&record(1)).unwrap();

    log.quarantine().unwrap();
    assert!(dir.path().join("events.jsonl.corrupt").exists());
    assert_eq!(read_event_log(&path).unwrap().len(), 0);

    log.append(&record(2)).unwrap();
    assert_eq!(read_event_log(&path).unwrap().len(), 1);
}

#[test]
fn missing_file_reads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nope.jsonl");
    assert!(read_event_log(&path).unwrap().is_empty());
}
