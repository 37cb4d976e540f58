// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::test_store;
use crate::jsonl::read_event_log;
use crate::PutAgentOptions;

#[test]
fn daemon_id_is_stable_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let first = {
        let store = super::Store::open(dir.path()).unwrap();
        store.daemon_id().to_string()
    };
    let store = super::Store::open(dir.path()).unwrap();
    assert_eq!(store.daemon_id(), first);
    assert!(first.starts_with("d_"));
}

#[test]
fn meta_round_trips() {
    let (store, _dir) = test_store();
    assert_eq!(store.get_meta("sync.watermark").unwrap(), None);
    store.set_meta("sync.watermark", "42").unwrap();
    assert_eq!(store.get_meta("sync.watermark").unwrap(), Some("42".to_string()));
    store.set_meta("sync.watermark", "43").unwrap();
    assert_eq!(store.get_meta("sync.watermark").unwrap(), Some("43".to_string()));
}

#[test]
fn mutations_mirror_to_jsonl() {
    let (store, dir) = test_store();
    store
        .put_agent("implementer", "auth", None, "/repo", 1_000, PutAgentOptions::default())
        .unwrap();
    let records = read_event_log(&dir.path().join("events.jsonl")).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, "agent.registered");
    assert_eq!(records[0].sequence, 1);
    assert_eq!(records[0].origin_daemon_id, store.daemon_id());
}

#[test]
fn corrupt_mirror_is_quarantined_and_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = super::Store::open(dir.path()).unwrap();
        store
            .put_agent("implementer", "auth", None, "/repo", 1_000, PutAgentOptions::default())
            .unwrap();
    }
    std::fs::write(dir.path().join("events.jsonl"), "garbage\n").unwrap();

    let store = super::Store::open(dir.path()).unwrap();
    assert!(dir.path().join("events.jsonl.corrupt").exists());
    let records = read_event_log(&dir.path().join("events.jsonl")).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, "agent.registered");
    drop(store);
}

#[test]
fn truncated_mirror_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = super::Store::open(dir.path()).unwrap();
        store
            .put_agent("implementer", "auth", None, "/repo", 1_000, PutAgentOptions::default())
            .unwrap();
        store
            .put_agent("reviewer", "auth", None, "/repo", 1_001, PutAgentOptions::default())
            .unwrap();
    }
    // Drop a line, simulating a crash between commit and mirror append.
    std::fs::write(dir.path().join("events.jsonl"), "").unwrap();

    let _store = super::Store::open(dir.path()).unwrap();
    let records = read_event_log(&dir.path().join("events.jsonl")).unwrap();
    assert_eq!(records.len(), 2);
}
