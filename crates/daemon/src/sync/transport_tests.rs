// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::rpc::test_support::test_ctx;
use serde_json::json;

#[test]
fn frames_round_trip() {
    let frames = vec![
        PeerFrame::Hello {
            daemon_id: "d_a".to_string(),
            token: "tok".to_string(),
            heads: HashMap::from([("d_a".to_string(), 4u64)]),
        },
        PeerFrame::HelloAck { daemon_id: "d_b".to_string(), heads: HashMap::new() },
        PeerFrame::PairRequest {
            code: "ABCD2345".to_string(),
            daemon_id: "d_a".to_string(),
            name: "laptop".to_string(),
            address: Some("127.0.0.1:9000".to_string()),
        },
        PeerFrame::PairOk {
            daemon_id: "d_b".to_string(),
            name: "desktop".to_string(),
            token: "tok".to_string(),
        },
        PeerFrame::Push { events: vec![] },
        PeerFrame::PushAck { applied: 3 },
        PeerFrame::Error { code: "unauthorized".to_string(), message: "nope".to_string() },
    ];
    for frame in frames {
        let raw = serde_json::to_string(&frame).unwrap();
        let back = PeerFrame::decode(&raw).unwrap();
        assert_eq!(format!("{:?}", back), format!("{:?}", frame));
    }
}

#[test]
fn frame_tags_are_dotted() {
    let raw = serde_json::to_string(&PeerFrame::PushAck { applied: 1 }).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["type"], "events.push_ack");

    let raw = serde_json::to_string(&PeerFrame::Hello {
        daemon_id: "d".to_string(),
        token: "t".to_string(),
        heads: HashMap::new(),
    })
    .unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["type"], "peer.hello");
}

#[test]
fn unknown_frame_decodes_to_none() {
    assert!(PeerFrame::decode(r#"{"type":"peer.future","x":1}"#).is_none());
    assert!(PeerFrame::decode("not json").is_none());
}

#[tokio::test]
async fn pairing_window_lifecycle() {
    let t = test_ctx();
    let now = t.ctx.now_ms();

    assert!(t.ctx.sync.watch_pairing().is_none());

    let (code, expires_at, mut rx) = t.ctx.sync.begin_pairing(now);
    assert_eq!(code.len(), 8);
    assert!(expires_at > now);
    assert!(t.ctx.sync.pairing_code_valid(&code, now));
    assert!(!t.ctx.sync.pairing_code_valid("WRONG123", now));
    assert!(!t.ctx.sync.pairing_code_valid(&code, expires_at + 1));

    let info = PeerInfo {
        daemon_id: "d_peer".to_string(),
        name: "other".to_string(),
        address: "127.0.0.1:9001".to_string(),
        paired_at: now,
    };
    t.ctx.sync.complete_pairing(info.clone());

    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().clone().unwrap().daemon_id, "d_peer");

    // The window is consumed.
    assert!(t.ctx.sync.watch_pairing().is_none());
    assert!(!t.ctx.sync.pairing_code_valid(&code, now));
}

#[tokio::test]
async fn new_pairing_replaces_previous_window() {
    let t = test_ctx();
    let now = t.ctx.now_ms();
    let (first_code, ..) = t.ctx.sync.begin_pairing(now);
    let (second_code, ..) = t.ctx.sync.begin_pairing(now);
    assert!(!t.ctx.sync.pairing_code_valid(&first_code, now) || first_code == second_code);
    assert!(t.ctx.sync.pairing_code_valid(&second_code, now));
}

#[test]
fn events_push_payload_is_forward_compatible() {
    // A batch containing an unknown event kind still parses.
    let raw = json!({
        "type": "events.push",
        "events": [{
            "origin_daemon_id": "d_x",
            "sequence": 1,
            "kind": "workspace.pinned",
            "created_at": 5,
            "payload": {"pin": true}
        }]
    })
    .to_string();
    match PeerFrame::decode(&raw) {
        Some(PeerFrame::Push { events }) => {
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].kind, "workspace.pinned");
        }
        other => panic!("unexpected: {:?}", other),
    }
}
