// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::rpc::test_support::test_ctx;
use std::collections::HashSet;
use thrum_core::{Agent, AgentId, Message, MessageAuthor, MessageBody, MessageId, SubFilter};
use thrum_core::{SessionId, SubscriptionId};

fn agent_record(origin: &str, seq: u64, id: &str) -> EventRecord {
    let agent = Agent {
        agent_id: AgentId::new(id),
        role: "implementer".to_string(),
        module: "auth".to_string(),
        display: None,
        worktree: "/peer".to_string(),
        registered_at: seq,
        last_seen_at: seq,
        deleted: false,
    };
    let (kind, payload) = Event::AgentRegistered { agent }.into_parts();
    EventRecord { origin_daemon_id: origin.to_string(), sequence: seq, kind, created_at: seq, payload }
}

fn message_record(origin: &str, seq: u64) -> EventRecord {
    let message = Message {
        message_id: MessageId::from_string(format!("msg_peer{}", seq)),
        thread_id: None,
        author: MessageAuthor { agent_id: AgentId::new("peer_author"), session_id: None },
        body: MessageBody::text("from peer"),
        scopes: vec![],
        refs: vec![],
        created_at: seq,
        updated_at: None,
        deleted: false,
        version: 1,
    };
    let (kind, payload) =
        Event::MessageCreated { message, audience: vec![AgentId::new("local_agent")] }.into_parts();
    EventRecord { origin_daemon_id: origin.to_string(), sequence: seq, kind, created_at: seq, payload }
}

#[tokio::test]
async fn out_of_order_batches_converge() {
    let t = test_ctx();
    let records = vec![
        agent_record("d_peer", 3, "c_CCCCCCCCCC"),
        agent_record("d_peer", 1, "a_AAAAAAAAAA"),
        agent_record("d_peer", 2, "b_BBBBBBBBBB"),
    ];
    let summary = apply_records(&t.ctx, &records);
    assert_eq!(summary.applied, 3);
    assert_eq!(summary.deferred, 0);
    assert_eq!(t.ctx.store.origin_heads().unwrap().get("d_peer"), Some(&3));
}

#[tokio::test]
async fn missing_prefix_defers() {
    let t = test_ctx();
    let records = vec![agent_record("d_peer", 2, "b_BBBBBBBBBB")];
    let summary = apply_records(&t.ctx, &records);
    assert_eq!(summary.applied, 0);
    assert_eq!(summary.deferred, 1);

    // Once the prefix arrives, the deferred event applies.
    let records = vec![
        agent_record("d_peer", 1, "a_AAAAAAAAAA"),
        agent_record("d_peer", 2, "b_BBBBBBBBBB"),
    ];
    let summary = apply_records(&t.ctx, &records);
    assert_eq!(summary.applied, 2);
}

#[tokio::test]
async fn duplicates_are_skipped() {
    let t = test_ctx();
    let record = agent_record("d_peer", 1, "a_AAAAAAAAAA");
    let summary = apply_records(&t.ctx, &[record.clone(), record]);
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn applied_messages_fan_out_to_subscribers() {
    let t = test_ctx();
    let (conn, mut rx) = t.ctx.subs.register_conn();
    t.ctx.subs.subscribe(
        conn,
        &SessionId::from_string("ses_local"),
        SubscriptionId::new(),
        SubFilter::All,
    );

    let summary = apply_records(&t.ctx, &[message_record("d_peer", 1)]);
    assert_eq!(summary.applied, 1);

    let frame = rx.recv().await.unwrap();
    assert_eq!(frame.method, "message.created");
    assert_eq!(frame.params["message"]["message_id"], "msg_peer1");
}

#[tokio::test]
async fn non_message_events_do_not_fan_out() {
    let t = test_ctx();
    let (conn, mut rx) = t.ctx.subs.register_conn();
    t.ctx.subs.subscribe(
        conn,
        &SessionId::from_string("ses_local"),
        SubscriptionId::new(),
        SubFilter::All,
    );

    apply_records(&t.ctx, &[agent_record("d_peer", 1, "a_AAAAAAAAAA")]);
    assert!(rx.try_recv().is_err());
}

#[test]
fn parse_skips_malformed_lines() {
    let mut raw = String::new();
    raw.push_str(&serde_json::to_string(&agent_record("d", 1, "a_AAAAAAAAAA")).unwrap());
    raw.push('\n');
    raw.push_str("not json\n\n");
    raw.push_str(&serde_json::to_string(&agent_record("d", 2, "b_BBBBBBBBBB")).unwrap());
    raw.push('\n');

    let records = parse_event_lines(&raw);
    assert_eq!(records.len(), 2);
    let seqs: HashSet<u64> = records.iter().map(|r| r.sequence).collect();
    assert!(seqs.contains(&1) && seqs.contains(&2));
}
