// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::store::test_store;

fn start(store: &Store, agent: &str, now: u64) -> Session {
    store
        .start_session(AgentId::new(agent), None, None, vec![], vec![], now)
        .unwrap()
}

#[test]
fn start_and_end() {
    let (store, _dir) = test_store();
    let session = start(&store, "implementer_AAAAAAAAAA", 1_000);
    assert!(session.is_active());
    assert!(session.session_id.as_str().starts_with("ses_"));

    let ended = store.end_session(&session.session_id, 2_000).unwrap();
    assert_eq!(ended.ended_at, Some(2_000));

    let found = store.get_session(session.session_id.as_str()).unwrap().unwrap();
    assert!(!found.is_active());
}

#[test]
fn end_is_idempotent() {
    let (store, _dir) = test_store();
    let session = start(&store, "a", 1_000);
    store.end_session(&session.session_id, 2_000).unwrap();
    let events_before = store.event_count().unwrap();
    let again = store.end_session(&session.session_id, 3_000).unwrap();
    assert_eq!(again.ended_at, Some(2_000));
    assert_eq!(store.event_count().unwrap(), events_before);
}

#[test]
fn heartbeat_refreshes_session_and_agent() {
    let (store, _dir) = test_store();
    let agent = match store
        .put_agent("implementer", "auth", None, "/repo", 500, crate::PutAgentOptions::default())
        .unwrap()
    {
        crate::RegisterOutcome::Registered(agent) => agent,
        other => panic!("unexpected: {:?}", other),
    };
    let session = start(&store, agent.agent_id.as_str(), 1_000);

    store.heartbeat_session(session.session_id.as_str(), 5_000).unwrap();
    let s = store.get_session(session.session_id.as_str()).unwrap().unwrap();
    assert_eq!(s.last_seen_at, 5_000);
    let a = store.get_agent(agent.agent_id.as_str()).unwrap().unwrap();
    assert_eq!(a.last_seen_at, 5_000);
}

#[test]
fn heartbeat_on_ended_session_is_not_found() {
    let (store, _dir) = test_store();
    let session = start(&store, "a", 1_000);
    store.end_session(&session.session_id, 2_000).unwrap();
    assert!(matches!(
        store.heartbeat_session(session.session_id.as_str(), 3_000),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn set_intent_snapshots_context() {
    let (store, _dir) = test_store();
    let session = start(&store, "implementer_AAAAAAAAAA", 1_000);

    let ctx = store
        .set_session_intent(&session.session_id, Some("refactor auth".to_string()), 2_000)
        .unwrap();
    assert_eq!(ctx.intent.as_deref(), Some("refactor auth"));
    assert_eq!(ctx.session_id, session.session_id);

    // Session row mirrors the intent.
    let s = store.get_session(session.session_id.as_str()).unwrap().unwrap();
    assert_eq!(s.intent.as_deref(), Some("refactor auth"));

    // And the context is listable.
    let (contexts, total) = store.list_contexts(0, 10).unwrap();
    assert_eq!(total, 1);
    assert_eq!(contexts[0].agent_id.as_str(), "implementer_AAAAAAAAAA");
}

#[test]
fn set_task_keeps_intent() {
    let (store, _dir) = test_store();
    let session = start(&store, "a", 1_000);
    store.set_session_intent(&session.session_id, Some("ship auth".to_string()), 2_000).unwrap();
    let ctx =
        store.set_session_task(&session.session_id, Some("wire OAuth".to_string()), 3_000).unwrap();
    assert_eq!(ctx.intent.as_deref(), Some("ship auth"));
    assert_eq!(ctx.current_task.as_deref(), Some("wire OAuth"));
}

#[test]
fn list_sessions_filters_active() {
    let (store, _dir) = test_store();
    let open = start(&store, "a", 1_000);
    let closed = start(&store, "a", 1_500);
    store.end_session(&closed.session_id, 2_000).unwrap();

    let (all, total) = store.list_sessions(Some("a"), false, 0, 10).unwrap();
    assert_eq!(total, 2);
    assert_eq!(all.len(), 2);

    let (active, total) = store.list_sessions(Some("a"), true, 0, 10).unwrap();
    assert_eq!(total, 1);
    assert_eq!(active[0].session_id, open.session_id);
}

#[test]
fn session_with_intent_seeds_context_on_start() {
    let (store, _dir) = test_store();
    let session = store
        .start_session(
            AgentId::new("implementer_AAAAAAAAAA"),
            Some("bootstrap".to_string()),
            None,
            vec![Scope::new("module", "auth")],
            vec![],
            1_000,
        )
        .unwrap();
    let ctx = store.get_context("implementer_AAAAAAAAAA").unwrap().unwrap();
    assert_eq!(ctx.session_id, session.session_id);
    assert_eq!(ctx.intent.as_deref(), Some("bootstrap"));
    assert_eq!(ctx.scopes, vec![Scope::new("module", "auth")]);
}
