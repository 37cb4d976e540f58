// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::test_support::test_ctx;
use super::*;
use serde_json::json;
use thrum_wire::{ErrorKind, RpcRequest};

async fn call(
    ctx: &Arc<crate::ctx::DaemonCtx>,
    method: &str,
    params: Value,
) -> Result<Value, thrum_wire::RpcError> {
    let mut conn = ConnState::unix();
    let response = dispatch(ctx, RpcRequest::new(1, method, params), &mut conn).await;
    match response.error {
        Some(error) => Err(error),
        None => Ok(response.result.unwrap_or(Value::Null)),
    }
}

fn register_params(role: &str, module: &str) -> Value {
    json!({ "role": role, "module": module })
}

#[tokio::test]
async fn register_then_whoami() {
    let t = test_ctx();
    let result = call(&t.ctx, "agent.register", register_params("implementer", "auth"))
        .await
        .unwrap();
    assert_eq!(result["status"], "registered");
    let agent_id = result["agent_id"].as_str().unwrap().to_string();
    assert!(agent_id.starts_with("implementer_"));
    assert_eq!(agent_id.len(), "implementer_".len() + 10);

    let whoami = call(&t.ctx, "agent.whoami", json!({ "caller_agent_id": agent_id }))
        .await
        .unwrap();
    assert_eq!(whoami["agent_id"], agent_id);
    assert_eq!(whoami["source"], "daemon");
}

#[tokio::test]
async fn duplicate_register_reports_conflict() {
    let t = test_ctx();
    let first = call(&t.ctx, "agent.register", register_params("implementer", "auth"))
        .await
        .unwrap();
    let second = call(&t.ctx, "agent.register", register_params("implementer", "auth"))
        .await
        .unwrap();
    assert_eq!(second["status"], "conflict");
    assert_eq!(second["conflict"]["existing_agent_id"], first["agent_id"]);
}

#[tokio::test]
async fn force_register_mints_fresh_id() {
    let t = test_ctx();
    let first = call(&t.ctx, "agent.register", register_params("implementer", "auth"))
        .await
        .unwrap();
    t.clock.advance(std::time::Duration::from_millis(5));
    let forced = call(
        &t.ctx,
        "agent.register",
        json!({ "role": "implementer", "module": "auth", "force": true }),
    )
    .await
    .unwrap();
    assert_eq!(forced["status"], "registered");
    assert_ne!(forced["agent_id"], first["agent_id"]);
}

#[tokio::test]
async fn send_and_list_for_role() {
    let t = test_ctx();
    let author = call(&t.ctx, "agent.register", register_params("coordinator", "core"))
        .await
        .unwrap();
    let author_id = author["agent_id"].as_str().unwrap().to_string();
    call(&t.ctx, "agent.register", register_params("reviewer", "auth")).await.unwrap();

    let sent = call(
        &t.ctx,
        "message.send",
        json!({
            "content": "hi",
            "mentions": ["@reviewer"],
            "caller_agent_id": author_id,
        }),
    )
    .await
    .unwrap();
    let message_id = sent["message_id"].as_str().unwrap();
    assert!(message_id.starts_with("msg_"));

    let listed = call(&t.ctx, "message.list", json!({ "for_agent_role": "reviewer" }))
        .await
        .unwrap();
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["items"][0]["message_id"], message_id);
    assert_eq!(listed["items"][0]["is_read"], false);
}

#[tokio::test]
async fn reply_copies_parent_author_into_audience() {
    let t = test_ctx();
    let coordinator = call(&t.ctx, "agent.register", register_params("coordinator", "core"))
        .await
        .unwrap();
    let coordinator_id = coordinator["agent_id"].as_str().unwrap().to_string();
    let implementer = call(&t.ctx, "agent.register", register_params("implementer", "auth"))
        .await
        .unwrap();
    let implementer_id = implementer["agent_id"].as_str().unwrap().to_string();

    let parent = call(
        &t.ctx,
        "message.send",
        json!({
            "content": "please fix",
            "mentions": ["@implementer"],
            "caller_agent_id": coordinator_id,
        }),
    )
    .await
    .unwrap();
    let parent_id = parent["message_id"].as_str().unwrap();

    let reply = call(
        &t.ctx,
        "message.send",
        json!({
            "content": "ok",
            "refs": [{ "type": "reply_to", "value": parent_id }],
            "caller_agent_id": implementer_id,
        }),
    )
    .await
    .unwrap();

    let detail = call(
        &t.ctx,
        "message.get",
        json!({ "message_id": reply["message_id"] }),
    )
    .await
    .unwrap();
    let recipients: Vec<&str> = detail["read_state"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["agent_id"].as_str().unwrap())
        .collect();
    assert!(recipients.contains(&coordinator_id.as_str()));
    assert!(!recipients.contains(&implementer_id.as_str()));
}

#[tokio::test]
async fn mark_read_is_idempotent_over_rpc() {
    let t = test_ctx();
    let author = call(&t.ctx, "agent.register", register_params("coordinator", "core"))
        .await
        .unwrap();
    let author_id = author["agent_id"].as_str().unwrap().to_string();
    let reviewer = call(&t.ctx, "agent.register", register_params("reviewer", "auth"))
        .await
        .unwrap();
    let reviewer_id = reviewer["agent_id"].as_str().unwrap().to_string();

    let sent = call(
        &t.ctx,
        "message.send",
        json!({ "content": "hi", "mentions": ["@reviewer"], "caller_agent_id": author_id }),
    )
    .await
    .unwrap();
    let message_id = sent["message_id"].clone();

    let first = call(
        &t.ctx,
        "message.markRead",
        json!({ "message_ids": [message_id], "caller_agent_id": reviewer_id }),
    )
    .await
    .unwrap();
    assert_eq!(first["marked_count"], 1);

    let second = call(
        &t.ctx,
        "message.markRead",
        json!({ "message_ids": [sent["message_id"]], "caller_agent_id": reviewer_id }),
    )
    .await
    .unwrap();
    assert_eq!(second["marked_count"], 0);
}

#[tokio::test]
async fn edit_bumps_version_and_non_author_is_denied() {
    let t = test_ctx();
    let author = call(&t.ctx, "agent.register", register_params("coordinator", "core"))
        .await
        .unwrap();
    let author_id = author["agent_id"].as_str().unwrap().to_string();
    let other = call(&t.ctx, "agent.register", register_params("reviewer", "auth"))
        .await
        .unwrap();
    let other_id = other["agent_id"].as_str().unwrap().to_string();

    let sent = call(
        &t.ctx,
        "message.send",
        json!({ "content": "v1", "caller_agent_id": author_id }),
    )
    .await
    .unwrap();

    let edited = call(
        &t.ctx,
        "message.edit",
        json!({ "message_id": sent["message_id"], "content": "v2", "caller_agent_id": author_id }),
    )
    .await
    .unwrap();
    assert_eq!(edited["message"]["version"], 2);

    let denied = call(
        &t.ctx,
        "message.edit",
        json!({ "message_id": sent["message_id"], "content": "x", "caller_agent_id": other_id }),
    )
    .await
    .unwrap_err();
    assert_eq!(denied.kind(), Some(ErrorKind::PermissionDenied));
}

#[tokio::test]
async fn group_cycle_is_a_conflict() {
    let t = test_ctx();
    let creator = call(&t.ctx, "agent.register", register_params("coordinator", "core"))
        .await
        .unwrap();
    let creator_id = creator["agent_id"].as_str().unwrap().to_string();

    for name in ["a", "b"] {
        call(&t.ctx, "group.create", json!({ "name": name, "caller_agent_id": creator_id }))
            .await
            .unwrap();
    }
    call(
        &t.ctx,
        "group.member.add",
        json!({ "group": "a", "member_type": "group", "member_value": "b", "caller_agent_id": creator_id }),
    )
    .await
    .unwrap();

    let err = call(
        &t.ctx,
        "group.member.add",
        json!({ "group": "b", "member_type": "group", "member_value": "a", "caller_agent_id": creator_id }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Conflict));
}

#[tokio::test]
async fn subscribe_requires_websocket() {
    let t = test_ctx();
    let err = call(
        &t.ctx,
        "subscribe",
        json!({ "session_id": "ses_x", "filter": { "type": "all" } }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::InvalidParams));
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let t = test_ctx();
    let err = call(&t.ctx, "nope.nothing", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::MethodNotFound));
}

#[tokio::test]
async fn missing_identity_is_ambiguous() {
    let t = test_ctx();
    let err = call(&t.ctx, "message.send", json!({ "content": "hi" })).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::AmbiguousIdentity));
}

#[tokio::test]
async fn session_lifecycle_over_rpc() {
    let t = test_ctx();
    let agent = call(&t.ctx, "agent.register", register_params("implementer", "auth"))
        .await
        .unwrap();
    let agent_id = agent["agent_id"].as_str().unwrap().to_string();

    let started = call(
        &t.ctx,
        "session.start",
        json!({ "intent": "ship auth", "caller_agent_id": agent_id }),
    )
    .await
    .unwrap();
    let session_id = started["session_id"].as_str().unwrap().to_string();
    assert!(session_id.starts_with("ses_"));

    call(&t.ctx, "session.heartbeat", json!({ "session_id": session_id })).await.unwrap();
    let context = call(
        &t.ctx,
        "session.setTask",
        json!({ "session_id": session_id, "task": "wire OAuth" }),
    )
    .await
    .unwrap();
    assert_eq!(context["context"]["current_task"], "wire OAuth");
    assert_eq!(context["context"]["intent"], "ship auth");

    let shown = call(&t.ctx, "context.show", json!({ "agent_id": agent_id })).await.unwrap();
    assert_eq!(shown["context"]["current_task"], "wire OAuth");

    call(&t.ctx, "session.end", json!({ "session_id": session_id })).await.unwrap();
    let listed = call(
        &t.ctx,
        "session.list",
        json!({ "agent_id": agent_id, "active_only": true }),
    )
    .await
    .unwrap();
    assert_eq!(listed["total"], 0);
}

#[tokio::test]
async fn health_and_ping_respond() {
    let t = test_ctx();
    let ping = call(&t.ctx, "daemon.ping", Value::Null).await.unwrap();
    assert_eq!(ping["ok"], true);

    let health = call(&t.ctx, "health", Value::Null).await.unwrap();
    assert_eq!(health["ok"], true);
    assert_eq!(health["daemon_id"], ping["daemon_id"]);
    assert_eq!(health["sync_state"], "disabled");
}

#[tokio::test]
async fn listing_pagination_envelope() {
    let t = test_ctx();
    for i in 0..5 {
        call(&t.ctx, "agent.register", register_params(&format!("role{}", i), "m"))
            .await
            .unwrap();
    }
    let page = call(&t.ctx, "agent.list", json!({ "page": 2, "page_size": 2 })).await.unwrap();
    assert_eq!(page["total"], 5);
    assert_eq!(page["page"], 2);
    assert_eq!(page["page_size"], 2);
    assert_eq!(page["total_pages"], 3);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
}
