// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session methods.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use thrum_core::{Scope, SessionId};
use thrum_wire::{Page, PageParams, RpcError};
use tracing::info;

use crate::ctx::DaemonCtx;

use super::{parse, store_err, CallerParams};

#[derive(Deserialize)]
struct StartParams {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    task: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    refs: Vec<String>,
    #[serde(flatten)]
    caller: CallerParams,
}

pub fn start(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: StartParams = parse(&params)?;
    let (agent_id, _) = ctx
        .identity
        .resolve(p.caller.caller_agent_id.as_deref(), p.caller.cwd.as_deref())
        .map_err(|e| RpcError::ambiguous_identity(e.to_string()))?;
    let scopes: Vec<Scope> = p.scopes.iter().map(|s| Scope::parse(s)).collect();
    let session = ctx
        .store
        .start_session(agent_id, p.intent, p.task, scopes, p.refs, ctx.now_ms())
        .map_err(store_err)?;
    info!(session_id = %session.session_id, agent = %session.agent_id, "session started");
    let session_id = session.session_id.clone();
    Ok(json!({ "session": session, "session_id": session_id }))
}

#[derive(Deserialize)]
struct SessionIdParams {
    session_id: String,
}

pub fn end(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: SessionIdParams = parse(&params)?;
    let session_id = SessionId::from_string(p.session_id);
    let session = ctx.store.end_session(&session_id, ctx.now_ms()).map_err(store_err)?;

    // Subscriptions die with the session.
    ctx.subs.remove_session(session_id.as_str());
    ctx.store.remove_session_subscriptions(session_id.as_str()).map_err(store_err)?;

    Ok(json!({ "session": session }))
}

pub fn heartbeat(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: SessionIdParams = parse(&params)?;
    ctx.store.heartbeat_session(&p.session_id, ctx.now_ms()).map_err(store_err)?;
    Ok(json!({ "ok": true }))
}

#[derive(Deserialize)]
struct SetIntentParams {
    session_id: String,
    #[serde(default)]
    intent: Option<String>,
}

pub fn set_intent(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: SetIntentParams = parse(&params)?;
    let session_id = SessionId::from_string(p.session_id);
    let context =
        ctx.store.set_session_intent(&session_id, p.intent, ctx.now_ms()).map_err(store_err)?;
    Ok(json!({ "context": context }))
}

#[derive(Deserialize)]
struct SetTaskParams {
    session_id: String,
    #[serde(default)]
    task: Option<String>,
}

pub fn set_task(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: SetTaskParams = parse(&params)?;
    let session_id = SessionId::from_string(p.session_id);
    let context =
        ctx.store.set_session_task(&session_id, p.task, ctx.now_ms()).map_err(store_err)?;
    Ok(json!({ "context": context }))
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    active_only: bool,
    #[serde(flatten)]
    page: PageParams,
}

pub fn list(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: ListParams = parse(&params)?;
    let page = p.page.normalized();
    let (items, total) = ctx
        .store
        .list_sessions(p.agent_id.as_deref(), p.active_only, page.offset(), page.page_size)
        .map_err(store_err)?;
    Ok(serde_json::to_value(Page::new(items, total, page))
        .map_err(|e| RpcError::internal(e.to_string()))?)
}
