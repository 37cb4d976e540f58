// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread methods.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use thrum_core::Scope;
use thrum_wire::{Page, PageParams, RpcError};

use crate::ctx::DaemonCtx;

use super::{parse, store_err, CallerParams};

#[derive(Deserialize)]
struct CreateParams {
    title: String,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(flatten)]
    caller: CallerParams,
}

pub fn create(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: CreateParams = parse(&params)?;
    if p.title.is_empty() {
        return Err(RpcError::invalid_params("title is required"));
    }
    let (creator, _) = ctx
        .identity
        .resolve(p.caller.caller_agent_id.as_deref(), p.caller.cwd.as_deref())
        .map_err(|e| RpcError::ambiguous_identity(e.to_string()))?;
    let scopes: Vec<Scope> = p.scopes.iter().map(|s| Scope::parse(s)).collect();
    let thread =
        ctx.store.create_thread(p.title, creator, scopes, ctx.now_ms()).map_err(store_err)?;
    let thread_id = thread.thread_id.clone();
    Ok(json!({ "thread_id": thread_id, "thread": thread }))
}

#[derive(Deserialize)]
struct PageOnly {
    #[serde(flatten)]
    page: PageParams,
}

pub fn list(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: PageOnly = parse(&params)?;
    let page = p.page.normalized();
    let (items, total) =
        ctx.store.list_threads(page.offset(), page.page_size).map_err(store_err)?;
    Ok(serde_json::to_value(Page::new(items, total, page))
        .map_err(|e| RpcError::internal(e.to_string()))?)
}

#[derive(Deserialize)]
struct GetParams {
    thread_id: String,
}

pub fn get(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: GetParams = parse(&params)?;
    let thread = ctx
        .store
        .get_thread(&p.thread_id)
        .map_err(store_err)?
        .ok_or_else(|| RpcError::not_found(format!("thread {}", p.thread_id)))?;
    let participants = ctx.store.thread_participants(&p.thread_id).map_err(store_err)?;
    Ok(json!({ "thread": thread, "participants": participants }))
}
