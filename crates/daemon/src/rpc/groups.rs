// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Group methods.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use thrum_core::MemberType;
use thrum_wire::{Page, PageParams, RpcError};

use crate::ctx::DaemonCtx;

use super::{parse, store_err, CallerParams};

#[derive(Deserialize)]
struct CreateParams {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(flatten)]
    caller: CallerParams,
}

pub fn create(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: CreateParams = parse(&params)?;
    if p.name.is_empty() {
        return Err(RpcError::invalid_params("name is required"));
    }
    let (creator, _) = ctx
        .identity
        .resolve(p.caller.caller_agent_id.as_deref(), p.caller.cwd.as_deref())
        .map_err(|e| RpcError::ambiguous_identity(e.to_string()))?;
    let group = ctx
        .store
        .create_group(p.name, p.description, creator, ctx.now_ms())
        .map_err(store_err)?;
    let group_id = group.group_id.clone();
    Ok(json!({ "group_id": group_id, "group": group }))
}

#[derive(Deserialize)]
struct GroupParam {
    group: String,
}

pub fn delete(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: GroupParam = parse(&params)?;
    ctx.store.delete_group(&p.group, ctx.now_ms()).map_err(store_err)?;
    Ok(json!({ "deleted": p.group }))
}

#[derive(Deserialize)]
struct PageOnly {
    #[serde(flatten)]
    page: PageParams,
}

pub fn list(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: PageOnly = parse(&params)?;
    let page = p.page.normalized();
    let (items, total) = ctx.store.list_groups(page.offset(), page.page_size).map_err(store_err)?;
    Ok(serde_json::to_value(Page::new(items, total, page))
        .map_err(|e| RpcError::internal(e.to_string()))?)
}

pub fn info(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: GroupParam = parse(&params)?;
    let group = ctx
        .store
        .get_group(&p.group)
        .map_err(store_err)?
        .ok_or_else(|| RpcError::not_found(format!("group {}", p.group)))?;
    let members = ctx.store.group_members(&p.group).map_err(store_err)?;
    let expanded = ctx.store.expand_group(&group.name).map_err(store_err)?;
    Ok(json!({
        "group": group,
        "member_count": members.len(),
        "agent_count": expanded.len(),
    }))
}

pub fn members(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: GroupParam = parse(&params)?;
    let members = ctx.store.group_members(&p.group).map_err(store_err)?;
    Ok(json!({ "members": members }))
}

#[derive(Deserialize)]
struct MemberParams {
    group: String,
    member_type: String,
    member_value: String,
    #[serde(flatten)]
    caller: CallerParams,
}

pub fn member_add(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: MemberParams = parse(&params)?;
    let member_type = MemberType::parse(&p.member_type)
        .ok_or_else(|| RpcError::invalid_params(format!("bad member_type: {}", p.member_type)))?;
    let (caller, _) = ctx
        .identity
        .resolve(p.caller.caller_agent_id.as_deref(), p.caller.cwd.as_deref())
        .map_err(|e| RpcError::ambiguous_identity(e.to_string()))?;
    let member = ctx
        .store
        .add_group_member(&p.group, member_type, p.member_value, caller, ctx.now_ms())
        .map_err(store_err)?;
    Ok(json!({ "member": member }))
}

pub fn member_remove(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: MemberParams = parse(&params)?;
    let member_type = MemberType::parse(&p.member_type)
        .ok_or_else(|| RpcError::invalid_params(format!("bad member_type: {}", p.member_type)))?;
    ctx.store
        .remove_group_member(&p.group, member_type, p.member_value, ctx.now_ms())
        .map_err(store_err)?;
    Ok(json!({ "removed": true }))
}
