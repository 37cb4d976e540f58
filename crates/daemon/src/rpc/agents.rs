// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent & identity methods.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use thrum_core::AgentId;
use thrum_storage::{AgentFilter, PutAgentOptions, RegisterOutcome};
use thrum_wire::{Page, PageParams, RpcError};
use tracing::{info, warn};

use crate::ctx::DaemonCtx;
use crate::identity::{self, IdentityFile};
use crate::redirect;

use super::{parse, store_err, CallerParams};

/// Default cleanup threshold: one week of silence.
const DEFAULT_CLEANUP_MS: u64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Deserialize)]
struct RegisterParams {
    role: String,
    module: String,
    #[serde(default)]
    display: Option<String>,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    re_register: bool,
    #[serde(flatten)]
    caller: CallerParams,
}

pub fn register(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: RegisterParams = parse(&params)?;
    if p.role.is_empty() {
        return Err(RpcError::invalid_params("role is required"));
    }

    let caller_worktree = p
        .caller
        .cwd
        .as_deref()
        .and_then(redirect::find_worktree)
        .unwrap_or_else(|| ctx.paths.worktree.clone());
    let worktree = caller_worktree.display().to_string();

    let outcome = ctx
        .store
        .put_agent(
            &p.role,
            &p.module,
            p.display,
            &worktree,
            ctx.now_ms(),
            PutAgentOptions { force: p.force, re_register: p.re_register },
        )
        .map_err(store_err)?;

    let (status, agent) = match outcome {
        RegisterOutcome::Registered(agent) => ("registered", agent),
        RegisterOutcome::ReRegistered(agent) => ("re_registered", agent),
        RegisterOutcome::Conflict(existing) => {
            return Ok(json!({
                "status": "conflict",
                "conflict": {
                    "existing_agent_id": existing.agent_id,
                    "role": existing.role,
                    "module": existing.module,
                    "registered_at": existing.registered_at,
                },
            }));
        }
    };

    let dir = ctx.identity.identities_dir_for(p.caller.cwd.as_deref());
    if let Err(e) = identity::write_identity(&dir, &IdentityFile::for_agent(&agent)) {
        warn!(error = %e, "failed to write identity file");
    }
    info!(agent_id = %agent.agent_id, role = %agent.role, status, "agent registered");
    let agent_id = agent.agent_id.clone();
    Ok(json!({ "status": status, "agent_id": agent_id, "agent": agent }))
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    include_deleted: bool,
    #[serde(flatten)]
    page: PageParams,
}

pub fn list(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: ListParams = parse(&params)?;
    let page = p.page.normalized();
    let filter = AgentFilter { role: p.role, include_deleted: p.include_deleted };
    let (items, total) =
        ctx.store.list_agents(&filter, page.offset(), page.page_size).map_err(store_err)?;
    Ok(serde_json::to_value(Page::new(items, total, page))
        .map_err(|e| RpcError::internal(e.to_string()))?)
}

pub fn whoami(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let caller: CallerParams = parse(&params)?;
    let (agent_id, source) = ctx
        .identity
        .resolve(caller.caller_agent_id.as_deref(), caller.cwd.as_deref())
        .map_err(|e| RpcError::ambiguous_identity(e.to_string()))?;
    let agent = ctx.store.get_agent(agent_id.as_str()).map_err(store_err)?;
    Ok(json!({ "agent_id": agent_id, "source": source, "agent": agent }))
}

#[derive(Deserialize)]
struct DeleteParams {
    agent_id: String,
    #[serde(flatten)]
    caller: CallerParams,
}

pub fn delete(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: DeleteParams = parse(&params)?;
    let agent_id = AgentId::new(p.agent_id);
    ctx.store.delete_agent(&agent_id, ctx.now_ms()).map_err(store_err)?;
    let dir = ctx.identity.identities_dir_for(p.caller.cwd.as_deref());
    if let Err(e) = identity::remove_identity(&dir, &agent_id) {
        warn!(error = %e, "failed to remove identity file");
    }
    Ok(json!({ "deleted": agent_id }))
}

#[derive(Deserialize)]
struct CleanupParams {
    #[serde(default)]
    older_than_ms: Option<u64>,
}

pub fn cleanup(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: CleanupParams = parse(&params)?;
    let threshold = p.older_than_ms.unwrap_or(DEFAULT_CLEANUP_MS);
    let removed = ctx.store.cleanup_agents(threshold, ctx.now_ms()).map_err(store_err)?;
    Ok(json!({ "removed": removed, "removed_count": removed.len() }))
}

#[derive(Deserialize)]
struct PageOnly {
    #[serde(flatten)]
    page: PageParams,
}

pub fn list_context(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: PageOnly = parse(&params)?;
    let page = p.page.normalized();
    let (items, total) =
        ctx.store.list_contexts(page.offset(), page.page_size).map_err(store_err)?;
    Ok(serde_json::to_value(Page::new(items, total, page))
        .map_err(|e| RpcError::internal(e.to_string()))?)
}
