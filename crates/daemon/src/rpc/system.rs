// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health and introspection methods.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use thrum_storage::AgentFilter;
use thrum_wire::RpcError;

use crate::ctx::DaemonCtx;
use crate::env::PROTOCOL_VERSION;

use super::{parse, store_err, CallerParams};

pub fn ping(ctx: &Arc<DaemonCtx>) -> Result<Value, RpcError> {
    Ok(json!({ "ok": true, "daemon_id": ctx.store.daemon_id() }))
}

pub fn health(ctx: &Arc<DaemonCtx>) -> Result<Value, RpcError> {
    let (_, agents) =
        ctx.store.list_agents(&AgentFilter::default(), 0, 1).map_err(store_err)?;
    let (_, sessions) = ctx.store.list_sessions(None, true, 0, 1).map_err(store_err)?;
    let events = ctx.store.event_count().map_err(store_err)?;
    let status = ctx.sync.status(0);

    Ok(json!({
        "ok": true,
        "daemon_id": ctx.store.daemon_id(),
        "protocol_version": PROTOCOL_VERSION,
        "started_at": ctx.started_at_ms,
        "uptime_ms": ctx.start_time.elapsed().as_millis() as u64,
        "ws_port": ctx.ws_port(),
        "repo_path": ctx.paths.worktree,
        "counts": {
            "agents": agents,
            "active_sessions": sessions,
            "events": events,
        },
        "sync_state": status.sync_state,
    }))
}

/// Roster view: every live agent with its active sessions and declared
/// work context.
pub fn team_list(ctx: &Arc<DaemonCtx>, _params: Value) -> Result<Value, RpcError> {
    let (agents, total) =
        ctx.store.list_agents(&AgentFilter::default(), 0, 500).map_err(store_err)?;
    let mut items = Vec::with_capacity(agents.len());
    for agent in agents {
        let sessions =
            ctx.store.active_sessions_for_agent(agent.agent_id.as_str()).map_err(store_err)?;
        let context = ctx.store.get_context(agent.agent_id.as_str()).map_err(store_err)?;
        items.push(json!({
            "agent": agent,
            "active_sessions": sessions,
            "intent": context.as_ref().and_then(|c| c.intent.clone()),
            "current_task": context.as_ref().and_then(|c| c.current_task.clone()),
        }));
    }
    Ok(json!({ "team": items, "total": total }))
}

#[derive(Deserialize)]
struct ContextShowParams {
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(flatten)]
    caller: CallerParams,
}

/// Show the work context for an agent (the caller by default).
pub fn context_show(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: ContextShowParams = parse(&params)?;
    let agent_id = match p.agent_id {
        Some(agent_id) => agent_id,
        None => {
            let (resolved, _) = ctx
                .identity
                .resolve(p.caller.caller_agent_id.as_deref(), p.caller.cwd.as_deref())
                .map_err(|e| RpcError::ambiguous_identity(e.to_string()))?;
            resolved.as_str().to_string()
        }
    };
    let context = ctx
        .store
        .get_context(&agent_id)
        .map_err(store_err)?
        .ok_or_else(|| RpcError::not_found(format!("no context for {}", agent_id)))?;
    Ok(json!({ "context": context }))
}
