// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription methods. Live delivery needs a WebSocket connection;
//! the stored rows are visible over both transports.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use thrum_core::{SessionId, SubFilter};
use thrum_wire::{Page, PageParams, RpcError};

use crate::ctx::DaemonCtx;

use super::{parse, store_err, CallerParams, ConnState};

#[derive(Deserialize)]
struct SubscribeParams {
    session_id: String,
    filter: SubFilter,
    #[serde(flatten)]
    #[allow(dead_code)]
    caller: CallerParams,
}

pub fn subscribe(
    ctx: &Arc<DaemonCtx>,
    params: Value,
    conn: &mut ConnState,
) -> Result<Value, RpcError> {
    let Some(conn_id) = conn.conn_id else {
        return Err(RpcError::invalid_params(
            "subscribe requires a websocket connection; poll message.list over the socket",
        ));
    };
    let p: SubscribeParams = parse(&params)?;
    let session_id = SessionId::from_string(p.session_id);
    let session = ctx
        .store
        .get_session(session_id.as_str())
        .map_err(store_err)?
        .ok_or_else(|| RpcError::not_found(format!("session {}", session_id)))?;
    if !session.is_active() {
        return Err(RpcError::not_found(format!("active session {}", session_id)));
    }

    let stored =
        ctx.store.add_subscription(&session_id, &p.filter, ctx.now_ms()).map_err(store_err)?;
    ctx.subs.subscribe(conn_id, &session_id, stored.subscription_id.clone(), p.filter);
    Ok(json!({ "subscription_id": stored.subscription_id }))
}

#[derive(Deserialize)]
struct UnsubscribeParams {
    subscription_id: String,
}

pub fn unsubscribe(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: UnsubscribeParams = parse(&params)?;
    ctx.store.remove_subscription(&p.subscription_id).map_err(store_err)?;
    ctx.subs.unsubscribe(&p.subscription_id);
    Ok(json!({ "unsubscribed": p.subscription_id }))
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(flatten)]
    page: PageParams,
}

pub fn list(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: ListParams = parse(&params)?;
    let page = p.page.normalized();
    let (items, total) = ctx
        .store
        .list_subscriptions(p.session_id.as_deref(), page.offset(), page.page_size)
        .map_err(store_err)?;
    let items: Vec<Value> = items
        .into_iter()
        .map(|sub| {
            json!({
                "subscription_id": sub.subscription_id,
                "session_id": sub.session_id,
                "filter": sub.filter,
                "created_at": sub.created_at,
            })
        })
        .collect();
    Ok(serde_json::to_value(Page::new(items, total, page))
        .map_err(|e| RpcError::internal(e.to_string()))?)
}
