// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync and peer methods.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use thrum_core::Peer;
use thrum_wire::{Page, PageParams, RpcError};

use crate::ctx::DaemonCtx;
use crate::env::WAIT_PAIRING_TIMEOUT;
use crate::sync::transport;

use super::{parse, store_err, ConnState};

pub async fn sync_force(ctx: &Arc<DaemonCtx>) -> Result<Value, RpcError> {
    match ctx.sync.force().await {
        Ok(committed) => Ok(json!({ "committed": committed })),
        Err(reason) => Err(RpcError::internal(reason)),
    }
}

pub fn sync_status(ctx: &Arc<DaemonCtx>) -> Result<Value, RpcError> {
    let pending = pending_events(ctx)?;
    let status = ctx.sync.status(pending);
    let (peers, _) = ctx.store.list_peers(0, 1_000).map_err(store_err)?;
    let peers: Vec<Value> = peers.iter().map(peer_view).collect();
    let mut value =
        serde_json::to_value(status).map_err(|e| RpcError::internal(e.to_string()))?;
    if let Some(map) = value.as_object_mut() {
        map.insert("peers".to_string(), Value::Array(peers));
    }
    Ok(value)
}

fn pending_events(ctx: &Arc<DaemonCtx>) -> Result<u64, RpcError> {
    let watermark: i64 = ctx
        .store
        .get_meta("sync.committed_rowid")
        .map_err(store_err)?
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);
    let last = ctx.store.last_event_rowid().map_err(store_err)?;
    Ok(last.saturating_sub(watermark) as u64)
}

pub fn start_pairing(ctx: &Arc<DaemonCtx>, _params: Value) -> Result<Value, RpcError> {
    let now = ctx.now_ms();
    let (code, expires_at, _rx) = ctx.sync.begin_pairing(now);
    Ok(json!({
        "code": code,
        "expires_at": expires_at,
        "address": format!("127.0.0.1:{}", ctx.ws_port()),
    }))
}

/// Blocks until the open pairing window is joined. Honors client
/// disconnect through the connection cancel token.
pub async fn wait_pairing(ctx: &Arc<DaemonCtx>, conn: &mut ConnState) -> Result<Value, RpcError> {
    let Some((_expires_at, mut rx)) = ctx.sync.watch_pairing() else {
        return Err(RpcError::not_found("no pairing in progress"));
    };

    let wait = async {
        loop {
            if let Some(peer) = rx.borrow_and_update().clone() {
                return Some(peer);
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    };

    tokio::select! {
        result = tokio::time::timeout(WAIT_PAIRING_TIMEOUT, wait) => match result {
            Ok(Some(peer)) => Ok(json!({ "paired": true, "peer": peer })),
            Ok(None) => Err(RpcError::internal("pairing window closed")),
            Err(_) => Ok(json!({ "paired": false, "reason": "timeout" })),
        },
        _ = conn.cancel.cancelled() => Err(RpcError::internal("cancelled")),
    }
}

#[derive(Deserialize)]
struct JoinParams {
    code: String,
    address: String,
    #[serde(default)]
    name: Option<String>,
}

pub async fn join(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: JoinParams = parse(&params)?;
    let peer = transport::pair_join(ctx, &p.code, &p.address, p.name)
        .await
        .map_err(RpcError::internal)?;
    Ok(json!({ "peer": peer_view(&peer) }))
}

#[derive(Deserialize)]
struct PageOnly {
    #[serde(flatten)]
    page: PageParams,
}

pub fn list(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: PageOnly = parse(&params)?;
    let page = p.page.normalized();
    let (peers, total) =
        ctx.store.list_peers(page.offset(), page.page_size).map_err(store_err)?;
    let items: Vec<Value> = peers.iter().map(peer_view).collect();
    Ok(serde_json::to_value(Page::new(items, total, page))
        .map_err(|e| RpcError::internal(e.to_string()))?)
}

#[derive(Deserialize)]
struct RemoveParams {
    daemon_id: String,
}

pub fn remove(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: RemoveParams = parse(&params)?;
    ctx.store.remove_peer(&p.daemon_id, ctx.now_ms()).map_err(store_err)?;
    Ok(json!({ "removed": p.daemon_id }))
}

pub fn status(ctx: &Arc<DaemonCtx>) -> Result<Value, RpcError> {
    let (peers, _) = ctx.store.list_peers(0, 1_000).map_err(store_err)?;
    let items: Vec<Value> = peers.iter().map(peer_view).collect();
    Ok(json!({ "peers": items }))
}

#[derive(Deserialize)]
struct AddManualParams {
    daemon_id: String,
    address: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

/// Manual peer add (`tsync.peers.add`): for peers provisioned out of
/// band, e.g. by infrastructure that already shares a token.
pub fn add_manual(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: AddManualParams = parse(&params)?;
    let now = ctx.now_ms();
    let peer = Peer {
        daemon_id: p.daemon_id,
        name: p.name.unwrap_or_default(),
        address: p.address,
        paired_at: now,
        last_sync: None,
        last_synced_seq: HashMap::new(),
        auth_token: p.token,
        sync_disabled: false,
    };
    ctx.store.upsert_peer(peer.clone(), now).map_err(store_err)?;
    Ok(json!({ "peer": peer_view(&peer) }))
}

/// Token-free peer view for responses.
fn peer_view(peer: &Peer) -> Value {
    json!({
        "daemon_id": peer.daemon_id,
        "name": peer.name,
        "address": peer.address,
        "paired_at": peer.paired_at,
        "last_sync": peer.last_sync,
        "last_synced_seq": peer.last_synced_seq,
        "sync_disabled": peer.sync_disabled,
    })
}
