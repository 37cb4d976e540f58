// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote peer transport: pairing handshake and event-batch exchange
//! over WebSocket.
//!
//! Pairing is two-phase: one side opens a window (`peer.start_pairing`,
//! short-lived code), the other joins with the code. Success persists a
//! shared token presented on every later exchange; unknown or revoked
//! tokens disable sync for that peer until re-paired.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use thrum_core::{EventRecord, Peer, PeerInfo};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ctx::DaemonCtx;

use super::reconcile::apply_records;

/// Max events per push batch; the rest follows on the next cycle.
const BATCH_LIMIT: u64 = 500;

/// Frames exchanged between paired daemons.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PeerFrame {
    #[serde(rename = "peer.hello")]
    Hello { daemon_id: String, token: String, heads: HashMap<String, u64> },
    #[serde(rename = "peer.hello_ack")]
    HelloAck { daemon_id: String, heads: HashMap<String, u64> },
    #[serde(rename = "pair.request")]
    PairRequest {
        code: String,
        daemon_id: String,
        name: String,
        #[serde(default)]
        address: Option<String>,
    },
    #[serde(rename = "pair.ok")]
    PairOk { daemon_id: String, name: String, token: String },
    #[serde(rename = "events.push")]
    Push { events: Vec<EventRecord> },
    #[serde(rename = "events.push_ack")]
    PushAck { applied: u64 },
    #[serde(rename = "peer.error")]
    Error { code: String, message: String },
}

impl PeerFrame {
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Periodic outbound exchange with every paired peer.
pub async fn peer_loop(ctx: Arc<DaemonCtx>, cancel: CancellationToken) {
    let interval = Duration::from_millis(ctx.config.peer_sync_interval_ms.max(1_000));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("peer sync loop stopped");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let peers = match ctx.store.list_peers(0, 1_000) {
            Ok((peers, _)) => peers,
            Err(e) => {
                warn!(error = %e, "cannot list peers");
                continue;
            }
        };
        for peer in peers {
            if peer.sync_disabled || peer.auth_token.is_none() || peer.address.is_empty() {
                continue;
            }
            if let Err(e) = sync_with_peer(&ctx, &peer).await {
                debug!(peer = %peer.daemon_id, error = %e, "peer exchange failed");
            }
        }
    }
}

/// One full exchange with a peer, client side.
pub async fn sync_with_peer(ctx: &Arc<DaemonCtx>, peer: &Peer) -> Result<(), String> {
    let token = peer.auth_token.clone().ok_or("peer has no auth token")?;
    let url = format!("ws://{}/", peer.address);
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.map_err(|e| e.to_string())?;
    let (mut sink, mut stream) = ws.split();

    let our_heads = ctx.store.origin_heads().map_err(|e| e.to_string())?;
    let hello = PeerFrame::Hello {
        daemon_id: ctx.store.daemon_id().to_string(),
        token,
        heads: our_heads,
    };
    sink.send(WsMessage::text(hello.encode())).await.map_err(|e| e.to_string())?;

    let their_heads = match read_frame(&mut stream).await? {
        PeerFrame::HelloAck { heads, .. } => heads,
        PeerFrame::Error { code, message } => {
            if code == "unauthorized" {
                warn!(peer = %peer.daemon_id, "token rejected, disabling sync until re-pair");
                let _ = ctx.store.set_peer_sync_disabled(&peer.daemon_id, true);
            }
            return Err(format!("peer error: {}", message));
        }
        other => return Err(format!("unexpected frame: {:?}", other)),
    };

    // Server pushes what we lack first.
    match read_frame(&mut stream).await? {
        PeerFrame::Push { events } => {
            let summary = apply_records(ctx, &events);
            let ack = PeerFrame::PushAck { applied: summary.applied };
            sink.send(WsMessage::text(ack.encode())).await.map_err(|e| e.to_string())?;
        }
        other => return Err(format!("expected events.push, got {:?}", other)),
    }

    // Then we push what they lack.
    let outgoing = events_peer_lacks(ctx, &their_heads).map_err(|e| e.to_string())?;
    let push = PeerFrame::Push { events: outgoing };
    sink.send(WsMessage::text(push.encode())).await.map_err(|e| e.to_string())?;
    match read_frame(&mut stream).await? {
        PeerFrame::PushAck { applied } => {
            debug!(peer = %peer.daemon_id, applied, "peer applied our events");
        }
        other => return Err(format!("expected push_ack, got {:?}", other)),
    }

    let _ = sink.send(WsMessage::Close(None)).await;
    ctx.store
        .record_peer_sync(&peer.daemon_id, &their_heads, ctx.now_ms())
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// Serve an inbound peer session; `first` is the frame that identified
/// the connection as peer traffic.
pub async fn serve_peer<S>(
    ctx: &Arc<DaemonCtx>,
    ws: &mut tokio_tungstenite::WebSocketStream<S>,
    first: PeerFrame,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    match first {
        PeerFrame::PairRequest { code, daemon_id, name, address } => {
            serve_pair_request(ctx, ws, code, daemon_id, name, address).await;
        }
        PeerFrame::Hello { daemon_id, token, heads } => {
            serve_exchange(ctx, ws, daemon_id, token, heads).await;
        }
        other => {
            let frame = PeerFrame::Error {
                code: "protocol".to_string(),
                message: format!("unexpected opening frame: {:?}", other),
            };
            let _ = ws.send(WsMessage::text(frame.encode())).await;
        }
    }
}

async fn serve_pair_request<S>(
    ctx: &Arc<DaemonCtx>,
    ws: &mut tokio_tungstenite::WebSocketStream<S>,
    code: String,
    daemon_id: String,
    name: String,
    address: Option<String>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let now = ctx.now_ms();
    if !ctx.sync.pairing_code_valid(&code, now) {
        let frame = PeerFrame::Error {
            code: "bad_code".to_string(),
            message: "unknown or expired pairing code".to_string(),
        };
        let _ = ws.send(WsMessage::text(frame.encode())).await;
        return;
    }

    let token = nanoid::nanoid!(32);
    let peer = Peer {
        daemon_id: daemon_id.clone(),
        name: name.clone(),
        address: address.unwrap_or_default(),
        paired_at: now,
        last_sync: None,
        last_synced_seq: HashMap::new(),
        auth_token: Some(token.clone()),
        sync_disabled: false,
    };
    let info = peer.info();
    if let Err(e) = ctx.store.upsert_peer(peer, now) {
        warn!(error = %e, "failed to persist paired peer");
        let frame =
            PeerFrame::Error { code: "internal".to_string(), message: e.to_string() };
        let _ = ws.send(WsMessage::text(frame.encode())).await;
        return;
    }

    let our_name = ctx
        .config
        .daemon_name
        .clone()
        .unwrap_or_else(|| ctx.paths.worktree.display().to_string());
    let ok = PeerFrame::PairOk {
        daemon_id: ctx.store.daemon_id().to_string(),
        name: our_name,
        token,
    };
    if ws.send(WsMessage::text(ok.encode())).await.is_ok() {
        info!(peer = %daemon_id, name = %name, "peer paired");
        ctx.sync.complete_pairing(info);
    }
}

async fn serve_exchange<S>(
    ctx: &Arc<DaemonCtx>,
    ws: &mut tokio_tungstenite::WebSocketStream<S>,
    daemon_id: String,
    token: String,
    their_heads: HashMap<String, u64>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let peer = match ctx.store.peer_by_token(&token) {
        Ok(Some(peer)) if !peer.sync_disabled => peer,
        _ => {
            warn!(peer = %daemon_id, "rejecting unknown or revoked peer token");
            let frame = PeerFrame::Error {
                code: "unauthorized".to_string(),
                message: "unknown or revoked token".to_string(),
            };
            let _ = ws.send(WsMessage::text(frame.encode())).await;
            return;
        }
    };

    let our_heads = match ctx.store.origin_heads() {
        Ok(heads) => heads,
        Err(e) => {
            warn!(error = %e, "cannot read origin heads");
            return;
        }
    };
    let ack =
        PeerFrame::HelloAck { daemon_id: ctx.store.daemon_id().to_string(), heads: our_heads };
    if ws.send(WsMessage::text(ack.encode())).await.is_err() {
        return;
    }

    // Push what the peer lacks, then apply what it pushes back.
    let outgoing = match events_peer_lacks(ctx, &their_heads) {
        Ok(events) => events,
        Err(e) => {
            warn!(error = %e, "cannot collect events for peer");
            return;
        }
    };
    if ws.send(WsMessage::text(PeerFrame::Push { events: outgoing }.encode())).await.is_err() {
        return;
    }

    while let Some(Ok(message)) = ws.next().await {
        let WsMessage::Text(raw) = message else {
            if matches!(message, WsMessage::Close(_)) {
                break;
            }
            continue;
        };
        match PeerFrame::decode(&raw) {
            Some(PeerFrame::Push { events }) => {
                let summary = apply_records(ctx, &events);
                let ack = PeerFrame::PushAck { applied: summary.applied };
                if ws.send(WsMessage::text(ack.encode())).await.is_err() {
                    break;
                }
                let _ = ctx.store.record_peer_sync(&peer.daemon_id, &their_heads, ctx.now_ms());
            }
            Some(PeerFrame::PushAck { .. }) => {}
            Some(other) => {
                debug!(frame = ?other, "ignoring unexpected peer frame");
            }
            None => break,
        }
    }
}

/// Join a pairing window opened on another daemon.
pub async fn pair_join(
    ctx: &Arc<DaemonCtx>,
    code: &str,
    address: &str,
    name: Option<String>,
) -> Result<Peer, String> {
    let url = format!("ws://{}/", address);
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await.map_err(|e| e.to_string())?;
    let (mut sink, mut stream) = ws.split();

    let our_name = name
        .or_else(|| ctx.config.daemon_name.clone())
        .unwrap_or_else(|| ctx.paths.worktree.display().to_string());
    let our_address = format!("127.0.0.1:{}", ctx.ws_port());
    let request = PeerFrame::PairRequest {
        code: code.to_string(),
        daemon_id: ctx.store.daemon_id().to_string(),
        name: our_name,
        address: Some(our_address),
    };
    sink.send(WsMessage::text(request.encode())).await.map_err(|e| e.to_string())?;

    match read_frame(&mut stream).await? {
        PeerFrame::PairOk { daemon_id, name, token } => {
            let now = ctx.now_ms();
            let peer = Peer {
                daemon_id,
                name,
                address: address.to_string(),
                paired_at: now,
                last_sync: None,
                last_synced_seq: HashMap::new(),
                auth_token: Some(token),
                sync_disabled: false,
            };
            ctx.store.upsert_peer(peer.clone(), now).map_err(|e| e.to_string())?;
            info!(peer = %peer.daemon_id, "joined pairing");
            Ok(peer)
        }
        PeerFrame::Error { message, .. } => Err(message),
        other => Err(format!("unexpected frame: {:?}", other)),
    }
}

/// Events the peer lacks according to its per-origin heads.
fn events_peer_lacks(
    ctx: &Arc<DaemonCtx>,
    their_heads: &HashMap<String, u64>,
) -> Result<Vec<EventRecord>, thrum_storage::StoreError> {
    let ours = ctx.store.origin_heads()?;
    let mut out = Vec::new();
    for (origin, our_head) in ours {
        let their_head = their_heads.get(&origin).copied().unwrap_or(0);
        if our_head > their_head {
            out.extend(ctx.store.events_for_origin_after(&origin, their_head, BATCH_LIMIT)?);
        }
    }
    Ok(out)
}

async fn read_frame<S>(
    stream: &mut futures_util::stream::SplitStream<tokio_tungstenite::WebSocketStream<S>>,
) -> Result<PeerFrame, String>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(WsMessage::Text(raw))) => {
                return PeerFrame::decode(&raw).ok_or_else(|| "bad peer frame".to_string());
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
            Some(Ok(WsMessage::Close(_))) | None => return Err("peer closed".to_string()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.to_string()),
        }
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
