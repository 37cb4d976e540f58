// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket listener: live subscribers, JSON-RPC over WebSocket, and
//! inbound peer sync sessions.
//!
//! The first text frame decides what a connection is: a `pair.*` or
//! `peer.*` frame starts a peer session, anything else is a JSON-RPC
//! client.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use thrum_wire::{RpcError, RpcRequest, RpcResponse};

use crate::ctx::DaemonCtx;
use crate::rpc::{self, ConnState};
use crate::sync::transport::{self, PeerFrame};

/// Accept loop for the WebSocket listener.
pub async fn listen(ctx: Arc<DaemonCtx>, listener: TcpListener, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("websocket listener stopping");
                return;
            }
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    debug!(%addr, "websocket connection");
                    let ctx = Arc::clone(&ctx);
                    let conn_cancel = cancel.child_token();
                    tokio::spawn(handle_socket(ctx, stream, conn_cancel));
                }
                Err(e) => error!("websocket accept error: {}", e),
            }
        }
    }
}

async fn handle_socket(ctx: Arc<DaemonCtx>, stream: TcpStream, cancel: CancellationToken) {
    let mut ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("websocket handshake failed: {}", e);
            return;
        }
    };

    // Read the first text frame to classify the connection.
    let first = loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => break text,
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
            Some(Ok(WsMessage::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!("websocket error before first frame: {}", e);
                return;
            }
        }
    };

    if let Some(frame) = classify_peer_frame(&first) {
        transport::serve_peer(&ctx, &mut ws, frame).await;
        let _ = ws.close(None).await;
        return;
    }

    client_session(ctx, ws, first.to_string(), cancel).await;
}

/// Peer frames carry a `type` of `peer.*` or `pair.*`.
fn classify_peer_frame(raw: &str) -> Option<PeerFrame> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let kind = value.get("type")?.as_str()?;
    if kind.starts_with("peer.") || kind.starts_with("pair.") {
        PeerFrame::decode(raw)
    } else {
        None
    }
}

/// Serve a JSON-RPC client over WebSocket, pushing subscription
/// notifications as they arrive.
async fn client_session(
    ctx: Arc<DaemonCtx>,
    ws: tokio_tungstenite::WebSocketStream<TcpStream>,
    first: String,
    cancel: CancellationToken,
) {
    let (conn_id, mut rx) = ctx.subs.register_conn();
    let mut conn = ConnState::ws(conn_id, cancel.clone());
    let (mut sink, mut stream) = ws.split();

    // The classifying read already consumed the first request.
    if let Some(response) = handle_text(&ctx, &first, &mut conn).await {
        if send_response(&mut sink, &response).await.is_err() {
            cleanup(&ctx, conn_id);
            return;
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            pushed = rx.recv() => match pushed {
                Some(note) => {
                    let raw = match serde_json::to_string(&note) {
                        Ok(raw) => raw,
                        Err(e) => {
                            warn!("cannot serialize notification: {}", e);
                            continue;
                        }
                    };
                    if sink.send(WsMessage::text(raw)).await.is_err() {
                        break;
                    }
                }
                None => {
                    // Registry dropped us: slow consumer.
                    let close = CloseFrame {
                        code: CloseCode::Policy,
                        reason: "slow_consumer".into(),
                    };
                    let _ = sink.send(WsMessage::Close(Some(close))).await;
                    break;
                }
            },

            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(response) = handle_text(&ctx, &text, &mut conn).await {
                        if send_response(&mut sink, &response).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("websocket error: {}", e);
                    break;
                }
            },
        }
    }

    cleanup(&ctx, conn_id);
}

/// Dispatch one text frame. Notifications produce no response frame.
async fn handle_text(
    ctx: &Arc<DaemonCtx>,
    raw: &str,
    conn: &mut ConnState,
) -> Option<RpcResponse> {
    let request: RpcRequest = match serde_json::from_str(raw) {
        Ok(request) => request,
        Err(e) => {
            return Some(RpcResponse::error(
                None,
                RpcError::new(thrum_wire::ErrorKind::ParseError, e.to_string()),
            ));
        }
    };
    let is_notification = request.is_notification();
    let response = rpc::dispatch(ctx, request, conn).await;
    if is_notification {
        None
    } else {
        Some(response)
    }
}

async fn send_response<S>(
    sink: &mut futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<S>,
        WsMessage,
    >,
    response: &RpcResponse,
) -> Result<(), ()>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let raw = serde_json::to_string(response).map_err(|_| ())?;
    sink.send(WsMessage::text(raw)).await.map_err(|_| ())
}

/// Remove registry state and stored subscriptions on disconnect.
fn cleanup(ctx: &Arc<DaemonCtx>, conn_id: crate::subs::ConnId) {
    if let Some(session_id) = ctx.subs.remove_conn(conn_id) {
        if !session_id.as_str().is_empty() {
            if let Err(e) = ctx.store.remove_session_subscriptions(session_id.as_str()) {
                warn!(session = %session_id, error = %e, "failed to drop subscriptions on disconnect");
            }
        }
    }
}
