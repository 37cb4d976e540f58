// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC dispatcher over the Unix socket.
//!
//! One task per connection; requests within a connection are handled
//! serially in id order. A handler races against client disconnect via a
//! per-connection CancellationToken so an abandoned `peer.wait_pairing`
//! does not linger.

mod agents;
mod groups;
mod messages;
mod peers;
mod sessions;
mod subscriptions;
mod system;
mod threads;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use thrum_storage::StoreError;
use thrum_wire::{write_json, ProtocolError, RpcError, RpcRequest, RpcResponse};

use crate::ctx::DaemonCtx;
use crate::env::ipc_timeout;
use crate::subs::ConnId;

/// Common optional parameters accepted by every method.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallerParams {
    #[serde(default)]
    pub caller_agent_id: Option<String>,
    /// Working directory the client reports, for worktree-scoped
    /// identity resolution.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

/// Per-connection state handed to handlers.
pub struct ConnState {
    /// Set for WebSocket connections; subscriptions need the connection.
    pub conn_id: Option<ConnId>,
    /// Cancelled when the client disconnects.
    pub cancel: CancellationToken,
}

impl ConnState {
    pub fn unix() -> Self {
        Self { conn_id: None, cancel: CancellationToken::new() }
    }

    pub fn ws(conn_id: ConnId, cancel: CancellationToken) -> Self {
        Self { conn_id: Some(conn_id), cancel }
    }
}

/// Accept loop for the Unix socket.
pub async fn listen(ctx: Arc<DaemonCtx>, listener: UnixListener, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("rpc listener stopping");
                return;
            }
            result = listener.accept() => match result {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&ctx);
                    let conn_cancel = cancel.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(ctx, stream, conn_cancel).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!("unix accept error: {}", e),
            }
        }
    }
}

fn log_connection_error(e: ProtocolError) {
    match e {
        ProtocolError::ConnectionClosed => debug!("client disconnected"),
        ProtocolError::Timeout => warn!("connection timed out"),
        other => error!("connection error: {}", other),
    }
}

/// Serve one client connection until it closes.
async fn handle_connection(
    ctx: Arc<DaemonCtx>,
    stream: tokio::net::UnixStream,
    cancel: CancellationToken,
) -> Result<(), ProtocolError> {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);
    let mut conn = ConnState { conn_id: None, cancel };

    loop {
        // Idle connections may wait indefinitely for the next request.
        let line = match read_request_line(&mut reader).await? {
            Some(line) => line,
            None => break,
        };
        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                let response = RpcResponse::error(
                    None,
                    RpcError::new(thrum_wire::ErrorKind::ParseError, e.to_string()),
                );
                write_json(&mut write, &response, ipc_timeout()).await?;
                continue;
            }
        };

        // Race the handler against client disconnect. In the serialized
        // protocol the client sends nothing until it has our response, so
        // EOF here means it went away.
        let response = tokio::select! {
            response = dispatch(&ctx, request, &mut conn) => response,
            _ = conn_closed(&mut reader) => {
                conn.cancel.cancel();
                debug!("client disconnected, cancelling handler");
                return Ok(());
            }
        };

        write_json(&mut write, &response, ipc_timeout()).await?;
    }

    let _ = write.shutdown().await;
    Ok(())
}

/// Read one request line without an idle timeout. `None` on EOF.
async fn read_request_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<String>, ProtocolError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    if n > thrum_wire::MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(n));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

/// Resolves only when the peer has closed the connection. Pipelined data
/// parks this future instead; the in-flight handler keeps running.
async fn conn_closed<R: AsyncBufRead + Unpin>(reader: &mut R) {
    match reader.fill_buf().await {
        Ok(buf) if buf.is_empty() => {}
        Ok(_) => std::future::pending::<()>().await,
        Err(_) => {}
    }
}

/// Dispatch one request to its handler. Shared by the socket and
/// WebSocket transports.
pub async fn dispatch(ctx: &Arc<DaemonCtx>, request: RpcRequest, conn: &mut ConnState) -> RpcResponse {
    let id = request.id;
    let method = request.method.clone();
    debug!(method = %method, id = ?id, "rpc request");

    let result = route(ctx, &method, request.params, conn).await;
    match result {
        Ok(value) => RpcResponse::result(id, value),
        Err(error) => {
            debug!(method = %method, code = error.code, "rpc error: {}", error.message);
            RpcResponse::error(id, error)
        }
    }
}

async fn route(
    ctx: &Arc<DaemonCtx>,
    method: &str,
    params: Value,
    conn: &mut ConnState,
) -> Result<Value, RpcError> {
    match method {
        // Agent & identity
        "agent.register" => agents::register(ctx, params),
        "agent.list" => agents::list(ctx, params),
        "agent.whoami" => agents::whoami(ctx, params),
        "agent.delete" => agents::delete(ctx, params),
        "agent.cleanup" => agents::cleanup(ctx, params),
        "agent.listContext" => agents::list_context(ctx, params),

        // Sessions
        "session.start" => sessions::start(ctx, params),
        "session.end" => sessions::end(ctx, params),
        "session.heartbeat" => sessions::heartbeat(ctx, params),
        "session.setIntent" => sessions::set_intent(ctx, params),
        "session.setTask" => sessions::set_task(ctx, params),
        "session.list" => sessions::list(ctx, params),

        // Messaging
        "message.send" => messages::send(ctx, params),
        "message.list" => messages::list(ctx, params),
        "message.get" => messages::get(ctx, params),
        "message.edit" => messages::edit(ctx, params),
        "message.delete" => messages::delete(ctx, params),
        "message.markRead" => messages::mark_read(ctx, params),

        // Threads
        "thread.create" => threads::create(ctx, params),
        "thread.list" => threads::list(ctx, params),
        "thread.get" => threads::get(ctx, params),

        // Groups
        "group.create" => groups::create(ctx, params),
        "group.delete" => groups::delete(ctx, params),
        "group.list" => groups::list(ctx, params),
        "group.info" => groups::info(ctx, params),
        "group.members" => groups::members(ctx, params),
        "group.member.add" => groups::member_add(ctx, params),
        "group.member.remove" => groups::member_remove(ctx, params),

        // Subscriptions
        "subscribe" => subscriptions::subscribe(ctx, params, conn),
        "unsubscribe" => subscriptions::unsubscribe(ctx, params),
        "subscriptions.list" => subscriptions::list(ctx, params),

        // Sync & peers
        "sync.force" | "tsync.force" => peers::sync_force(ctx).await,
        "sync.status" => peers::sync_status(ctx),
        "peer.start_pairing" => peers::start_pairing(ctx, params),
        "peer.wait_pairing" => peers::wait_pairing(ctx, conn).await,
        "peer.join" => peers::join(ctx, params).await,
        "peer.list" | "tsync.peers.list" => peers::list(ctx, params),
        "peer.remove" => peers::remove(ctx, params),
        "peer.status" => peers::status(ctx),
        "tsync.peers.add" => peers::add_manual(ctx, params),

        // Health & introspection
        "health" => system::health(ctx),
        "daemon.ping" => system::ping(ctx),
        "team.list" => system::team_list(ctx, params),
        "context.show" => system::context_show(ctx, params),

        other => Err(RpcError::method_not_found(other)),
    }
}

/// Map store errors to the RPC envelope.
pub(crate) fn store_err(e: StoreError) -> RpcError {
    match e {
        StoreError::NotFound(msg) => RpcError::not_found(msg),
        StoreError::Conflict(msg) => RpcError::conflict(msg, Value::Null),
        StoreError::PermissionDenied(msg) => RpcError::permission_denied(msg),
        other => RpcError::internal(other.to_string()),
    }
}

/// Parse typed params, mapping failures to `invalid_params`.
pub(crate) fn parse<T: serde::de::DeserializeOwned>(params: &Value) -> Result<T, RpcError> {
    serde_json::from_value(normalize_params(params)).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn normalize_params(params: &Value) -> Value {
    if params.is_null() {
        Value::Object(Default::default())
    } else {
        params.clone()
    }
}

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
