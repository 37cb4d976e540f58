// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! thrum-client: local JSON-RPC client for the Thrum daemon socket.
//!
//! Used by tooling and tests. Transport failures after bounded reconnect
//! attempts surface as `daemon_unavailable`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{BufReader, ReadHalf, WriteHalf};
use tokio::net::UnixStream;
use tracing::debug;

use thrum_wire::{read_frame, write_json, ErrorKind, ProtocolError, RpcError, RpcRequest, RpcResponse};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BACKOFF: Duration = Duration::from_millis(100);

/// Client errors. `Rpc` carries the daemon's error envelope; everything
/// else is transport-level.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("daemon unavailable at {path}: {reason}")]
    DaemonUnavailable { path: PathBuf, reason: String },

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// The RPC error-kind equivalent, for uniform handling upstream.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::DaemonUnavailable { .. } => ErrorKind::DaemonUnavailable,
            ClientError::Rpc(err) => err.kind().unwrap_or(ErrorKind::Internal),
            ClientError::Protocol(_) => ErrorKind::Internal,
        }
    }
}

/// One connection to the daemon socket. Requests are issued serially with
/// increasing ids, matching the dispatcher's per-connection ordering.
pub struct Connection {
    reader: BufReader<ReadHalf<UnixStream>>,
    writer: WriteHalf<UnixStream>,
    next_id: u64,
}

impl Connection {
    /// Connect with bounded retries and backoff.
    pub async fn open(socket_path: &Path) -> Result<Self, ClientError> {
        let mut last_err = String::new();
        for attempt in 0..CONNECT_ATTEMPTS {
            match UnixStream::connect(socket_path).await {
                Ok(stream) => {
                    let (read, write) = tokio::io::split(stream);
                    return Ok(Self { reader: BufReader::new(read), writer: write, next_id: 1 });
                }
                Err(e) => {
                    debug!(attempt, error = %e, "daemon connect failed");
                    last_err = e.to_string();
                    tokio::time::sleep(CONNECT_BACKOFF * (attempt + 1)).await;
                }
            }
        }
        Err(ClientError::DaemonUnavailable { path: socket_path.to_path_buf(), reason: last_err })
    }

    /// Issue one call and wait for its response.
    pub async fn call(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        let id = self.next_id;
        self.next_id += 1;
        let request = RpcRequest::new(id, method, params);
        write_json(&mut self.writer, &request, CALL_TIMEOUT).await?;

        let line = read_frame(&mut self.reader, CALL_TIMEOUT).await?;
        let response: RpcResponse =
            serde_json::from_str(&line).map_err(ProtocolError::Json)?;
        if let Some(error) = response.error {
            return Err(ClientError::Rpc(error));
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }
}

/// Convenience handle: opens a fresh connection per call.
#[derive(Debug, Clone)]
pub struct Client {
    socket_path: PathBuf,
}

impl Client {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into() }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn connect(&self) -> Result<Connection, ClientError> {
        Connection::open(&self.socket_path).await
    }

    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        let mut conn = self.connect().await?;
        conn.call(method, params).await
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
