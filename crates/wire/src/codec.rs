// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newline-delimited JSON framing with timeouts.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::rpc::RpcRequest;

/// Upper bound on a single frame. Oversized frames close the connection.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Errors from frame reading/writing.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("timed out")]
    Timeout,

    #[error("frame too large ({0} bytes)")]
    FrameTooLarge(usize),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read one newline-terminated frame. Returns the line without its
/// terminator. EOF before any byte maps to `ConnectionClosed`.
pub async fn read_frame<R>(reader: &mut R, timeout: Duration) -> Result<String, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = tokio::time::timeout(timeout, reader.read_line(&mut line))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    if n == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    if n > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(n));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

/// Read and decode one JSON-RPC request frame.
pub async fn read_request<R>(reader: &mut R, timeout: Duration) -> Result<RpcRequest, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_frame(reader, timeout).await?;
    Ok(serde_json::from_str(&line)?)
}

/// Serialize `value` as one newline-terminated frame and flush.
pub async fn write_json<W, T>(writer: &mut W, value: &T, timeout: Duration) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf = serde_json::to_vec(value)?;
    if buf.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(buf.len()));
    }
    buf.push(b'\n');
    tokio::time::timeout(timeout, writer.write_all(&buf))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    tokio::time::timeout(timeout, writer.flush())
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    Ok(())
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
