// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-RPC 2.0 envelopes and the application error-code table.

use serde::{Deserialize, Serialize};

pub const JSONRPC_VERSION: &str = "2.0";

/// A request or notification frame.
///
/// Requests carry a monotonically increasing integer `id` per connection;
/// notifications (server pushes) omit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), id: Some(id), method: method.into(), params }
    }

    /// A server-push frame without an id.
    pub fn notification(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), id: None, method: method.into(), params }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A response frame echoing the request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn result(id: Option<u64>, result: serde_json::Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), id, result: Some(result), error: None }
    }

    pub fn error(id: Option<u64>, error: RpcError) -> Self {
        Self { jsonrpc: JSONRPC_VERSION.to_string(), id, result: None, error: Some(error) }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Error kinds surfaced over RPC. Codes sit in the JSON-RPC reserved
/// range for protocol errors and -32000..-32006 for application errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ParseError,
    MethodNotFound,
    InvalidParams,
    Internal,
    NotFound,
    Conflict,
    AmbiguousIdentity,
    PermissionDenied,
    SlowConsumer,
    DaemonUnavailable,
    RedirectLoop,
}

impl ErrorKind {
    pub fn code(self) -> i64 {
        match self {
            ErrorKind::ParseError => -32700,
            ErrorKind::MethodNotFound => -32601,
            ErrorKind::InvalidParams => -32602,
            ErrorKind::Internal => -32603,
            ErrorKind::NotFound => -32000,
            ErrorKind::Conflict => -32001,
            ErrorKind::AmbiguousIdentity => -32002,
            ErrorKind::PermissionDenied => -32003,
            ErrorKind::SlowConsumer => -32004,
            ErrorKind::DaemonUnavailable => -32005,
            ErrorKind::RedirectLoop => -32006,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::ParseError => "parse_error",
            ErrorKind::MethodNotFound => "method_not_found",
            ErrorKind::InvalidParams => "invalid_params",
            ErrorKind::Internal => "internal",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::AmbiguousIdentity => "ambiguous_identity",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::SlowConsumer => "slow_consumer",
            ErrorKind::DaemonUnavailable => "daemon_unavailable",
            ErrorKind::RedirectLoop => "redirect_loop",
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -32700 => Some(ErrorKind::ParseError),
            -32601 => Some(ErrorKind::MethodNotFound),
            -32602 => Some(ErrorKind::InvalidParams),
            -32603 => Some(ErrorKind::Internal),
            -32000 => Some(ErrorKind::NotFound),
            -32001 => Some(ErrorKind::Conflict),
            -32002 => Some(ErrorKind::AmbiguousIdentity),
            -32003 => Some(ErrorKind::PermissionDenied),
            -32004 => Some(ErrorKind::SlowConsumer),
            -32005 => Some(ErrorKind::DaemonUnavailable),
            -32006 => Some(ErrorKind::RedirectLoop),
            _ => None,
        }
    }
}

/// The standard `{code, message, data?}` error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { code: kind.code(), message: message.into(), data: None }
    }

    pub fn with_data(kind: ErrorKind, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self { code: kind.code(), message: message.into(), data: Some(data) }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        ErrorKind::from_code(self.code)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorKind::MethodNotFound, format!("unknown method: {}", method))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self::with_data(ErrorKind::Conflict, message, data)
    }

    pub fn ambiguous_identity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AmbiguousIdentity, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn redirect_loop(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RedirectLoop, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
