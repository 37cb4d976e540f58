// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn request_round_trips() {
    let req = RpcRequest::new(7, "message.send", json!({"content": "hi"}));
    let line = serde_json::to_string(&req).unwrap();
    let back: RpcRequest = serde_json::from_str(&line).unwrap();
    assert_eq!(back, req);
    assert!(!back.is_notification());
}

#[test]
fn notification_omits_id() {
    let note = RpcRequest::notification("message.created", json!({}));
    assert!(note.is_notification());
    let value = serde_json::to_value(&note).unwrap();
    assert!(value.get("id").is_none());
}

#[test]
fn params_default_to_null() {
    let req: RpcRequest = serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"health"}"#).unwrap();
    assert!(req.params.is_null());
}

#[test]
fn response_carries_result_xor_error() {
    let ok = RpcResponse::result(Some(1), json!({"ok": true}));
    assert!(!ok.is_error());
    let err = RpcResponse::error(Some(2), RpcError::not_found("no such message"));
    assert!(err.is_error());
    let value = serde_json::to_value(&err).unwrap();
    assert!(value.get("result").is_none());
    assert_eq!(value["error"]["code"], -32000);
}

#[test]
fn error_codes_are_stable() {
    assert_eq!(ErrorKind::InvalidParams.code(), -32602);
    assert_eq!(ErrorKind::NotFound.code(), -32000);
    assert_eq!(ErrorKind::Conflict.code(), -32001);
    assert_eq!(ErrorKind::AmbiguousIdentity.code(), -32002);
    assert_eq!(ErrorKind::PermissionDenied.code(), -32003);
    assert_eq!(ErrorKind::SlowConsumer.code(), -32004);
    assert_eq!(ErrorKind::DaemonUnavailable.code(), -32005);
    assert_eq!(ErrorKind::RedirectLoop.code(), -32006);
}

#[test]
fn error_kind_round_trips_through_code() {
    for kind in [
        ErrorKind::ParseError,
        ErrorKind::MethodNotFound,
        ErrorKind::InvalidParams,
        ErrorKind::Internal,
        ErrorKind::NotFound,
        ErrorKind::Conflict,
        ErrorKind::AmbiguousIdentity,
        ErrorKind::PermissionDenied,
        ErrorKind::SlowConsumer,
        ErrorKind::DaemonUnavailable,
        ErrorKind::RedirectLoop,
    ] {
        assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
    }
    assert_eq!(ErrorKind::from_code(-1), None);
}

#[test]
fn conflict_carries_data() {
    let err = RpcError::conflict("already registered", json!({"existing_agent_id": "impl_X"}));
    assert_eq!(err.kind(), Some(ErrorKind::Conflict));
    assert_eq!(err.data.unwrap()["existing_agent_id"], "impl_X");
}
