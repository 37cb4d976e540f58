// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use std::time::Duration;
use tokio::io::BufReader;

const T: Duration = Duration::from_secs(1);

#[tokio::test]
async fn reads_one_frame_per_line() {
    let data = b"{\"a\":1}\n{\"b\":2}\n";
    let mut reader = BufReader::new(&data[..]);
    assert_eq!(read_frame(&mut reader, T).await.unwrap(), "{\"a\":1}");
    assert_eq!(read_frame(&mut reader, T).await.unwrap(), "{\"b\":2}");
}

#[tokio::test]
async fn eof_is_connection_closed() {
    let mut reader = BufReader::new(&b""[..]);
    assert!(matches!(
        read_frame(&mut reader, T).await,
        Err(ProtocolError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn crlf_is_stripped() {
    let mut reader = BufReader::new(&b"{\"a\":1}\r\n"[..]);
    assert_eq!(read_frame(&mut reader, T).await.unwrap(), "{\"a\":1}");
}

#[tokio::test]
async fn read_request_decodes_envelope() {
    let data = b"{\"jsonrpc\":\"2.0\",\"id\":3,\"method\":\"health\",\"params\":{}}\n";
    let mut reader = BufReader::new(&data[..]);
    let req = read_request(&mut reader, T).await.unwrap();
    assert_eq!(req.id, Some(3));
    assert_eq!(req.method, "health");
}

#[tokio::test]
async fn malformed_json_is_an_error() {
    let mut reader = BufReader::new(&b"not json\n"[..]);
    assert!(matches!(
        read_request(&mut reader, T).await,
        Err(ProtocolError::Json(_))
    ));
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let mut buf = Vec::new();
    let req = crate::RpcRequest::new(1, "agent.list", json!({"page": 2}));
    write_json(&mut buf, &req, T).await.unwrap();
    assert!(buf.ends_with(b"\n"));

    let mut reader = BufReader::new(&buf[..]);
    let back = read_request(&mut reader, T).await.unwrap();
    assert_eq!(back, req);
}
