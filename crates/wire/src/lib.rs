// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for daemon communication.
//!
//! Wire format: newline-delimited JSON, each line a JSON-RPC 2.0 request,
//! response, or notification. The same frames travel over the Unix socket
//! and WebSocket text messages.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod page;
mod rpc;

pub use codec::{read_frame, read_request, write_json, ProtocolError, MAX_FRAME_BYTES};
pub use page::{Page, PageParams, MAX_PAGE_SIZE};
pub use rpc::{ErrorKind, RpcError, RpcRequest, RpcResponse, JSONRPC_VERSION};
