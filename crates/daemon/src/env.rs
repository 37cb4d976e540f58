// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment knobs and protocol constants.

use std::time::Duration;

/// Protocol version reported by `health`.
pub const PROTOCOL_VERSION: &str = "1";

/// Environment variable naming the default agent for this worktree,
/// captured once at daemon start.
pub const ENV_AGENT_HINT: &str = "THRUM_AGENT";

/// Override for the socket IPC timeout, in milliseconds.
const ENV_IPC_TIMEOUT_MS: &str = "THRUM_IPC_TIMEOUT_MS";

const DEFAULT_IPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout applied to socket reads/writes of one frame.
pub fn ipc_timeout() -> Duration {
    std::env::var(ENV_IPC_TIMEOUT_MS)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_IPC_TIMEOUT)
}

/// How long `peer.wait_pairing` may block.
pub const WAIT_PAIRING_TIMEOUT: Duration = Duration::from_secs(300);

/// Lifetime of a pairing code.
pub const PAIRING_CODE_TTL: Duration = Duration::from_secs(300);

/// Timeout for git subprocess invocations.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-subscriber send buffer; overflow closes the subscriber.
pub const SUBSCRIBER_BUFFER: usize = 256;
