// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! thrumd: the Thrum coordination daemon.
//!
//! Usage: `thrumd [repo-path]`. Binds the repository's `.thrum/` data
//! directory (following redirects), serves JSON-RPC over the Unix
//! socket and WebSocket, and replicates the event log.

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use thrum_daemon::lifecycle;

fn init_tracing(log_path: &std::path::Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_path.parent() {
        Some(dir) if std::fs::create_dir_all(dir).is_ok() => {
            let file_name = log_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let worktree = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    // Logs land under the local .thrum/var even before redirects
    // resolve; the daemon's data may live elsewhere.
    let _guard = init_tracing(&worktree.join(".thrum").join("var").join("thrumd.log"));

    let result = match lifecycle::startup(&worktree).await {
        Ok(result) => result,
        Err(e) => {
            error!("startup failed: {}", e);
            eprintln!("thrumd: {}", e);
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    println!("READY {}", result.ws_port);
    result.state.wait_for_shutdown().await;
    result.state.shutdown().await;
    ExitCode::SUCCESS
}
