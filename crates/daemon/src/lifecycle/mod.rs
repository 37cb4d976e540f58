// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, shutdown, single-instance enforcement.

mod startup;

pub use startup::{startup, StartupResult};

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ctx::DaemonCtx;
use crate::redirect::RedirectError;

/// JSON contents of `var/thrum.pid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidFile {
    pub pid: u32,
    pub repo_path: PathBuf,
    pub socket_path: PathBuf,
    pub started_at: u64,
}

/// Lifecycle errors. Each maps to a distinct non-zero exit code.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Redirect(#[from] RedirectError),

    #[error("daemon already running (pid {pid})")]
    ConflictingDaemon { pid: u32 },

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("failed to bind websocket listener: {0}")]
    WsBindFailed(std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] thrum_storage::StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LifecycleError {
    /// Process exit code for a fatal startup failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            LifecycleError::Redirect(_) => 2,
            LifecycleError::ConflictingDaemon { .. } => 3,
            LifecycleError::BindFailed(..) | LifecycleError::WsBindFailed(_) => 4,
            LifecycleError::Store(_) => 5,
            LifecycleError::Io(_) => 6,
        }
    }
}

/// Running daemon: context plus the resources torn down at shutdown.
pub struct DaemonState {
    pub ctx: Arc<DaemonCtx>,
    // NOTE(lifetime): held to keep the exclusive PID-file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DaemonState {
    pub(crate) fn new(
        ctx: Arc<DaemonCtx>,
        lock_file: File,
        cancel: CancellationToken,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        Self { ctx, lock_file, cancel, tasks }
    }

    /// Block until SIGTERM/ctrl-c or an in-process shutdown request.
    pub async fn wait_for_shutdown(&self) {
        let sigterm = async {
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        warn!("cannot install SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            std::future::pending::<()>().await;
        };

        tokio::select! {
            _ = self.ctx.shutdown.notified() => info!("shutdown requested"),
            _ = tokio::signal::ctrl_c() => info!("interrupt received"),
            _ = sigterm => info!("SIGTERM received"),
        }
    }

    /// Graceful shutdown: stop accepting, drain tasks (the branch writer
    /// makes its final commit on cancellation), then remove runtime
    /// files.
    pub async fn shutdown(mut self) {
        info!("shutting down daemon");
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if tokio::time::timeout(Duration::from_secs(10), task).await.is_err() {
                warn!("task did not stop within 10s");
            }
        }

        for path in [
            self.ctx.paths.socket_path(),
            self.ctx.paths.pid_path(),
            self.ctx.paths.ws_port_path(),
        ] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), "failed to remove: {}", e);
                }
            }
        }
        info!("daemon shutdown complete");
    }
}
