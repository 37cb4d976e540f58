// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup: resolve the data directory, take the PID lock, bind
//! listeners, open the store, launch the loops.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicU16;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use tokio::net::{TcpListener, UnixListener};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use thrum_storage::Store;

use crate::config::DaemonConfig;
use crate::ctx::{ClockHandle, DaemonCtx};
use crate::identity::IdentityResolver;
use crate::paths::ThrumDir;
use crate::rpc;
use crate::subs::{self, SubscriptionRegistry};
use crate::sync::{self, SyncHandle};

use super::{DaemonState, LifecycleError, PidFile};

/// What startup hands back to `main`.
pub struct StartupResult {
    pub state: DaemonState,
    /// The bound WebSocket port (also written to `var/ws.port`).
    pub ws_port: u16,
}

/// Start the daemon for a repository worktree.
pub async fn startup(worktree: &Path) -> Result<StartupResult, LifecycleError> {
    // 1. Resolve the authoritative data directory through redirects.
    let paths = ThrumDir::resolve(worktree)?;
    paths.ensure_layout()?;
    if let Err(e) = paths.ensure_gitignore() {
        warn!("cannot update .gitignore: {}", e);
    }
    let config = DaemonConfig::load_or_create(&paths.config_path());

    let clock = ClockHandle::system();
    let started_at_ms = clock.now_ms();

    // 2. Take the PID lock before touching anything else. A held lock
    // means a live daemon owns this directory; an unlocked file is a
    // stale crash leftover and is overwritten.
    let lock_file = acquire_pid_lock(&paths, started_at_ms)?;

    // 3. Open the store (runs schema migrations, reconciles the event
    // log mirror).
    let store = Arc::new(Store::open(&paths.var_dir())?);

    // 4. WebSocket listener. Prefer the previous port so restarted
    // daemons keep their subscriber URLs.
    let (ws_listener, ws_port) = bind_ws(&paths).await?;
    std::fs::write(paths.ws_port_path(), format!("{}\n", ws_port))?;

    // 5. Unix socket, last: once it exists, clients will connect.
    let socket_path = paths.socket_path();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let unix_listener = UnixListener::bind(&socket_path)
        .map_err(|e| LifecycleError::BindFailed(socket_path.clone(), e))?;

    // 6. Shared context.
    let (sync_handle, cmd_rx) = SyncHandle::new();
    let identity = IdentityResolver::from_env(Arc::clone(&store), paths.clone());
    let ctx = Arc::new(DaemonCtx {
        store,
        clock,
        subs: SubscriptionRegistry::new(),
        identity,
        paths,
        config,
        sync: sync_handle,
        start_time: Instant::now(),
        started_at_ms,
        shutdown: Arc::new(tokio::sync::Notify::new()),
        ws_port: AtomicU16::new(ws_port),
    });

    // 7. Launch the task set.
    let cancel = CancellationToken::new();
    let mut tasks = vec![
        tokio::spawn(rpc::listen(Arc::clone(&ctx), unix_listener, cancel.clone())),
        tokio::spawn(subs::ws::listen(Arc::clone(&ctx), ws_listener, cancel.clone())),
    ];
    tasks.extend(sync::spawn(Arc::clone(&ctx), cmd_rx, cancel.clone()).await);

    info!(
        socket = %ctx.paths.socket_path().display(),
        ws_port,
        daemon_id = ctx.store.daemon_id(),
        "daemon ready"
    );

    Ok(StartupResult { state: DaemonState::new(ctx, lock_file, cancel, tasks), ws_port })
}

/// Lock and write `var/thrum.pid`.
fn acquire_pid_lock(paths: &ThrumDir, started_at: u64) -> Result<std::fs::File, LifecycleError> {
    let pid_path = paths.pid_path();
    // Avoid truncating before the lock is held, which would wipe a live
    // daemon's record.
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&pid_path)?;

    if file.try_lock_exclusive().is_err() {
        let previous: Option<PidFile> = std::fs::read_to_string(&pid_path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok());
        let pid = previous.map(|p| p.pid).unwrap_or_default();
        return Err(LifecycleError::ConflictingDaemon { pid });
    }

    let record = PidFile {
        pid: std::process::id(),
        repo_path: paths.worktree.clone(),
        socket_path: paths.socket_path(),
        started_at,
    };
    let mut file = file;
    file.set_len(0)?;
    let raw = serde_json::to_string(&record)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writeln!(file, "{}", raw)?;
    Ok(file)
}

/// Bind the WebSocket listener, reusing the previously advertised port
/// when possible.
async fn bind_ws(paths: &ThrumDir) -> Result<(TcpListener, u16), LifecycleError> {
    if let Some(previous) = std::fs::read_to_string(paths.ws_port_path())
        .ok()
        .and_then(|raw| raw.trim().parse::<u16>().ok())
        .filter(|port| *port != 0)
    {
        match TcpListener::bind(("127.0.0.1", previous)).await {
            Ok(listener) => return Ok((listener, previous)),
            Err(e) => info!(port = previous, "previous websocket port unavailable: {}", e),
        }
    }
    let listener =
        TcpListener::bind(("127.0.0.1", 0)).await.map_err(LifecycleError::WsBindFailed)?;
    let port = listener.local_addr().map_err(LifecycleError::WsBindFailed)?.port();
    Ok((listener, port))
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
