// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync engine: local branch writer, peer branch reconciler, remote
//! transport. All loops retry with backoff forever and stop on the root
//! cancellation signal.

pub mod branch;
pub mod git;
pub mod migrate;
pub mod reconcile;
pub mod transport;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use thrum_core::PeerInfo;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ctx::DaemonCtx;
use crate::env::PAIRING_CODE_TTL;

pub use git::{GitSync, SyncError};

/// Reported by `sync.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Synced,
    Pending,
    Error,
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub sync_state: SyncState,
    pub last_commit_at: Option<u64>,
    pub pending_events: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Commands accepted by the branch writer loop.
pub enum SyncCommand {
    /// Commit outstanding events now; ack carries the count committed.
    Force { ack: oneshot::Sender<Result<u64, String>> },
}

struct PendingPairing {
    code: String,
    expires_at: u64,
    tx: watch::Sender<Option<PeerInfo>>,
}

#[derive(Default)]
struct Shared {
    sync_state: Option<SyncState>,
    last_commit_at: Option<u64>,
    last_error: Option<String>,
}

/// Handle shared with RPC handlers; the engine loops hold the receiver.
#[derive(Clone)]
pub struct SyncHandle {
    cmd_tx: mpsc::Sender<SyncCommand>,
    shared: Arc<Mutex<Shared>>,
    pairing: Arc<Mutex<Option<PendingPairing>>>,
}

impl SyncHandle {
    pub fn new() -> (Self, mpsc::Receiver<SyncCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let handle = Self {
            cmd_tx,
            shared: Arc::new(Mutex::new(Shared::default())),
            pairing: Arc::new(Mutex::new(None)),
        };
        (handle, cmd_rx)
    }

    /// Ask the writer loop for an immediate commit and wait for it.
    pub async fn force(&self) -> Result<u64, String> {
        let (ack, done) = oneshot::channel();
        self.cmd_tx
            .send(SyncCommand::Force { ack })
            .await
            .map_err(|_| "sync engine not running".to_string())?;
        match tokio::time::timeout(crate::env::GIT_TIMEOUT, done).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err("sync engine dropped the request".to_string()),
            Err(_) => Err("sync commit timed out".to_string()),
        }
    }

    pub fn status(&self, pending_events: u64) -> SyncStatus {
        let shared = self.shared.lock();
        let sync_state = match shared.sync_state {
            Some(state) => state,
            None => SyncState::Disabled,
        };
        let sync_state = match sync_state {
            SyncState::Disabled | SyncState::Error => sync_state,
            _ if pending_events > 0 => SyncState::Pending,
            _ => SyncState::Synced,
        };
        SyncStatus {
            sync_state,
            last_commit_at: shared.last_commit_at,
            pending_events,
            last_error: shared.last_error.clone(),
        }
    }

    pub(crate) fn mark_enabled(&self) {
        self.shared.lock().sync_state = Some(SyncState::Synced);
    }

    pub(crate) fn mark_disabled(&self, reason: String) {
        let mut shared = self.shared.lock();
        shared.sync_state = Some(SyncState::Disabled);
        shared.last_error = Some(reason);
    }

    pub(crate) fn mark_commit(&self, at: u64) {
        let mut shared = self.shared.lock();
        shared.sync_state = Some(SyncState::Synced);
        shared.last_commit_at = Some(at);
        shared.last_error = None;
    }

    pub(crate) fn mark_error(&self, error: String) {
        let mut shared = self.shared.lock();
        shared.sync_state = Some(SyncState::Error);
        shared.last_error = Some(error);
    }

    /// Open a pairing window. Any previous window is replaced.
    pub fn begin_pairing(&self, now: u64) -> (String, u64, watch::Receiver<Option<PeerInfo>>) {
        let code = nanoid::nanoid!(8, &PAIRING_ALPHABET);
        let expires_at = now + PAIRING_CODE_TTL.as_millis() as u64;
        let (tx, rx) = watch::channel(None);
        *self.pairing.lock() = Some(PendingPairing { code: code.clone(), expires_at, tx });
        (code, expires_at, rx)
    }

    /// Subscribe to the open pairing window, if any.
    pub fn watch_pairing(&self) -> Option<(u64, watch::Receiver<Option<PeerInfo>>)> {
        let pairing = self.pairing.lock();
        pairing.as_ref().map(|p| (p.expires_at, p.tx.subscribe()))
    }

    /// Validate a presented code against the open window.
    pub fn pairing_code_valid(&self, code: &str, now: u64) -> bool {
        let pairing = self.pairing.lock();
        matches!(pairing.as_ref(), Some(p) if p.code == code && now < p.expires_at)
    }

    /// Close the window and wake `peer.wait_pairing` callers.
    pub fn complete_pairing(&self, peer: PeerInfo) {
        if let Some(pending) = self.pairing.lock().take() {
            let _ = pending.tx.send(Some(peer));
        }
    }
}

/// Pairing codes avoid ambiguous characters.
const PAIRING_ALPHABET: [char; 31] = [
    '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K',
    'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'V', 'W', 'X', 'Y', 'Z', '0',
];

/// Spawn the engine loops. When the repository is not a git repo, branch
/// sync is disabled but the command channel still drains so `sync.force`
/// gets a clear error.
pub async fn spawn(
    ctx: Arc<DaemonCtx>,
    cmd_rx: mpsc::Receiver<SyncCommand>,
    cancel: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    match GitSync::discover(&ctx.paths.worktree).await {
        Ok(gitsync) => {
            if let Err(e) = migrate::run(&gitsync, &ctx.paths).await {
                warn!(error = %e, "sync layout migration failed");
            }
            ctx.sync.mark_enabled();
            info!(worktree = %gitsync.sync_worktree.display(), "sync engine starting");

            vec![
                tokio::spawn(branch::writer_loop(
                    Arc::clone(&ctx),
                    gitsync.clone(),
                    cmd_rx,
                    cancel.clone(),
                )),
                tokio::spawn(reconcile::reconcile_loop(
                    Arc::clone(&ctx),
                    gitsync,
                    cancel.clone(),
                )),
                tokio::spawn(transport::peer_loop(ctx, cancel)),
            ]
        }
        Err(e) => {
            warn!(error = %e, "not a git repository, sync disabled");
            ctx.sync.mark_disabled(e.to_string());
            vec![tokio::spawn(drain_disabled(cmd_rx, cancel))]
        }
    }
}

async fn drain_disabled(mut cmd_rx: mpsc::Receiver<SyncCommand>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            cmd = cmd_rx.recv() => match cmd {
                Some(SyncCommand::Force { ack }) => {
                    let _ = ack.send(Err("sync disabled: not a git repository".to_string()));
                }
                None => return,
            }
        }
    }
}
