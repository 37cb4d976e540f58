// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local branch writer: snapshots newly appended events onto the orphan
//! `a-sync` branch.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use thrum_core::EventRecord;

use crate::ctx::DaemonCtx;

use super::git::GitSync;
use super::{SyncCommand, SyncError};

/// Meta key tracking the last event rowid committed to the branch.
const WATERMARK_KEY: &str = "sync.committed_rowid";

/// Messages per shard file under `messages/`.
const SHARD_SIZE: i64 = 1_000;

pub async fn writer_loop(
    ctx: Arc<DaemonCtx>,
    git: GitSync,
    mut cmd_rx: mpsc::Receiver<SyncCommand>,
    cancel: CancellationToken,
) {
    if let Err(e) = git.ensure_worktree().await {
        error!(error = %e, "cannot create sync worktree, branch sync disabled");
        ctx.sync.mark_disabled(e.to_string());
        return;
    }

    let interval = Duration::from_millis(ctx.config.sync_interval_ms.max(250));
    let mut backoff = Duration::from_secs(1);

    loop {
        let forced_ack = tokio::select! {
            _ = cancel.cancelled() => {
                // Final commit so shutdown leaves nothing behind.
                if let Err(e) = commit_pending(&ctx, &git).await {
                    error!(error = %e, "final sync commit failed");
                }
                info!("branch writer stopped");
                return;
            }
            _ = tokio::time::sleep(interval) => None,
            cmd = cmd_rx.recv() => match cmd {
                Some(SyncCommand::Force { ack }) => Some(ack),
                None => return,
            },
        };

        match commit_pending(&ctx, &git).await {
            Ok(count) => {
                backoff = Duration::from_secs(1);
                if let Some(ack) = forced_ack {
                    let _ = ack.send(Ok(count));
                }
            }
            Err(e) => {
                error!(error = %e, "sync commit failed, backing off");
                ctx.sync.mark_error(e.to_string());
                if let Some(ack) = forced_ack {
                    let _ = ack.send(Err(e.to_string()));
                }
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(Duration::from_secs(60));
            }
        }
    }
}

/// Append events past the watermark to the worktree files and commit.
/// Returns the number of events committed.
pub async fn commit_pending(ctx: &Arc<DaemonCtx>, git: &GitSync) -> Result<u64, SyncError> {
    let watermark: i64 = ctx
        .store
        .get_meta(WATERMARK_KEY)?
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(0);
    let tail = ctx.store.events_after_rowid(watermark)?;
    if tail.is_empty() {
        return Ok(0);
    }

    append_event_files(git, &tail).await?;
    let message = format!("sync: {} events", tail.len());
    git.commit_all(&message, false).await?;

    let last_rowid = tail.last().map(|(id, _)| *id).unwrap_or(watermark);
    ctx.store.set_meta(WATERMARK_KEY, &last_rowid.to_string())?;
    let now = ctx.now_ms();
    ctx.sync.mark_commit(now);
    debug!(count = tail.len(), last_rowid, "committed events to sync branch");
    Ok(tail.len() as u64)
}

/// Append records to `events.jsonl` and shard message events under
/// `messages/shard-NNN.jsonl`.
async fn append_event_files(git: &GitSync, tail: &[(i64, EventRecord)]) -> Result<(), SyncError> {
    let events_path = git.sync_worktree.join("events.jsonl");
    let mut events_file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&events_path)
        .await?;

    for (rowid, record) in tail {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| SyncError::Store(thrum_storage::StoreError::Json(e)))?;
        line.push(b'\n');
        events_file.write_all(&line).await?;

        if record.kind.starts_with("message.") {
            let shard = git
                .sync_worktree
                .join("messages")
                .join(format!("shard-{:03}.jsonl", rowid / SHARD_SIZE));
            if let Some(parent) = shard.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut shard_file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&shard)
                .await?;
            shard_file.write_all(&line).await?;
            shard_file.flush().await?;
        }
    }
    events_file.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "branch_tests.rs"]
mod tests;
