// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer branch reconciler: consume `a-sync` tips from configured
//! remotes and apply their events.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use thrum_core::{Event, EventRecord};
use thrum_storage::{ApplyOutcome, StoreError};

use crate::ctx::DaemonCtx;

use super::git::{GitSync, SYNC_BRANCH};

pub async fn reconcile_loop(ctx: Arc<DaemonCtx>, git: GitSync, cancel: CancellationToken) {
    if !ctx.config.remote_sync {
        info!("remote branch reconciliation disabled (config.json remote_sync=false)");
        return;
    }
    let interval = Duration::from_millis(ctx.config.peer_sync_interval_ms.max(1_000));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("branch reconciler stopped");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
        reconcile_pass(&ctx, &git).await;
    }
}

/// One reconcile pass over every configured remote.
pub async fn reconcile_pass(ctx: &Arc<DaemonCtx>, git: &GitSync) {
    for remote in git.remotes().await {
        let reference = match git.fetch_peer_branch(&remote).await {
            Ok(reference) => reference,
            Err(e) => {
                debug!(remote, error = %e, "peer branch fetch failed");
                continue;
            }
        };
        let Some(raw) = git.show_file(&reference, "events.jsonl").await else {
            debug!(remote, branch = SYNC_BRANCH, "peer has no event log yet");
            continue;
        };
        let records = parse_event_lines(&raw);
        let summary = apply_records(ctx, &records);
        if summary.applied > 0 {
            info!(remote, applied = summary.applied, skipped = summary.skipped, "merged peer events");
        }
        if summary.deferred > 0 {
            debug!(remote, deferred = summary.deferred, "events waiting on missing prefix");
        }
    }
}

/// Parse JSON-lines, skipping blanks and logging malformed lines.
pub fn parse_event_lines(raw: &str) -> Vec<EventRecord> {
    let mut records = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<EventRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(error = %e, "skipping malformed peer event line"),
        }
    }
    records
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ApplySummary {
    pub applied: u64,
    pub skipped: u64,
    pub deferred: u64,
}

/// Apply a batch of peer events with retry for in-batch ordering.
///
/// Records whose causal prerequisites are missing (`SequenceGap`) are
/// retried within the batch until a pass makes no progress; whatever is
/// left waits for the next fetch. Applied `message.created` events are
/// fanned out to local subscribers.
pub fn apply_records(ctx: &Arc<DaemonCtx>, records: &[EventRecord]) -> ApplySummary {
    let mut summary = ApplySummary::default();
    let mut queue: Vec<&EventRecord> = records.iter().collect();

    loop {
        let mut deferred: Vec<&EventRecord> = Vec::new();
        let mut progressed = false;

        for record in queue {
            match ctx.store.apply_remote_event(record) {
                Ok(ApplyOutcome::Applied) => {
                    summary.applied += 1;
                    progressed = true;
                    fan_out(ctx, record);
                }
                Ok(ApplyOutcome::Skipped) => {
                    summary.skipped += 1;
                }
                Err(StoreError::SequenceGap { .. }) => deferred.push(record),
                Err(e) => {
                    warn!(origin = %record.origin_daemon_id, seq = record.sequence, error = %e,
                        "failed to apply peer event");
                }
            }
        }

        if deferred.is_empty() || !progressed {
            summary.deferred = deferred.len() as u64;
            return summary;
        }
        queue = deferred;
    }
}

/// Push a freshly applied remote message to local subscribers.
fn fan_out(ctx: &Arc<DaemonCtx>, record: &EventRecord) {
    if record.kind != "message.created" {
        return;
    }
    if let Some(Event::MessageCreated { message, .. }) = record.decode() {
        ctx.publish_message(&message);
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
