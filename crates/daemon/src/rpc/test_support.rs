// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler-test fixtures: an in-process context with a fake clock.

use std::path::Path;
use std::sync::atomic::AtomicU16;
use std::sync::Arc;
use std::time::Instant;

use thrum_core::{Clock, FakeClock};
use thrum_storage::Store;

use crate::config::DaemonConfig;
use crate::ctx::{ClockHandle, DaemonCtx};
use crate::identity::IdentityResolver;
use crate::paths::ThrumDir;
use crate::subs::SubscriptionRegistry;
use crate::sync::SyncHandle;

pub(crate) struct TestCtx {
    pub ctx: Arc<DaemonCtx>,
    pub clock: FakeClock,
    pub _tmp: tempfile::TempDir,
}

pub(crate) fn test_ctx() -> TestCtx {
    let tmp = tempfile::tempdir().unwrap();
    let worktree = tmp.path().to_path_buf();
    build_ctx(&worktree, tmp)
}

/// Build a context over an existing directory (e.g. a git repo fixture).
pub(crate) fn test_ctx_at(tmp: tempfile::TempDir, worktree: &Path) -> TestCtx {
    build_ctx(worktree, tmp)
}

fn build_ctx(worktree: &Path, tmp: tempfile::TempDir) -> TestCtx {
    let paths = ThrumDir::resolve(worktree).unwrap();
    paths.ensure_layout().unwrap();
    let store = Arc::new(Store::open(&paths.var_dir()).unwrap());
    let clock = FakeClock::new();
    let (sync_handle, cmd_rx) = SyncHandle::new();
    // No engine in handler tests; sync.force reports unavailable.
    drop(cmd_rx);

    let identity = IdentityResolver::new(Arc::clone(&store), paths.clone(), None);
    let ctx = Arc::new(DaemonCtx {
        store,
        clock: ClockHandle::from_clock(clock.clone()),
        subs: SubscriptionRegistry::new(),
        identity,
        paths,
        config: DaemonConfig::default(),
        sync: sync_handle,
        start_time: Instant::now(),
        started_at_ms: clock.epoch_ms(),
        shutdown: Arc::new(tokio::sync::Notify::new()),
        ws_port: AtomicU16::new(0),
    });
    TestCtx { ctx, clock, _tmp: tmp }
}
