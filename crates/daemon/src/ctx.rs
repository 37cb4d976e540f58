// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared daemon context handed to every request handler.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thrum_core::{Clock, Message, SystemClock};
use thrum_storage::Store;
use tokio::sync::Notify;
use tracing::warn;

use crate::audience;
use crate::config::DaemonConfig;
use crate::identity::IdentityResolver;
use crate::paths::ThrumDir;
use crate::subs::SubscriptionRegistry;
use crate::sync::SyncHandle;

/// Clock indirection so handler tests can pin time.
#[derive(Clone)]
pub struct ClockHandle(Arc<dyn Fn() -> u64 + Send + Sync>);

impl ClockHandle {
    pub fn system() -> Self {
        Self(Arc::new(|| SystemClock.epoch_ms()))
    }

    pub fn from_clock<C: Clock + 'static>(clock: C) -> Self {
        Self(Arc::new(move || clock.epoch_ms()))
    }

    pub fn now_ms(&self) -> u64 {
        (self.0)()
    }
}

impl std::fmt::Debug for ClockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockHandle").finish_non_exhaustive()
    }
}

/// Shared daemon context for all request handlers.
pub struct DaemonCtx {
    pub store: Arc<Store>,
    pub clock: ClockHandle,
    pub subs: SubscriptionRegistry,
    pub identity: IdentityResolver,
    pub paths: ThrumDir,
    pub config: DaemonConfig,
    pub sync: SyncHandle,
    pub start_time: Instant,
    pub started_at_ms: u64,
    pub shutdown: Arc<Notify>,
    /// Bound WebSocket port, set once the listener is up.
    pub ws_port: AtomicU16,
}

impl DaemonCtx {
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn ws_port(&self) -> u16 {
        self.ws_port.load(Ordering::SeqCst)
    }

    pub fn set_ws_port(&self, port: u16) {
        self.ws_port.store(port, Ordering::SeqCst);
    }

    /// Fan a committed message out to live subscribers, dropping any
    /// slow consumers and their stored subscriptions.
    pub fn publish_message(&self, message: &Message) {
        let mentions: Vec<thrum_core::Mention> =
            message.mentions().map(thrum_core::Mention::parse).collect();
        let roles = match audience::mention_roles(&self.store, &mentions) {
            Ok(roles) => roles,
            Err(e) => {
                warn!(error = %e, "mention role resolution failed, publishing without roles");
                Default::default()
            }
        };
        let dropped = self.subs.publish(message, &roles);
        for session_id in dropped {
            if let Err(e) = self.store.remove_session_subscriptions(session_id.as_str()) {
                warn!(session = %session_id, error = %e, "failed to clear slow consumer subscriptions");
            }
        }
    }
}
