// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription registry and fan-out.
//!
//! Each live WebSocket connection owning subscriptions gets a bounded
//! channel; the publish path never blocks the store commit. A subscriber
//! whose buffer overflows is dropped with a `slow_consumer` close.

pub mod ws;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use thrum_core::{Message, SessionId, SubFilter, SubscriptionId};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use thrum_wire::RpcRequest;

use crate::env::SUBSCRIBER_BUFFER;

/// Frame pushed to a subscriber's WebSocket writer.
pub type PushFrame = RpcRequest;

/// Connection-scoped subscriber id.
pub type ConnId = u64;

struct Subscriber {
    session_id: SessionId,
    filters: Vec<(SubscriptionId, SubFilter)>,
    tx: mpsc::Sender<PushFrame>,
}

#[derive(Default)]
struct RegistryInner {
    subscribers: HashMap<ConnId, Subscriber>,
    next_conn_id: ConnId,
}

/// Process-wide set of live subscribers.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, returning its id and the channel its
    /// WebSocket writer drains.
    pub fn register_conn(&self) -> (ConnId, mpsc::Receiver<PushFrame>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut inner = self.inner.lock();
        inner.next_conn_id += 1;
        let conn_id = inner.next_conn_id;
        inner.subscribers.insert(
            conn_id,
            Subscriber { session_id: SessionId::from_string(""), filters: Vec::new(), tx },
        );
        (conn_id, rx)
    }

    /// Attach a filter to a connection on behalf of a session.
    pub fn subscribe(
        &self,
        conn_id: ConnId,
        session_id: &SessionId,
        subscription_id: SubscriptionId,
        filter: SubFilter,
    ) -> bool {
        let mut inner = self.inner.lock();
        match inner.subscribers.get_mut(&conn_id) {
            Some(sub) => {
                sub.session_id = session_id.clone();
                sub.filters.push((subscription_id, filter));
                true
            }
            None => false,
        }
    }

    /// Remove one subscription by id. Returns its owning session.
    pub fn unsubscribe(&self, subscription_id: &str) -> Option<SessionId> {
        let mut inner = self.inner.lock();
        for sub in inner.subscribers.values_mut() {
            let before = sub.filters.len();
            sub.filters.retain(|(id, _)| id.as_str() != subscription_id);
            if sub.filters.len() < before {
                return Some(sub.session_id.clone());
            }
        }
        None
    }

    /// Drop a connection and all its filters (socket closed).
    pub fn remove_conn(&self, conn_id: ConnId) -> Option<SessionId> {
        let mut inner = self.inner.lock();
        inner.subscribers.remove(&conn_id).map(|sub| sub.session_id)
    }

    /// Drop every subscription owned by a session (session end).
    pub fn remove_session(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        for sub in inner.subscribers.values_mut() {
            if sub.session_id.as_str() == session_id {
                sub.filters.clear();
            }
        }
    }

    /// Number of live filters (diagnostics).
    pub fn filter_count(&self) -> usize {
        self.inner.lock().subscribers.values().map(|s| s.filters.len()).sum()
    }

    /// Deliver one committed message.
    ///
    /// Each subscriber receives at most one notification no matter how
    /// many of its filters match; delivery order per subscriber mirrors
    /// commit order because this is called on the commit path. Returns
    /// the sessions of subscribers dropped for slow consumption.
    pub fn publish(&self, message: &Message, mention_roles: &HashSet<String>) -> Vec<SessionId> {
        let mut inner = self.inner.lock();
        let mut dropped: Vec<ConnId> = Vec::new();

        for (conn_id, sub) in inner.subscribers.iter() {
            if sub.filters.iter().any(|(_, f)| filter_matches(f, message, mention_roles)) {
                let frame = RpcRequest::notification(
                    "message.created",
                    json!({ "message": message }),
                );
                match sub.tx.try_send(frame) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(conn_id, session = %sub.session_id, "slow consumer, dropping subscriber");
                        dropped.push(*conn_id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(conn_id, "subscriber channel closed, dropping");
                        dropped.push(*conn_id);
                    }
                }
            }
        }

        let mut sessions = Vec::new();
        for conn_id in dropped {
            if let Some(sub) = inner.subscribers.remove(&conn_id) {
                sessions.push(sub.session_id);
            }
        }
        sessions
    }
}

/// Evaluate one filter against a message.
fn filter_matches(filter: &SubFilter, message: &Message, mention_roles: &HashSet<String>) -> bool {
    match filter {
        SubFilter::All => true,
        SubFilter::Scope { scope } => message.scopes.iter().any(|s| s == scope),
        SubFilter::MentionRole { role } => mention_roles.contains(role),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
