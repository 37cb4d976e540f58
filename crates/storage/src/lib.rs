// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! thrum-storage: the durable store behind the daemon.
//!
//! An embedded SQLite database is the source of truth for all entity
//! tables plus the replicated event log; `events.jsonl` is a rebuildable
//! JSON-lines projection consumed by the git sync layer. Every mutation
//! appends an event inside the entity transaction, so table state and the
//! log never diverge.

mod agents;
mod contexts;
mod error;
mod events;
mod groups;
mod jsonl;
mod messages;
mod peers;
mod schema;
mod sessions;
mod store;
mod subscriptions;
mod threads;

pub use agents::{AgentFilter, PutAgentOptions, RegisterOutcome};
pub use error::StoreError;
pub use events::ApplyOutcome;
pub use jsonl::read_event_log;
pub use messages::{ListedMessage, MessageDraft, MessageFilter};
pub use store::Store;
pub use subscriptions::StoredSubscription;
