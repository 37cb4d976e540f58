// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! thrum-core: shared types for the Thrum coordination daemon.
//!
//! Entity records, identifier newtypes, the event model, and the clock
//! abstraction used by the storage layer and the daemon.

pub mod agent;
pub mod clock;
pub mod context;
pub mod event;
pub mod filter;
pub mod group;
pub mod id;
pub mod message;
pub mod peer;
pub mod scope;
pub mod session;
pub mod thread;

pub use agent::{Agent, AgentId};
pub use clock::{Clock, FakeClock, SystemClock};
pub use context::WorkContext;
pub use event::{Event, EventRecord};
pub use filter::SubFilter;
pub use group::{would_create_cycle, Group, GroupMember, MemberType};
pub use id::{
    agent_name, agent_name_salted, short, GroupId, MessageId, RefId, SessionId, SubscriptionId,
    ThreadId,
};
pub use message::{Message, MessageAuthor, MessageBody, MessageRef, REF_MENTION, REF_REPLY_TO};
pub use peer::{Peer, PeerInfo};
pub use scope::{Mention, Scope};
pub use session::Session;
pub use thread::Thread;
