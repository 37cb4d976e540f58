// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The replicated event model.
//!
//! Every state-changing mutation appends an [`EventRecord`] keyed by
//! `(origin_daemon_id, sequence)`. Records travel as JSON lines on the
//! `a-sync` branch and in peer batches. Kinds unknown to this build are
//! retained untouched so newer peers can still replicate through us.

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentId};
use crate::context::WorkContext;
use crate::group::{Group, GroupMember, MemberType};
use crate::id::{GroupId, MessageId, SessionId, ThreadId};
use crate::message::{Message, MessageBody};
use crate::peer::PeerInfo;
use crate::session::Session;
use crate::thread::Thread;

/// One line of the replicated event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub origin_daemon_id: String,
    pub sequence: u64,
    pub kind: String,
    pub created_at: u64,
    pub payload: serde_json::Value,
}

impl EventRecord {
    /// Decode the typed event, or `None` for kinds this build does not
    /// know (the record itself is still replicated verbatim).
    pub fn decode(&self) -> Option<Event> {
        Event::from_parts(&self.kind, self.payload.clone())
    }
}

/// Typed event payloads for the kinds this build materializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum Event {
    #[serde(rename = "agent.registered")]
    AgentRegistered { agent: Agent },
    #[serde(rename = "agent.deleted")]
    AgentDeleted { agent_id: AgentId, deleted_at: u64 },
    #[serde(rename = "session.started")]
    SessionStarted { session: Session },
    #[serde(rename = "session.ended")]
    SessionEnded { session_id: SessionId, ended_at: u64 },
    #[serde(rename = "message.created")]
    MessageCreated { message: Message, audience: Vec<AgentId> },
    #[serde(rename = "message.edited")]
    MessageEdited { message_id: MessageId, body: MessageBody, version: u64, updated_at: u64 },
    #[serde(rename = "message.deleted")]
    MessageDeleted { message_id: MessageId, deleted_at: u64 },
    #[serde(rename = "message.read")]
    MessageRead { message_id: MessageId, agent_id: AgentId, read_at: u64 },
    #[serde(rename = "thread.created")]
    ThreadCreated { thread: Thread },
    #[serde(rename = "group.created")]
    GroupCreated { group: Group },
    #[serde(rename = "group.deleted")]
    GroupDeleted { group_id: GroupId, deleted_at: u64 },
    #[serde(rename = "group.member.added")]
    GroupMemberAdded { group_id: GroupId, member: GroupMember },
    #[serde(rename = "group.member.removed")]
    GroupMemberRemoved { group_id: GroupId, member_type: MemberType, member_value: String },
    #[serde(rename = "context.updated")]
    ContextUpdated { context: WorkContext },
    #[serde(rename = "peer.added")]
    PeerAdded { peer: PeerInfo },
    #[serde(rename = "peer.removed")]
    PeerRemoved { daemon_id: String },
}

impl Event {
    /// The wire kind string for this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::AgentRegistered { .. } => "agent.registered",
            Event::AgentDeleted { .. } => "agent.deleted",
            Event::SessionStarted { .. } => "session.started",
            Event::SessionEnded { .. } => "session.ended",
            Event::MessageCreated { .. } => "message.created",
            Event::MessageEdited { .. } => "message.edited",
            Event::MessageDeleted { .. } => "message.deleted",
            Event::MessageRead { .. } => "message.read",
            Event::ThreadCreated { .. } => "thread.created",
            Event::GroupCreated { .. } => "group.created",
            Event::GroupDeleted { .. } => "group.deleted",
            Event::GroupMemberAdded { .. } => "group.member.added",
            Event::GroupMemberRemoved { .. } => "group.member.removed",
            Event::ContextUpdated { .. } => "context.updated",
            Event::PeerAdded { .. } => "peer.added",
            Event::PeerRemoved { .. } => "peer.removed",
        }
    }

    /// Split into `(kind, payload)` for storage.
    pub fn into_parts(self) -> (String, serde_json::Value) {
        let kind = self.kind().to_string();
        let payload = match serde_json::to_value(&self) {
            Ok(serde_json::Value::Object(map)) => {
                map.get("payload").cloned().unwrap_or(serde_json::Value::Null)
            }
            _ => serde_json::Value::Null,
        };
        (kind, payload)
    }

    /// Reassemble from stored parts. `None` when the kind is unknown or
    /// the payload does not parse; the caller keeps the raw record.
    pub fn from_parts(kind: &str, payload: serde_json::Value) -> Option<Self> {
        let value = serde_json::json!({ "kind": kind, "payload": payload });
        serde_json::from_value(value).ok()
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
