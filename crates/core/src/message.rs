// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message entity: body, refs, authorship, edit versioning.

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::id::{MessageId, SessionId, ThreadId};
use crate::scope::Scope;

/// Ref type carried by replies.
pub const REF_REPLY_TO: &str = "reply_to";

/// Ref type prefix for direct addressing. The mention token is stored
/// verbatim in the value so peers can resolve it later.
pub const REF_MENTION: &str = "mention";

/// Attribution for a message: which agent sent it, under which session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageAuthor {
    pub agent_id: AgentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Message body. `format` is free-form (`text`, `markdown`, ...);
/// `structured` carries machine-readable payloads alongside the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    pub format: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
}

impl MessageBody {
    pub fn text(content: impl Into<String>) -> Self {
        Self { format: "text".to_string(), content: content.into(), structured: None }
    }
}

/// A typed reference attached to a message (`reply_to`, `mention:<agent>`,
/// task/file links, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    #[serde(rename = "type")]
    pub ref_type: String,
    pub value: String,
}

impl MessageRef {
    pub fn new(ref_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self { ref_type: ref_type.into(), value: value.into() }
    }

    pub fn reply_to(parent: &MessageId) -> Self {
        Self::new(REF_REPLY_TO, parent.as_str())
    }

    pub fn mention(token: &str) -> Self {
        Self::new(REF_MENTION, token)
    }
}

/// A message in the durable log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ThreadId>,
    pub author: MessageAuthor,
    pub body: MessageBody,
    #[serde(default)]
    pub scopes: Vec<Scope>,
    #[serde(default)]
    pub refs: Vec<MessageRef>,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
    #[serde(default)]
    pub deleted: bool,
    /// Monotonically increasing per edit; starts at 1.
    #[serde(default = "default_version")]
    pub version: u64,
}

fn default_version() -> u64 {
    1
}

impl Message {
    /// The parent message ID when this message is a reply.
    pub fn reply_to(&self) -> Option<MessageId> {
        self.refs
            .iter()
            .find(|r| r.ref_type == REF_REPLY_TO)
            .map(|r| MessageId::from_string(r.value.clone()))
    }

    /// Mention tokens stored on this message, verbatim.
    pub fn mentions(&self) -> impl Iterator<Item = &str> {
        self.refs.iter().filter(|r| r.ref_type == REF_MENTION).map(|r| r.value.as_str())
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
