// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identity and registration record.
//!
//! Agent IDs are opaque tokens. Two shapes are accepted forever:
//! legacy triples `agent:<role>:<hash>` and single tokens such as
//! `implementer_ABC123DEF4`.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use crate::id::is_hash_suffix;

/// Opaque identifier for an agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extract the role, when the ID shape encodes one.
    ///
    /// Legacy triples carry the role in the middle segment; generated
    /// single tokens carry it before the final hash suffix.
    pub fn role(&self) -> Option<&str> {
        if let Some(rest) = self.0.strip_prefix("agent:") {
            return rest.split(':').next().filter(|s| !s.is_empty());
        }
        match self.0.rsplit_once('_') {
            Some((role, suffix)) if is_hash_suffix(suffix) && !role.is_empty() => Some(role),
            _ => None,
        }
    }

    /// Returns true for the legacy `agent:<role>:<hash>` shape.
    pub fn is_legacy(&self) -> bool {
        self.0.starts_with("agent:")
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AgentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for AgentId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for AgentId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for AgentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A registered participant in the repository's coordination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: AgentId,
    pub role: String,
    pub module: String,
    /// Human-readable display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    /// Worktree the agent registered from.
    #[serde(default)]
    pub worktree: String,
    pub registered_at: u64,
    pub last_seen_at: u64,
    #[serde(default)]
    pub deleted: bool,
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
