// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work-context snapshot: what an agent is doing right now.

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::id::SessionId;
use crate::scope::Scope;

/// Snapshot of an agent's declared work context, updated by session
/// intent/task changes and replicated with the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkContext {
    pub agent_id: AgentId,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    #[serde(default)]
    pub scopes: Vec<Scope>,
    #[serde(default)]
    pub refs: Vec<String>,
    pub updated_at: u64,
}
