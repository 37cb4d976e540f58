// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread record. Threads are never deleted, only emptied.

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::id::ThreadId;
use crate::scope::Scope;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub thread_id: ThreadId,
    pub title: String,
    pub created_by: AgentId,
    pub created_at: u64,
    #[serde(default)]
    pub scopes: Vec<Scope>,
}
