// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Groups: named audiences of agents, roles, and nested groups.
//!
//! The membership graph is a DAG by construction; [`would_create_cycle`]
//! runs the reachability check enforced before every group→group insert.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::agent::AgentId;
use crate::id::GroupId;

/// What a group member refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberType {
    Agent,
    Role,
    Group,
}

impl MemberType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberType::Agent => "agent",
            MemberType::Role => "role",
            MemberType::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agent" => Some(MemberType::Agent),
            "role" => Some(MemberType::Role),
            "group" => Some(MemberType::Group),
            _ => None,
        }
    }
}

/// One membership row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub member_type: MemberType,
    pub member_value: String,
    pub added_at: u64,
    pub added_by: AgentId,
}

/// A named group. `name` is unique among non-deleted groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: GroupId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: AgentId,
    pub created_at: u64,
}

/// Reachability check over group→group edges, keyed by group name.
///
/// Returns true when adding `child` as a member of `parent` would create a
/// cycle, i.e. `parent` is reachable from `child` through the existing
/// edges (`edges[g]` = groups that are direct members of `g`).
pub fn would_create_cycle(
    edges: &HashMap<String, Vec<String>>,
    parent: &str,
    child: &str,
) -> bool {
    if parent == child {
        return true;
    }
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = vec![child];
    while let Some(g) = stack.pop() {
        if g == parent {
            return true;
        }
        if !seen.insert(g) {
            continue;
        }
        if let Some(next) = edges.get(g) {
            stack.extend(next.iter().map(String::as_str));
        }
    }
    false
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
