// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audience resolution: who receives a message.
//!
//! Resolution order: broadcast roster, mention expansion (agent, role,
//! group), scope subscribers, thread participants, reply-parent author.
//! The result is deduplicated and never contains the author. Unknown
//! mentions stay on the message verbatim but add no recipient.

use std::collections::HashSet;

use thrum_core::{AgentId, Mention, MessageId, Scope, ThreadId};
use thrum_storage::{Store, StoreError};

/// The fields of a message draft that drive routing.
#[derive(Debug, Clone, Default)]
pub struct AudienceInput {
    pub mentions: Vec<Mention>,
    pub scopes: Vec<Scope>,
    pub thread_id: Option<ThreadId>,
    pub broadcast: bool,
    pub reply_parent: Option<MessageId>,
}

/// Compute the recipient set for a draft authored by `author`.
pub fn resolve_audience(
    store: &Store,
    author: &AgentId,
    input: &AudienceInput,
) -> Result<Vec<AgentId>, StoreError> {
    let mut audience: Vec<AgentId> = Vec::new();

    if input.broadcast && input.mentions.is_empty() && input.scopes.is_empty() {
        audience.extend(store.active_agents()?);
    }

    for mention in &input.mentions {
        audience.extend(expand_mention(store, mention)?);
    }

    for scope in &input.scopes {
        audience.extend(store.agents_subscribed_to_scope(scope)?);
    }

    if let Some(thread_id) = &input.thread_id {
        audience.extend(store.thread_participants(thread_id.as_str())?);
    }

    if let Some(parent_id) = &input.reply_parent {
        if let Some(parent) = store.get_message(parent_id.as_str())? {
            audience.push(parent.author.agent_id);
        }
    }

    let mut seen: HashSet<AgentId> = HashSet::new();
    let deduped = audience
        .into_iter()
        .filter(|agent| agent != author && seen.insert(agent.clone()))
        .collect();
    Ok(deduped)
}

/// Expand one mention token: agent id, then role, then group. Unknown
/// tokens expand to nothing.
fn expand_mention(store: &Store, mention: &Mention) -> Result<Vec<AgentId>, StoreError> {
    let token = mention.as_str();

    if let Some(agent) = store.get_agent(token)? {
        if !agent.deleted {
            return Ok(vec![agent.agent_id]);
        }
    }

    let by_role = store.agents_with_role(token)?;
    if !by_role.is_empty() {
        return Ok(by_role);
    }

    let by_group = store.expand_group(token)?;
    if !by_group.is_empty() {
        return Ok(by_group);
    }

    Ok(Vec::new())
}

/// Roles addressed by a message's mentions, for `mention_role`
/// subscription filters: role tokens themselves plus the roles of
/// directly mentioned agents.
pub fn mention_roles(store: &Store, mentions: &[Mention]) -> Result<HashSet<String>, StoreError> {
    let mut roles = HashSet::new();
    for mention in mentions {
        let token = mention.as_str();
        if let Some(agent) = store.get_agent(token)? {
            if !agent.deleted {
                roles.insert(agent.role);
                continue;
            }
        }
        if !store.agents_with_role(token)?.is_empty() {
            roles.insert(token.to_string());
        }
    }
    Ok(roles)
}

#[cfg(test)]
#[path = "audience_tests.rs"]
mod tests;
