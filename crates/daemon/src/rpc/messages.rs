// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messaging methods.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use thrum_core::{
    AgentId, Mention, MessageAuthor, MessageBody, MessageId, MessageRef, Scope, SessionId,
    ThreadId, REF_REPLY_TO,
};
use thrum_storage::{MessageDraft, MessageFilter};
use thrum_wire::{Page, PageParams, RpcError};
use tracing::info;

use crate::audience::{self, AudienceInput};
use crate::ctx::DaemonCtx;

use super::{parse, store_err, CallerParams};

/// Scope params accept both `"module:auth"` strings and `{type, value}`
/// objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScopeParam {
    Text(String),
    Typed(Scope),
}

impl ScopeParam {
    fn into_scope(self) -> Scope {
        match self {
            ScopeParam::Text(raw) => Scope::parse(&raw),
            ScopeParam::Typed(scope) => scope,
        }
    }
}

#[derive(Deserialize)]
struct SendParams {
    content: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    structured: Option<Value>,
    #[serde(default)]
    mentions: Vec<String>,
    #[serde(default)]
    scopes: Vec<ScopeParam>,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    broadcast: bool,
    #[serde(default)]
    refs: Vec<MessageRef>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(flatten)]
    caller: CallerParams,
}

pub fn send(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: SendParams = parse(&params)?;
    if p.content.is_empty() && p.structured.is_none() {
        return Err(RpcError::invalid_params("content is required"));
    }
    let (author_id, _) = ctx
        .identity
        .resolve(p.caller.caller_agent_id.as_deref(), p.caller.cwd.as_deref())
        .map_err(|e| RpcError::ambiguous_identity(e.to_string()))?;

    let session_id = match p.session_id {
        Some(raw) => Some(SessionId::from_string(raw)),
        None => ctx
            .store
            .active_sessions_for_agent(author_id.as_str())
            .map_err(store_err)?
            .into_iter()
            .next_back(),
    };

    let mentions: Vec<Mention> = p.mentions.iter().map(|m| Mention::parse(m)).collect();
    let scopes: Vec<Scope> = p.scopes.into_iter().map(ScopeParam::into_scope).collect();
    let thread_id = p.thread_id.map(ThreadId::from_string);

    // Mentions ride along as refs, verbatim, so peers can resolve them.
    let mut refs = p.refs;
    for mention in &mentions {
        let as_ref = MessageRef::mention(mention.as_str());
        if !refs.contains(&as_ref) {
            refs.push(as_ref);
        }
    }
    let reply_parent = refs
        .iter()
        .find(|r| r.ref_type == REF_REPLY_TO)
        .map(|r| MessageId::from_string(r.value.clone()));

    let input = AudienceInput {
        mentions,
        scopes: scopes.clone(),
        thread_id: thread_id.clone(),
        broadcast: p.broadcast,
        reply_parent,
    };
    let audience = audience::resolve_audience(&ctx.store, &author_id, &input).map_err(store_err)?;

    let draft = MessageDraft {
        thread_id,
        author: MessageAuthor { agent_id: author_id, session_id },
        body: MessageBody {
            format: p.format.unwrap_or_else(|| "text".to_string()),
            content: p.content,
            structured: p.structured,
        },
        scopes,
        refs,
    };
    let (message, audience) =
        ctx.store.create_message(draft, audience, ctx.now_ms()).map_err(store_err)?;

    ctx.publish_message(&message);
    info!(message_id = %message.message_id, recipients = audience.len(), "message committed");

    let message_id = message.message_id.clone();
    Ok(json!({ "message_id": message_id, "message": message, "audience": audience }))
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    for_agent: Option<String>,
    #[serde(default)]
    for_agent_role: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    scope: Option<ScopeParam>,
    #[serde(default)]
    created_after: Option<u64>,
    #[serde(default)]
    include_deleted: bool,
    #[serde(flatten)]
    page: PageParams,
}

pub fn list(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: ListParams = parse(&params)?;
    let page = p.page.normalized();
    let filter = MessageFilter {
        thread_id: p.thread_id.map(ThreadId::from_string),
        for_agent: p.for_agent.map(AgentId::new),
        for_agent_role: p.for_agent_role,
        author: p.author.map(AgentId::new),
        scope: p.scope.map(ScopeParam::into_scope),
        created_after: p.created_after,
        include_deleted: p.include_deleted,
    };
    let (items, total) =
        ctx.store.list_messages(&filter, page.offset(), page.page_size).map_err(store_err)?;
    Ok(serde_json::to_value(Page::new(items, total, page))
        .map_err(|e| RpcError::internal(e.to_string()))?)
}

#[derive(Deserialize)]
struct GetParams {
    message_id: String,
}

pub fn get(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: GetParams = parse(&params)?;
    let message = ctx
        .store
        .get_message(&p.message_id)
        .map_err(store_err)?
        .ok_or_else(|| RpcError::not_found(format!("message {}", p.message_id)))?;
    let read_state: Vec<Value> = ctx
        .store
        .read_state(&p.message_id)
        .map_err(store_err)?
        .into_iter()
        .map(|(agent_id, read_at)| json!({ "agent_id": agent_id, "read_at": read_at }))
        .collect();
    Ok(json!({ "message": message, "read_state": read_state }))
}

#[derive(Deserialize)]
struct EditParams {
    message_id: String,
    content: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    structured: Option<Value>,
    #[serde(flatten)]
    caller: CallerParams,
}

pub fn edit(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: EditParams = parse(&params)?;
    let (caller_id, _) = ctx
        .identity
        .resolve(p.caller.caller_agent_id.as_deref(), p.caller.cwd.as_deref())
        .map_err(|e| RpcError::ambiguous_identity(e.to_string()))?;
    let body = MessageBody {
        format: p.format.unwrap_or_else(|| "text".to_string()),
        content: p.content,
        structured: p.structured,
    };
    let message = ctx
        .store
        .edit_message(&MessageId::from_string(p.message_id), &caller_id, body, ctx.now_ms())
        .map_err(store_err)?;
    Ok(json!({ "message": message }))
}

#[derive(Deserialize)]
struct DeleteParams {
    message_id: String,
    #[serde(flatten)]
    caller: CallerParams,
}

pub fn delete(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: DeleteParams = parse(&params)?;
    let (caller_id, _) = ctx
        .identity
        .resolve(p.caller.caller_agent_id.as_deref(), p.caller.cwd.as_deref())
        .map_err(|e| RpcError::ambiguous_identity(e.to_string()))?;
    ctx.store
        .delete_message(&MessageId::from_string(p.message_id.clone()), &caller_id, ctx.now_ms())
        .map_err(store_err)?;
    Ok(json!({ "deleted": p.message_id }))
}

#[derive(Deserialize)]
struct MarkReadParams {
    message_ids: Vec<String>,
    #[serde(flatten)]
    caller: CallerParams,
}

pub fn mark_read(ctx: &Arc<DaemonCtx>, params: Value) -> Result<Value, RpcError> {
    let p: MarkReadParams = parse(&params)?;
    let (caller_id, _) = ctx
        .identity
        .resolve(p.caller.caller_agent_id.as_deref(), p.caller.cwd.as_deref())
        .map_err(|e| RpcError::ambiguous_identity(e.to_string()))?;
    let ids: Vec<MessageId> =
        p.message_ids.into_iter().map(MessageId::from_string).collect();
    let marked = ctx.store.mark_read(&ids, &caller_id, ctx.now_ms()).map_err(store_err)?;
    Ok(json!({ "marked_count": marked }))
}
