// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message persistence: create, edit, tombstone, read-state, listing.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;
use thrum_core::{
    AgentId, Event, Message, MessageAuthor, MessageBody, MessageId, MessageRef, Scope, ThreadId,
};

use crate::error::StoreError;
use crate::store::{from_json_col, to_json_col, Store};

/// Fields of a new message before it is committed.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub thread_id: Option<ThreadId>,
    pub author: MessageAuthor,
    pub body: MessageBody,
    pub scopes: Vec<Scope>,
    /// Includes `mention:` and `reply_to` refs built by the caller.
    pub refs: Vec<MessageRef>,
}

/// Listing filter. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub thread_id: Option<ThreadId>,
    /// Messages addressed to this agent (has a read-state row).
    pub for_agent: Option<AgentId>,
    /// Messages addressed to any agent holding this role.
    pub for_agent_role: Option<String>,
    pub author: Option<AgentId>,
    pub scope: Option<Scope>,
    /// Strict lower bound on `created_at` (epoch ms).
    pub created_after: Option<u64>,
    pub include_deleted: bool,
}

/// A listed message, with per-recipient read state when the filter names
/// a recipient.
#[derive(Debug, Clone, Serialize)]
pub struct ListedMessage {
    #[serde(flatten)]
    pub message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
}

impl Store {
    /// Commit a new message with its resolved audience.
    ///
    /// Every audience member gets an unread read-state row; the author is
    /// never included.
    pub fn create_message(
        &self,
        draft: MessageDraft,
        audience: Vec<AgentId>,
        now: u64,
    ) -> Result<(Message, Vec<AgentId>), StoreError> {
        let message = Message {
            message_id: MessageId::new(),
            thread_id: draft.thread_id,
            author: draft.author,
            body: draft.body,
            scopes: draft.scopes,
            refs: draft.refs,
            created_at: now,
            updated_at: None,
            deleted: false,
            version: 1,
        };
        let audience: Vec<AgentId> =
            audience.into_iter().filter(|a| *a != message.author.agent_id).collect();
        self.mutate(now, {
            let message = message.clone();
            let audience = audience.clone();
            move |_tx| {
                let event =
                    Event::MessageCreated { message: message.clone(), audience: audience.clone() };
                Ok(((message, audience), vec![event]))
            }
        })
    }

    pub fn get_message(&self, message_id: &str) -> Result<Option<Message>, StoreError> {
        self.read(|conn| get_message_row(conn, message_id))
    }

    /// Edit a message body. Author-only; bumps `version` and guarantees
    /// `updated_at` strictly increases.
    pub fn edit_message(
        &self,
        message_id: &MessageId,
        caller: &AgentId,
        body: MessageBody,
        now: u64,
    ) -> Result<Message, StoreError> {
        let id = message_id.clone();
        let caller = caller.clone();
        self.mutate(now, move |tx| {
            let current = get_message_row(tx, id.as_str())?
                .filter(|m| !m.deleted)
                .ok_or_else(|| StoreError::NotFound(format!("message {}", id)))?;
            if current.author.agent_id != caller {
                return Err(StoreError::PermissionDenied(format!(
                    "message {} belongs to {}",
                    id, current.author.agent_id
                )));
            }
            let version = current.version + 1;
            let floor = current.updated_at.unwrap_or(current.created_at);
            let updated_at = now.max(floor + 1);
            let event = Event::MessageEdited {
                message_id: id.clone(),
                body: body.clone(),
                version,
                updated_at,
            };
            let edited = Message {
                body,
                version,
                updated_at: Some(updated_at),
                ..current
            };
            Ok((edited, vec![event]))
        })
    }

    /// Tombstone a message. Author-only. The tombstone is immutable:
    /// further edits and deletes see `NotFound`.
    pub fn delete_message(
        &self,
        message_id: &MessageId,
        caller: &AgentId,
        now: u64,
    ) -> Result<(), StoreError> {
        let id = message_id.clone();
        let caller = caller.clone();
        self.mutate(now, move |tx| {
            let current = get_message_row(tx, id.as_str())?
                .filter(|m| !m.deleted)
                .ok_or_else(|| StoreError::NotFound(format!("message {}", id)))?;
            if current.author.agent_id != caller {
                return Err(StoreError::PermissionDenied(format!(
                    "message {} belongs to {}",
                    id, current.author.agent_id
                )));
            }
            let event = Event::MessageDeleted { message_id: id, deleted_at: now };
            Ok(((), vec![event]))
        })
    }

    /// Mark messages read for an agent. Idempotent: already-read rows are
    /// untouched and not counted.
    pub fn mark_read(
        &self,
        message_ids: &[MessageId],
        agent_id: &AgentId,
        now: u64,
    ) -> Result<u64, StoreError> {
        let ids: Vec<MessageId> = message_ids.to_vec();
        let agent = agent_id.clone();
        self.mutate(now, move |tx| {
            let mut events = Vec::new();
            let mut marked = 0u64;
            for id in &ids {
                let unread: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM read_state
                         WHERE message_id = ?1 AND agent_id = ?2 AND read_at IS NULL",
                        params![id.as_str(), agent.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;
                if unread.is_some() {
                    marked += 1;
                    events.push(Event::MessageRead {
                        message_id: id.clone(),
                        agent_id: agent.clone(),
                        read_at: now,
                    });
                }
            }
            Ok((marked, events))
        })
    }

    /// Read-state rows for a message: `(agent_id, read_at)`.
    pub fn read_state(&self, message_id: &str) -> Result<Vec<(AgentId, Option<u64>)>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT agent_id, read_at FROM read_state WHERE message_id = ?1 ORDER BY agent_id",
            )?;
            let rows = stmt.query_map([message_id], |row| {
                Ok((
                    AgentId::new(row.get::<_, String>(0)?),
                    row.get::<_, Option<i64>>(1)?.map(|v| v as u64),
                ))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    pub fn list_messages(
        &self,
        filter: &MessageFilter,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<ListedMessage>, u64), StoreError> {
        self.read(|conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut args: Vec<SqlValue> = Vec::new();

            if !filter.include_deleted {
                clauses.push("m.deleted = 0".to_string());
            }
            if let Some(thread_id) = &filter.thread_id {
                args.push(SqlValue::Text(thread_id.as_str().to_string()));
                clauses.push(format!("m.thread_id = ?{}", args.len()));
            }
            if let Some(author) = &filter.author {
                args.push(SqlValue::Text(author.as_str().to_string()));
                clauses.push(format!("m.author_agent_id = ?{}", args.len()));
            }
            if let Some(agent) = &filter.for_agent {
                args.push(SqlValue::Text(agent.as_str().to_string()));
                clauses.push(format!(
                    "EXISTS (SELECT 1 FROM read_state rs
                      WHERE rs.message_id = m.message_id AND rs.agent_id = ?{})",
                    args.len()
                ));
            }
            if let Some(role) = &filter.for_agent_role {
                args.push(SqlValue::Text(role.clone()));
                clauses.push(format!(
                    "EXISTS (SELECT 1 FROM read_state rs
                      JOIN agents a ON a.agent_id = rs.agent_id
                      WHERE rs.message_id = m.message_id AND a.role = ?{})",
                    args.len()
                ));
            }
            if let Some(scope) = &filter.scope {
                args.push(SqlValue::Text(scope.scope_type.clone()));
                let type_idx = args.len();
                args.push(SqlValue::Text(scope.value.clone()));
                clauses.push(format!(
                    "EXISTS (SELECT 1 FROM message_scopes ms
                      WHERE ms.message_id = m.message_id
                        AND ms.scope_type = ?{} AND ms.scope_value = ?{})",
                    type_idx,
                    args.len()
                ));
            }
            if let Some(after) = filter.created_after {
                args.push(SqlValue::Integer(after as i64));
                clauses.push(format!("m.created_at > ?{}", args.len()));
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM messages m {}", where_sql),
                rusqlite::params_from_iter(args.iter()),
                |row| row.get(0),
            )?;

            // is_read is resolved against for_agent, or "any holder of the
            // role has read it" for role filters.
            let read_select = if let Some(agent) = &filter.for_agent {
                args.push(SqlValue::Text(agent.as_str().to_string()));
                format!(
                    "(SELECT rs.read_at IS NOT NULL FROM read_state rs
                       WHERE rs.message_id = m.message_id AND rs.agent_id = ?{})",
                    args.len()
                )
            } else if let Some(role) = &filter.for_agent_role {
                args.push(SqlValue::Text(role.clone()));
                format!(
                    "EXISTS (SELECT 1 FROM read_state rs
                       JOIN agents a ON a.agent_id = rs.agent_id
                       WHERE rs.message_id = m.message_id AND a.role = ?{}
                         AND rs.read_at IS NOT NULL)",
                    args.len()
                )
            } else {
                "NULL".to_string()
            };

            let mut stmt = conn.prepare(&format!(
                "SELECT m.message_id, m.thread_id, m.author_agent_id, m.author_session_id,
                        m.body, m.scopes, m.refs, m.created_at, m.updated_at, m.deleted, m.version,
                        {} AS is_read
                 FROM messages m {} ORDER BY m.created_at, m.message_id LIMIT {} OFFSET {}",
                read_select, where_sql, limit, offset
            ))?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), |row| {
                let message = row_to_message(row)?;
                let is_read: Option<bool> = row.get(11)?;
                Ok(message.map(|m| ListedMessage { message: m, is_read }))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok((out, total as u64))
        })
    }

    /// Agents that have authored in or been addressed by a thread.
    pub fn thread_participants(&self, thread_id: &str) -> Result<Vec<AgentId>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT author_agent_id FROM messages WHERE thread_id = ?1
                 UNION
                 SELECT DISTINCT rs.agent_id FROM read_state rs
                 JOIN messages m ON m.message_id = rs.message_id
                 WHERE m.thread_id = ?1",
            )?;
            let rows = stmt.query_map([thread_id], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(AgentId::new(row?));
            }
            Ok(out)
        })
    }
}

pub(crate) fn upsert_message_row(tx: &Transaction<'_>, message: &Message) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO messages (message_id, thread_id, author_agent_id, author_session_id,
                               body, scopes, refs, created_at, updated_at, deleted, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(message_id) DO NOTHING",
        params![
            message.message_id.as_str(),
            message.thread_id.as_ref().map(|t| t.as_str().to_string()),
            message.author.agent_id.as_str(),
            message.author.session_id.as_ref().map(|s| s.as_str().to_string()),
            to_json_col(&message.body)?,
            to_json_col(&message.scopes)?,
            to_json_col(&message.refs)?,
            message.created_at as i64,
            message.updated_at.map(|v| v as i64),
            message.deleted as i64,
            message.version as i64,
        ],
    )?;
    for scope in &message.scopes {
        tx.execute(
            "INSERT OR IGNORE INTO message_scopes (message_id, scope_type, scope_value)
             VALUES (?1, ?2, ?3)",
            params![message.message_id.as_str(), scope.scope_type, scope.value],
        )?;
    }
    Ok(())
}

pub(crate) fn insert_read_state(
    tx: &Transaction<'_>,
    message_id: &MessageId,
    audience: &[AgentId],
) -> Result<(), StoreError> {
    for agent in audience {
        tx.execute(
            "INSERT OR IGNORE INTO read_state (message_id, agent_id, read_at)
             VALUES (?1, ?2, NULL)",
            params![message_id.as_str(), agent.as_str()],
        )?;
    }
    Ok(())
}

pub(crate) fn apply_edit_row(
    tx: &Transaction<'_>,
    message_id: &MessageId,
    body: &MessageBody,
    version: u64,
    updated_at: u64,
) -> Result<(), StoreError> {
    // Guarded on version so replays and out-of-order edits cannot regress.
    tx.execute(
        "UPDATE messages SET body = ?1, version = ?2, updated_at = ?3
         WHERE message_id = ?4 AND deleted = 0 AND version < ?2",
        params![to_json_col(body)?, version as i64, updated_at as i64, message_id.as_str()],
    )?;
    Ok(())
}

pub(crate) fn apply_delete_row(
    tx: &Transaction<'_>,
    message_id: &MessageId,
    deleted_at: u64,
) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE messages SET deleted = 1, updated_at = ?1 WHERE message_id = ?2",
        params![deleted_at as i64, message_id.as_str()],
    )?;
    Ok(())
}

pub(crate) fn set_read_row(
    tx: &Transaction<'_>,
    message_id: &MessageId,
    agent_id: &AgentId,
    read_at: u64,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO read_state (message_id, agent_id, read_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(message_id, agent_id) DO UPDATE SET read_at = excluded.read_at
         WHERE read_state.read_at IS NULL",
        params![message_id.as_str(), agent_id.as_str(), read_at as i64],
    )?;
    Ok(())
}

pub(crate) fn get_message_row(
    conn: &Connection,
    message_id: &str,
) -> Result<Option<Message>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT message_id, thread_id, author_agent_id, author_session_id,
                body, scopes, refs, created_at, updated_at, deleted, version
         FROM messages WHERE message_id = ?1",
    )?;
    match stmt.query_row([message_id], row_to_message).optional()? {
        Some(result) => Ok(Some(result?)),
        None => Ok(None),
    }
}

#[allow(clippy::type_complexity)]
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Message, StoreError>> {
    let body: String = row.get(4)?;
    let scopes: String = row.get(5)?;
    let refs: String = row.get(6)?;
    let message = (|| -> Result<Message, StoreError> {
        Ok(Message {
            message_id: MessageId::from_string(row.get::<_, String>(0)?),
            thread_id: row.get::<_, Option<String>>(1)?.map(ThreadId::from_string),
            author: MessageAuthor {
                agent_id: AgentId::new(row.get::<_, String>(2)?),
                session_id: row
                    .get::<_, Option<String>>(3)?
                    .map(thrum_core::SessionId::from_string),
            },
            body: from_json_col(body)?,
            scopes: from_json_col(scopes)?,
            refs: from_json_col(refs)?,
            created_at: row.get::<_, i64>(7)? as u64,
            updated_at: row.get::<_, Option<i64>>(8)?.map(|v| v as u64),
            deleted: row.get::<_, i64>(9)? != 0,
            version: row.get::<_, i64>(10)? as u64,
        })
    })();
    Ok(message)
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
