// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle: start, heartbeat, intent/task, end.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thrum_core::{AgentId, Event, Scope, Session, SessionId, WorkContext};

use crate::error::StoreError;
use crate::store::{from_json_col, to_json_col, Store};

impl Store {
    /// Open a session for an agent.
    pub fn start_session(
        &self,
        agent_id: AgentId,
        intent: Option<String>,
        current_task: Option<String>,
        scopes: Vec<Scope>,
        refs: Vec<String>,
        now: u64,
    ) -> Result<Session, StoreError> {
        let session = Session {
            session_id: SessionId::new(),
            agent_id,
            started_at: now,
            ended_at: None,
            last_seen_at: now,
            intent,
            current_task,
            scopes,
            refs,
        };
        self.mutate(now, {
            let session = session.clone();
            move |_tx| {
                let event = Event::SessionStarted { session: session.clone() };
                Ok((session, vec![event]))
            }
        })
    }

    /// Close a session. Closing an already-ended session is a no-op.
    pub fn end_session(&self, session_id: &SessionId, now: u64) -> Result<Session, StoreError> {
        let id = session_id.clone();
        self.mutate(now, move |tx| {
            let session = get_session_row(tx, id.as_str())?
                .ok_or_else(|| StoreError::NotFound(format!("session {}", id)))?;
            if session.ended_at.is_some() {
                return Ok((session, vec![]));
            }
            let event = Event::SessionEnded { session_id: id, ended_at: now };
            let ended = Session { ended_at: Some(now), ..session };
            Ok((ended, vec![event]))
        })
    }

    /// Refresh liveness for the session and its agent. No event.
    pub fn heartbeat_session(&self, session_id: &str, now: u64) -> Result<(), StoreError> {
        let guard = self.inner.lock();
        let updated = guard.conn.execute(
            "UPDATE sessions SET last_seen_at = ?1 WHERE session_id = ?2 AND ended_at IS NULL",
            params![now as i64, session_id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("active session {}", session_id)));
        }
        guard.conn.execute(
            "UPDATE agents SET last_seen_at = ?1
             WHERE agent_id = (SELECT agent_id FROM sessions WHERE session_id = ?2)",
            params![now as i64, session_id],
        )?;
        Ok(())
    }

    /// Update the session's declared intent and snapshot the work context.
    pub fn set_session_intent(
        &self,
        session_id: &SessionId,
        intent: Option<String>,
        now: u64,
    ) -> Result<WorkContext, StoreError> {
        self.update_context(session_id, now, move |ctx| ctx.intent = intent)
    }

    /// Update the session's current task and snapshot the work context.
    pub fn set_session_task(
        &self,
        session_id: &SessionId,
        current_task: Option<String>,
        now: u64,
    ) -> Result<WorkContext, StoreError> {
        self.update_context(session_id, now, move |ctx| ctx.current_task = current_task)
    }

    fn update_context(
        &self,
        session_id: &SessionId,
        now: u64,
        apply: impl FnOnce(&mut WorkContext),
    ) -> Result<WorkContext, StoreError> {
        let id = session_id.clone();
        self.mutate(now, move |tx| {
            let session = get_session_row(tx, id.as_str())?
                .ok_or_else(|| StoreError::NotFound(format!("session {}", id)))?;
            if session.ended_at.is_some() {
                return Err(StoreError::NotFound(format!("active session {}", id)));
            }
            let mut context = WorkContext {
                agent_id: session.agent_id.clone(),
                session_id: session.session_id.clone(),
                intent: session.intent.clone(),
                current_task: session.current_task.clone(),
                scopes: session.scopes.clone(),
                refs: session.refs.clone(),
                updated_at: now,
            };
            apply(&mut context);
            let event = Event::ContextUpdated { context: context.clone() };
            Ok((context, vec![event]))
        })
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        self.read(|conn| get_session_row(conn, session_id))
    }

    pub fn list_sessions(
        &self,
        agent_id: Option<&str>,
        active_only: bool,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Session>, u64), StoreError> {
        self.read(|conn| {
            let mut clauses = Vec::new();
            let mut params_vec: Vec<String> = Vec::new();
            if let Some(agent) = agent_id {
                params_vec.push(agent.to_string());
                clauses.push(format!("agent_id = ?{}", params_vec.len()));
            }
            if active_only {
                clauses.push("ended_at IS NULL".to_string());
            }
            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM sessions {}", where_sql),
                rusqlite::params_from_iter(params_vec.iter()),
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT session_id, agent_id, started_at, ended_at, last_seen_at, intent, current_task, scopes, refs
                 FROM sessions {} ORDER BY started_at, session_id LIMIT {} OFFSET {}",
                where_sql, limit, offset
            ))?;
            let rows = stmt.query_map(rusqlite::params_from_iter(params_vec.iter()), row_to_session)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok((out, total as u64))
        })
    }

    /// Active session ids owned by `agent_id`.
    pub fn active_sessions_for_agent(&self, agent_id: &str) -> Result<Vec<SessionId>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id FROM sessions WHERE agent_id = ?1 AND ended_at IS NULL",
            )?;
            let rows = stmt.query_map([agent_id], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(SessionId::from_string(row?));
            }
            Ok(out)
        })
    }
}

pub(crate) fn materialize_started(
    tx: &Transaction<'_>,
    session: &Session,
) -> Result<(), StoreError> {
    upsert_session_row(tx, session)?;
    // Sessions opened with a declared intent/task seed the work context.
    if session.intent.is_some() || session.current_task.is_some() {
        let context = WorkContext {
            agent_id: session.agent_id.clone(),
            session_id: session.session_id.clone(),
            intent: session.intent.clone(),
            current_task: session.current_task.clone(),
            scopes: session.scopes.clone(),
            refs: session.refs.clone(),
            updated_at: session.started_at,
        };
        crate::contexts::upsert_context_row(tx, &context)?;
    }
    Ok(())
}

pub(crate) fn upsert_session_row(tx: &Transaction<'_>, session: &Session) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO sessions (session_id, agent_id, started_at, ended_at, last_seen_at, intent, current_task, scopes, refs)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(session_id) DO UPDATE SET
             ended_at = excluded.ended_at,
             last_seen_at = excluded.last_seen_at,
             intent = excluded.intent,
             current_task = excluded.current_task,
             scopes = excluded.scopes,
             refs = excluded.refs",
        params![
            session.session_id.as_str(),
            session.agent_id.as_str(),
            session.started_at as i64,
            session.ended_at.map(|v| v as i64),
            session.last_seen_at as i64,
            session.intent,
            session.current_task,
            to_json_col(&session.scopes)?,
            to_json_col(&session.refs)?,
        ],
    )?;
    Ok(())
}

pub(crate) fn end_session_row(
    tx: &Transaction<'_>,
    session_id: &str,
    ended_at: u64,
) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE sessions SET ended_at = ?1 WHERE session_id = ?2 AND ended_at IS NULL",
        params![ended_at as i64, session_id],
    )?;
    Ok(())
}

/// Update the session columns mirrored from a context snapshot.
pub(crate) fn sync_session_from_context(
    tx: &Transaction<'_>,
    context: &WorkContext,
) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE sessions SET intent = ?1, current_task = ?2, last_seen_at = ?3
         WHERE session_id = ?4",
        params![
            context.intent,
            context.current_task,
            context.updated_at as i64,
            context.session_id.as_str(),
        ],
    )?;
    Ok(())
}

fn get_session_row(conn: &Connection, session_id: &str) -> Result<Option<Session>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT session_id, agent_id, started_at, ended_at, last_seen_at, intent, current_task, scopes, refs
         FROM sessions WHERE session_id = ?1",
    )?;
    match stmt.query_row([session_id], row_to_session).optional()? {
        Some(result) => Ok(Some(result?)),
        None => Ok(None),
    }
}

#[allow(clippy::type_complexity)]
fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Session, StoreError>> {
    let scopes: String = row.get(7)?;
    let refs: String = row.get(8)?;
    let session = (|| -> Result<Session, StoreError> {
        Ok(Session {
            session_id: SessionId::from_string(row.get::<_, String>(0)?),
            agent_id: AgentId::new(row.get::<_, String>(1)?),
            started_at: row.get::<_, i64>(2)? as u64,
            ended_at: row.get::<_, Option<i64>>(3)?.map(|v| v as u64),
            last_seen_at: row.get::<_, i64>(4)? as u64,
            intent: row.get(5)?,
            current_task: row.get(6)?,
            scopes: from_json_col(scopes)?,
            refs: from_json_col(refs)?,
        })
    })();
    Ok(session)
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;
