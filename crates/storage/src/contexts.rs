// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work-context snapshots.

use rusqlite::{params, OptionalExtension, Transaction};
use thrum_core::{AgentId, SessionId, WorkContext};

use crate::error::StoreError;
use crate::store::{from_json_col, to_json_col, Store};

impl Store {
    pub fn get_context(&self, agent_id: &str) -> Result<Option<WorkContext>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT agent_id, session_id, intent, current_task, scopes, refs, updated_at
                 FROM work_contexts WHERE agent_id = ?1",
            )?;
            match stmt.query_row([agent_id], row_to_context).optional()? {
                Some(result) => Ok(Some(result?)),
                None => Ok(None),
            }
        })
    }

    pub fn list_contexts(&self, offset: u64, limit: u64) -> Result<(Vec<WorkContext>, u64), StoreError> {
        self.read(|conn| {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM work_contexts", [], |row| row.get(0))?;
            let mut stmt = conn.prepare(&format!(
                "SELECT agent_id, session_id, intent, current_task, scopes, refs, updated_at
                 FROM work_contexts ORDER BY updated_at DESC, agent_id LIMIT {} OFFSET {}",
                limit, offset
            ))?;
            let rows = stmt.query_map([], row_to_context)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok((out, total as u64))
        })
    }
}

/// Upsert the latest snapshot for the agent and mirror the intent/task
/// columns onto the owning session row.
pub(crate) fn upsert_context_row(
    tx: &Transaction<'_>,
    context: &WorkContext,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO work_contexts (agent_id, session_id, intent, current_task, scopes, refs, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(agent_id) DO UPDATE SET
             session_id = excluded.session_id,
             intent = excluded.intent,
             current_task = excluded.current_task,
             scopes = excluded.scopes,
             refs = excluded.refs,
             updated_at = excluded.updated_at",
        params![
            context.agent_id.as_str(),
            context.session_id.as_str(),
            context.intent,
            context.current_task,
            to_json_col(&context.scopes)?,
            to_json_col(&context.refs)?,
            context.updated_at as i64,
        ],
    )?;
    crate::sessions::sync_session_from_context(tx, context)
}

#[allow(clippy::type_complexity)]
fn row_to_context(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<WorkContext, StoreError>> {
    let scopes: String = row.get(4)?;
    let refs: String = row.get(5)?;
    let context = (|| -> Result<WorkContext, StoreError> {
        Ok(WorkContext {
            agent_id: AgentId::new(row.get::<_, String>(0)?),
            session_id: SessionId::from_string(row.get::<_, String>(1)?),
            intent: row.get(2)?,
            current_task: row.get(3)?,
            scopes: from_json_col(scopes)?,
            refs: from_json_col(refs)?,
            updated_at: row.get::<_, i64>(6)? as u64,
        })
    })();
    Ok(context)
}
