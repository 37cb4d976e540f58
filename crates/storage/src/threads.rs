// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread persistence. Threads are never deleted, only emptied.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thrum_core::{AgentId, Event, Scope, Thread, ThreadId};

use crate::error::StoreError;
use crate::store::{from_json_col, to_json_col, Store};

impl Store {
    pub fn create_thread(
        &self,
        title: String,
        created_by: AgentId,
        scopes: Vec<Scope>,
        now: u64,
    ) -> Result<Thread, StoreError> {
        let thread = Thread { thread_id: ThreadId::new(), title, created_by, created_at: now, scopes };
        self.mutate(now, {
            let thread = thread.clone();
            move |_tx| {
                let event = Event::ThreadCreated { thread: thread.clone() };
                Ok((thread, vec![event]))
            }
        })
    }

    pub fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>, StoreError> {
        self.read(|conn| get_thread_row(conn, thread_id))
    }

    pub fn list_threads(&self, offset: u64, limit: u64) -> Result<(Vec<Thread>, u64), StoreError> {
        self.read(|conn| {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM threads", [], |row| row.get(0))?;
            let mut stmt = conn.prepare(&format!(
                "SELECT thread_id, title, created_by, created_at, scopes
                 FROM threads ORDER BY created_at, thread_id LIMIT {} OFFSET {}",
                limit, offset
            ))?;
            let rows = stmt.query_map([], row_to_thread)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok((out, total as u64))
        })
    }
}

pub(crate) fn upsert_thread_row(tx: &Transaction<'_>, thread: &Thread) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO threads (thread_id, title, created_by, created_at, scopes)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(thread_id) DO NOTHING",
        params![
            thread.thread_id.as_str(),
            thread.title,
            thread.created_by.as_str(),
            thread.created_at as i64,
            to_json_col(&thread.scopes)?,
        ],
    )?;
    Ok(())
}

pub(crate) fn get_thread_row(conn: &Connection, thread_id: &str) -> Result<Option<Thread>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT thread_id, title, created_by, created_at, scopes FROM threads WHERE thread_id = ?1",
    )?;
    match stmt.query_row([thread_id], row_to_thread).optional()? {
        Some(result) => Ok(Some(result?)),
        None => Ok(None),
    }
}

#[allow(clippy::type_complexity)]
fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Thread, StoreError>> {
    let scopes: String = row.get(4)?;
    let thread = (|| -> Result<Thread, StoreError> {
        Ok(Thread {
            thread_id: ThreadId::from_string(row.get::<_, String>(0)?),
            title: row.get(1)?,
            created_by: AgentId::new(row.get::<_, String>(2)?),
            created_at: row.get::<_, i64>(3)? as u64,
            scopes: from_json_col(scopes)?,
        })
    })();
    Ok(thread)
}
