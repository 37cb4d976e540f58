// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Store: single-writer SQLite connection plus the JSON-lines mirror.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Transaction};
use thrum_core::{Event, EventRecord};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::events;
use crate::jsonl::EventLog;
use crate::schema;

pub(crate) struct Inner {
    pub conn: Connection,
    pub log: EventLog,
}

/// Durable store colocated with the daemon. All writes serialize through
/// the inner mutex; every mutation appends to the event log inside the
/// entity transaction.
pub struct Store {
    pub(crate) inner: Mutex<Inner>,
    daemon_id: String,
    dir: PathBuf,
}

impl Store {
    /// Open (or create) the store under `dir`, typically `.thrum/var`.
    ///
    /// Runs migrations, loads or mints the daemon id, and reconciles the
    /// `events.jsonl` mirror with the events table.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join("thrum.db"))?;
        schema::migrate(&conn)?;

        let daemon_id = load_or_create_daemon_id(&conn)?;
        let log = EventLog::open(&dir.join("events.jsonl"))?;

        let store = Self { inner: Mutex::new(Inner { conn, log }), daemon_id, dir: dir.to_path_buf() };
        store.reconcile_log()?;
        Ok(store)
    }

    /// This daemon's stable origin id.
    pub fn daemon_id(&self) -> &str {
        &self.daemon_id
    }

    /// Directory the store lives in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run `f` inside the single-writer transaction.
    ///
    /// `f` performs reads and validation and returns the events to commit;
    /// each event is materialized into the entity tables, sequenced into
    /// the events table, and mirrored to `events.jsonl` after commit. `f`
    /// may also write rows directly for local-only columns (peer tokens);
    /// materialization is idempotent so the later apply is harmless.
    pub(crate) fn mutate<T>(
        &self,
        now: u64,
        f: impl FnOnce(&Transaction<'_>) -> Result<(T, Vec<Event>), StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let tx = inner.conn.transaction()?;
        let (value, new_events) = f(&tx)?;
        let mut records = Vec::with_capacity(new_events.len());
        for event in new_events {
            events::materialize(&tx, &event, &self.daemon_id)?;
            let record = events::append_event_tx(&tx, &self.daemon_id, now, event)?;
            records.push(record);
        }
        tx.commit()?;
        for record in &records {
            inner.log.append(record)?;
        }
        Ok(value)
    }

    /// Run a read-only closure against a snapshot of the database.
    pub(crate) fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let guard = self.inner.lock();
        f(&guard.conn)
    }

    /// Get a value from the meta table.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read(|conn| {
            Ok(conn
                .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0))
                .optional()?)
        })
    }

    /// Set a value in the meta table.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let guard = self.inner.lock();
        guard.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    /// Rebuild `events.jsonl` when it disagrees with the events table.
    fn reconcile_log(&self) -> Result<(), StoreError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let db_count: u64 =
            inner.conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        match inner.log.line_count()? {
            Some(lines) if lines == db_count => Ok(()),
            Some(lines) => {
                info!(lines, db_count, "event log mirror out of date, rebuilding");
                let records = events::all_events(&inner.conn)?;
                inner.log.rebuild(&records)
            }
            None => {
                warn!("event log mirror corrupt, rebuilding from database");
                inner.log.quarantine()?;
                let records = events::all_events(&inner.conn)?;
                inner.log.rebuild(&records)
            }
        }
    }
}

fn load_or_create_daemon_id(conn: &Connection) -> Result<String, StoreError> {
    let existing: Option<String> = conn
        .query_row("SELECT value FROM meta WHERE key = 'daemon_id'", [], |row| row.get(0))
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    let id = format!("d_{}", thrum_core::id::random_suffix());
    conn.execute("INSERT INTO meta (key, value) VALUES ('daemon_id', ?1)", [&id])?;
    Ok(id)
}

/// Helper for rows that store JSON columns.
pub(crate) fn from_json_col<T: serde::de::DeserializeOwned>(raw: String) -> Result<T, StoreError> {
    Ok(serde_json::from_str(&raw)?)
}

pub(crate) fn to_json_col<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

/// Shared helper: decode one event row (origin, sequence, kind,
/// created_at, payload) from a query.
pub(crate) fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRecord> {
    let payload: String = row.get(4)?;
    Ok(EventRecord {
        origin_daemon_id: row.get(0)?,
        sequence: row.get::<_, i64>(1)? as u64,
        kind: row.get(2)?,
        created_at: row.get::<_, i64>(3)? as u64,
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
    })
}

#[cfg(test)]
pub(crate) fn test_store() -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    (store, dir)
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
