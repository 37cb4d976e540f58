// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event log: sequencing, materialization, remote apply.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thrum_core::{Event, EventRecord};

use crate::error::StoreError;
use crate::store::{row_to_record, Store};
use crate::{agents, contexts, groups, messages, peers, sessions, threads};

/// Result of applying a remote event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event was new and has been materialized.
    Applied,
    /// `(origin, sequence)` was already present; the store is unchanged.
    Skipped,
}

/// Assign the next per-origin sequence and insert the event row.
pub(crate) fn append_event_tx(
    tx: &Transaction<'_>,
    origin: &str,
    now: u64,
    event: Event,
) -> Result<EventRecord, StoreError> {
    let sequence = last_seq(tx, origin)? + 1;
    let (kind, payload) = event.into_parts();
    let record = EventRecord {
        origin_daemon_id: origin.to_string(),
        sequence,
        kind,
        created_at: now,
        payload,
    };
    insert_event_row(tx, &record)?;
    Ok(record)
}

pub(crate) fn insert_event_row(
    tx: &Transaction<'_>,
    record: &EventRecord,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO events (origin_daemon_id, sequence, kind, created_at, payload)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.origin_daemon_id,
            record.sequence as i64,
            record.kind,
            record.created_at as i64,
            serde_json::to_string(&record.payload)?,
        ],
    )?;
    Ok(())
}

pub(crate) fn last_seq(conn: &Connection, origin: &str) -> Result<u64, StoreError> {
    let seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sequence), 0) FROM events WHERE origin_daemon_id = ?1",
        [origin],
        |row| row.get(0),
    )?;
    Ok(seq as u64)
}

fn event_exists(conn: &Connection, origin: &str, sequence: u64) -> Result<bool, StoreError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM events WHERE origin_daemon_id = ?1 AND sequence = ?2",
            params![origin, sequence as i64],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Materialize one event into the entity tables. Must be idempotent:
/// events can be re-applied during mirror rebuilds and peer replays.
pub(crate) fn materialize(
    tx: &Transaction<'_>,
    event: &Event,
    local_daemon_id: &str,
) -> Result<(), StoreError> {
    match event {
        Event::AgentRegistered { agent } => agents::upsert_agent_row(tx, agent),
        Event::AgentDeleted { agent_id, deleted_at } => {
            agents::mark_deleted_row(tx, agent_id.as_str(), *deleted_at)
        }
        Event::SessionStarted { session } => sessions::materialize_started(tx, session),
        Event::SessionEnded { session_id, ended_at } => {
            sessions::end_session_row(tx, session_id.as_str(), *ended_at)
        }
        Event::MessageCreated { message, audience } => {
            messages::upsert_message_row(tx, message)?;
            messages::insert_read_state(tx, &message.message_id, audience)
        }
        Event::MessageEdited { message_id, body, version, updated_at } => {
            messages::apply_edit_row(tx, message_id, body, *version, *updated_at)
        }
        Event::MessageDeleted { message_id, deleted_at } => {
            messages::apply_delete_row(tx, message_id, *deleted_at)
        }
        Event::MessageRead { message_id, agent_id, read_at } => {
            messages::set_read_row(tx, message_id, agent_id, *read_at)
        }
        Event::ThreadCreated { thread } => threads::upsert_thread_row(tx, thread),
        Event::GroupCreated { group } => groups::upsert_group_row(tx, group),
        Event::GroupDeleted { group_id, deleted_at } => {
            groups::mark_deleted_row(tx, group_id, *deleted_at)
        }
        Event::GroupMemberAdded { group_id, member } => {
            groups::upsert_member_row(tx, group_id, member)
        }
        Event::GroupMemberRemoved { group_id, member_type, member_value } => {
            groups::remove_member_row(tx, group_id, *member_type, member_value)
        }
        Event::ContextUpdated { context } => contexts::upsert_context_row(tx, context),
        // A replicated pairing never makes a daemon its own peer.
        Event::PeerAdded { peer } if peer.daemon_id != local_daemon_id => {
            peers::insert_peer_info_row(tx, peer)
        }
        Event::PeerAdded { .. } => Ok(()),
        Event::PeerRemoved { daemon_id } => peers::remove_peer_row(tx, daemon_id),
    }
}

impl Store {
    /// Apply an event received from a peer.
    ///
    /// Idempotent on `(origin, sequence)`. A gap in the origin's sequence
    /// is an error so the sync engine can queue and retry after the
    /// missing prefix arrives.
    pub fn apply_remote_event(&self, record: &EventRecord) -> Result<ApplyOutcome, StoreError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let tx = inner.conn.transaction()?;

        if event_exists(&tx, &record.origin_daemon_id, record.sequence)? {
            return Ok(ApplyOutcome::Skipped);
        }
        let head = last_seq(&tx, &record.origin_daemon_id)?;
        if record.sequence != head + 1 {
            return Err(StoreError::SequenceGap {
                origin: record.origin_daemon_id.clone(),
                expected: head + 1,
                got: record.sequence,
            });
        }

        // Unknown kinds are retained in the log without materialization.
        if let Some(event) = record.decode() {
            materialize(&tx, &event, self.daemon_id())?;
        }
        insert_event_row(&tx, record)?;
        tx.commit()?;
        inner.log.append(record)?;
        Ok(ApplyOutcome::Applied)
    }

    /// Events with a storage rowid greater than `after`, in commit order.
    pub fn events_after_rowid(&self, after: i64) -> Result<Vec<(i64, EventRecord)>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT origin_daemon_id, sequence, kind, created_at, payload, id
                 FROM events WHERE id > ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map([after], |row| {
                let record = row_to_record(row)?;
                let id: i64 = row.get(5)?;
                Ok((id, record))
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Events from one origin with sequence strictly greater than `after`.
    pub fn events_for_origin_after(
        &self,
        origin: &str,
        after: u64,
        limit: u64,
    ) -> Result<Vec<EventRecord>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT origin_daemon_id, sequence, kind, created_at, payload
                 FROM events WHERE origin_daemon_id = ?1 AND sequence > ?2
                 ORDER BY sequence LIMIT ?3",
            )?;
            let rows =
                stmt.query_map(params![origin, after as i64, limit as i64], row_to_record)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Highest applied sequence per origin daemon.
    pub fn origin_heads(&self) -> Result<HashMap<String, u64>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT origin_daemon_id, MAX(sequence) FROM events GROUP BY origin_daemon_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?;
            let mut out = HashMap::new();
            for row in rows {
                let (origin, seq) = row?;
                out.insert(origin, seq);
            }
            Ok(out)
        })
    }

    /// Total number of events in the log.
    pub fn event_count(&self) -> Result<u64, StoreError> {
        self.read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get::<_, i64>(0))? as u64))
    }

    /// Highest storage rowid, the branch writer's watermark scale.
    pub fn last_event_rowid(&self) -> Result<i64, StoreError> {
        self.read(|conn| {
            Ok(conn.query_row("SELECT COALESCE(MAX(id), 0) FROM events", [], |row| row.get(0))?)
        })
    }
}

/// All events in commit order (mirror rebuilds).
pub(crate) fn all_events(conn: &Connection) -> Result<Vec<EventRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT origin_daemon_id, sequence, kind, created_at, payload FROM events ORDER BY id",
    )?;
    let rows = stmt.query_map([], row_to_record)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
