// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer records. Tokens stay local; only [`PeerInfo`] enters the event
//! log.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thrum_core::{Event, Peer, PeerInfo};

use crate::error::StoreError;
use crate::store::{from_json_col, to_json_col, Store};

impl Store {
    /// Persist a pairing. Writes the full record (token included) and
    /// logs the token-free view.
    pub fn upsert_peer(&self, peer: Peer, now: u64) -> Result<(), StoreError> {
        self.mutate(now, move |tx| {
            write_peer_row(tx, &peer)?;
            let event = Event::PeerAdded { peer: peer.info() };
            Ok(((), vec![event]))
        })
    }

    pub fn remove_peer(&self, daemon_id: &str, now: u64) -> Result<(), StoreError> {
        let daemon_id = daemon_id.to_string();
        self.mutate(now, move |tx| {
            let existing: Option<i64> = tx
                .query_row("SELECT 1 FROM peers WHERE daemon_id = ?1", [&daemon_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if existing.is_none() {
                return Err(StoreError::NotFound(format!("peer {}", daemon_id)));
            }
            let event = Event::PeerRemoved { daemon_id: daemon_id.clone() };
            Ok(((), vec![event]))
        })
    }

    pub fn get_peer(&self, daemon_id: &str) -> Result<Option<Peer>, StoreError> {
        self.read(|conn| get_peer_row(conn, daemon_id))
    }

    /// The peer presenting `token`, if any non-disabled pairing matches.
    pub fn peer_by_token(&self, token: &str) -> Result<Option<Peer>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(&format!("{} WHERE auth_token = ?1", PEER_SELECT))?;
            match stmt.query_row([token], row_to_peer).optional()? {
                Some(result) => Ok(Some(result?)),
                None => Ok(None),
            }
        })
    }

    pub fn list_peers(&self, offset: u64, limit: u64) -> Result<(Vec<Peer>, u64), StoreError> {
        self.read(|conn| {
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM peers", [], |row| row.get(0))?;
            let mut stmt = conn.prepare(&format!(
                "{} ORDER BY paired_at, daemon_id LIMIT {} OFFSET {}",
                PEER_SELECT, limit, offset
            ))?;
            let rows = stmt.query_map([], row_to_peer)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row??);
            }
            Ok((out, total as u64))
        })
    }

    /// Record a successful exchange: merge per-origin heads and stamp
    /// `last_sync`. No event; sync progress is local bookkeeping.
    pub fn record_peer_sync(
        &self,
        daemon_id: &str,
        heads: &HashMap<String, u64>,
        now: u64,
    ) -> Result<(), StoreError> {
        let guard = self.inner.lock();
        let current: Option<String> = guard
            .conn
            .query_row("SELECT last_synced_seq FROM peers WHERE daemon_id = ?1", [daemon_id], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(current) = current else {
            return Err(StoreError::NotFound(format!("peer {}", daemon_id)));
        };
        let mut merged: HashMap<String, u64> = from_json_col(current)?;
        for (origin, seq) in heads {
            let entry = merged.entry(origin.clone()).or_insert(0);
            *entry = (*entry).max(*seq);
        }
        guard.conn.execute(
            "UPDATE peers SET last_sync = ?1, last_synced_seq = ?2 WHERE daemon_id = ?3",
            params![now as i64, to_json_col(&merged)?, daemon_id],
        )?;
        Ok(())
    }

    /// Disable sync after a token rejection. Cleared by re-pairing.
    pub fn set_peer_sync_disabled(&self, daemon_id: &str, disabled: bool) -> Result<(), StoreError> {
        let guard = self.inner.lock();
        guard.conn.execute(
            "UPDATE peers SET sync_disabled = ?1 WHERE daemon_id = ?2",
            params![disabled as i64, daemon_id],
        )?;
        Ok(())
    }
}

const PEER_SELECT: &str = "SELECT daemon_id, name, address, paired_at, last_sync, last_synced_seq, auth_token, sync_disabled FROM peers";

fn write_peer_row(tx: &Transaction<'_>, peer: &Peer) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO peers (daemon_id, name, address, paired_at, last_sync, last_synced_seq, auth_token, sync_disabled)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(daemon_id) DO UPDATE SET
             name = excluded.name,
             address = excluded.address,
             paired_at = excluded.paired_at,
             auth_token = excluded.auth_token,
             sync_disabled = excluded.sync_disabled",
        params![
            peer.daemon_id,
            peer.name,
            peer.address,
            peer.paired_at as i64,
            peer.last_sync.map(|v| v as i64),
            to_json_col(&peer.last_synced_seq)?,
            peer.auth_token,
            peer.sync_disabled as i64,
        ],
    )?;
    Ok(())
}

/// Replicated `peer.added`: record the peer only if unknown, without a
/// token (pairing is local).
pub(crate) fn insert_peer_info_row(tx: &Transaction<'_>, info: &PeerInfo) -> Result<(), StoreError> {
    tx.execute(
        "INSERT OR IGNORE INTO peers (daemon_id, name, address, paired_at, last_synced_seq)
         VALUES (?1, ?2, ?3, ?4, '{}')",
        params![info.daemon_id, info.name, info.address, info.paired_at as i64],
    )?;
    Ok(())
}

pub(crate) fn remove_peer_row(tx: &Transaction<'_>, daemon_id: &str) -> Result<(), StoreError> {
    tx.execute("DELETE FROM peers WHERE daemon_id = ?1", [daemon_id])?;
    Ok(())
}

fn get_peer_row(conn: &Connection, daemon_id: &str) -> Result<Option<Peer>, StoreError> {
    let mut stmt = conn.prepare(&format!("{} WHERE daemon_id = ?1", PEER_SELECT))?;
    match stmt.query_row([daemon_id], row_to_peer).optional()? {
        Some(result) => Ok(Some(result?)),
        None => Ok(None),
    }
}

#[allow(clippy::type_complexity)]
fn row_to_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Peer, StoreError>> {
    let seqs: String = row.get(5)?;
    let peer = (|| -> Result<Peer, StoreError> {
        Ok(Peer {
            daemon_id: row.get(0)?,
            name: row.get(1)?,
            address: row.get(2)?,
            paired_at: row.get::<_, i64>(3)? as u64,
            last_sync: row.get::<_, Option<i64>>(4)?.map(|v| v as u64),
            last_synced_seq: from_json_col(seqs)?,
            auth_token: row.get(6)?,
            sync_disabled: row.get::<_, i64>(7)? != 0,
        })
    })();
    Ok(peer)
}
