// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent registration and roster queries.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thrum_core::{agent_name, agent_name_salted, Agent, AgentId, Event};

use crate::error::StoreError;
use crate::store::Store;

/// Registration flags from `agent.register`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PutAgentOptions {
    /// Tombstone any colliding registration and mint a fresh id.
    pub force: bool,
    /// Refresh the colliding registration in place, keeping its id.
    pub re_register: bool,
}

/// What `put_agent` did.
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    Registered(Agent),
    ReRegistered(Agent),
    /// A non-deleted agent already holds (role, module, worktree); the
    /// existing record is returned for the conflict response.
    Conflict(Agent),
}

/// Roster listing filter.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub role: Option<String>,
    pub include_deleted: bool,
}

impl Store {
    /// Register an agent for (role, module, worktree).
    ///
    /// At most one non-deleted agent per (role, module, worktree) unless
    /// `re_register` or `force` is set.
    pub fn put_agent(
        &self,
        role: &str,
        module: &str,
        display: Option<String>,
        worktree: &str,
        now: u64,
        opts: PutAgentOptions,
    ) -> Result<RegisterOutcome, StoreError> {
        let role = role.to_string();
        let module = module.to_string();
        let worktree = worktree.to_string();
        self.mutate(now, move |tx| {
            let existing = find_by_role_module(tx, &role, &module, &worktree)?;
            match existing {
                Some(current) if !opts.force && !opts.re_register => {
                    Ok((RegisterOutcome::Conflict(current), vec![]))
                }
                Some(current) if opts.re_register => {
                    let agent = Agent {
                        display: display.or(current.display),
                        last_seen_at: now,
                        deleted: false,
                        ..current
                    };
                    let event = Event::AgentRegistered { agent: agent.clone() };
                    Ok((RegisterOutcome::ReRegistered(agent), vec![event]))
                }
                Some(current) => {
                    // force: tombstone the old record, mint a salted id
                    let agent = Agent {
                        agent_id: AgentId::new(agent_name_salted(&role, &module, &worktree, now)),
                        role: role.clone(),
                        module: module.clone(),
                        display,
                        worktree: worktree.clone(),
                        registered_at: now,
                        last_seen_at: now,
                        deleted: false,
                    };
                    let events = vec![
                        Event::AgentDeleted { agent_id: current.agent_id, deleted_at: now },
                        Event::AgentRegistered { agent: agent.clone() },
                    ];
                    Ok((RegisterOutcome::Registered(agent), events))
                }
                None => {
                    let agent = Agent {
                        agent_id: AgentId::new(agent_name(&role, &module, &worktree)),
                        role: role.clone(),
                        module: module.clone(),
                        display,
                        worktree: worktree.clone(),
                        registered_at: now,
                        last_seen_at: now,
                        deleted: false,
                    };
                    let event = Event::AgentRegistered { agent: agent.clone() };
                    Ok((RegisterOutcome::Registered(agent), vec![event]))
                }
            }
        })
    }

    pub fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError> {
        self.read(|conn| get_agent_row(conn, agent_id))
    }

    /// Soft-delete an agent. Missing or already-deleted agents are
    /// `NotFound`.
    pub fn delete_agent(&self, agent_id: &AgentId, now: u64) -> Result<(), StoreError> {
        let id = agent_id.clone();
        self.mutate(now, move |tx| {
            match get_agent_row(tx, id.as_str())? {
                Some(agent) if !agent.deleted => {
                    Ok(((), vec![Event::AgentDeleted { agent_id: id, deleted_at: now }]))
                }
                _ => Err(StoreError::NotFound(format!("agent {}", id))),
            }
        })
    }

    /// Soft-delete agents not seen for `older_than_ms`. Returns the ids
    /// removed.
    pub fn cleanup_agents(&self, older_than_ms: u64, now: u64) -> Result<Vec<AgentId>, StoreError> {
        let threshold = now.saturating_sub(older_than_ms);
        self.mutate(now, move |tx| {
            let mut stmt = tx.prepare(
                "SELECT agent_id FROM agents WHERE deleted = 0 AND last_seen_at < ?1",
            )?;
            let rows = stmt.query_map([threshold as i64], |row| row.get::<_, String>(0))?;
            let mut removed = Vec::new();
            let mut events = Vec::new();
            for row in rows {
                let id = AgentId::new(row?);
                events.push(Event::AgentDeleted { agent_id: id.clone(), deleted_at: now });
                removed.push(id);
            }
            Ok((removed, events))
        })
    }

    /// Refresh `last_seen_at` without an event (heartbeat path).
    pub fn touch_agent(&self, agent_id: &str, now: u64) -> Result<(), StoreError> {
        let guard = self.inner.lock();
        guard.conn.execute(
            "UPDATE agents SET last_seen_at = ?1 WHERE agent_id = ?2",
            params![now as i64, agent_id],
        )?;
        Ok(())
    }

    pub fn list_agents(
        &self,
        filter: &AgentFilter,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<Agent>, u64), StoreError> {
        self.read(|conn| {
            let (where_sql, role_param) = match (&filter.role, filter.include_deleted) {
                (Some(role), false) => ("WHERE deleted = 0 AND role = ?1", Some(role.clone())),
                (Some(role), true) => ("WHERE role = ?1", Some(role.clone())),
                (None, false) => ("WHERE deleted = 0", None),
                (None, true) => ("", None),
            };
            let count_sql = format!("SELECT COUNT(*) FROM agents {}", where_sql);
            let list_sql = format!(
                "SELECT agent_id, role, module, display, worktree, registered_at, last_seen_at, deleted
                 FROM agents {} ORDER BY registered_at, agent_id LIMIT {} OFFSET {}",
                where_sql, limit, offset
            );
            let total: i64 = match &role_param {
                Some(role) => conn.query_row(&count_sql, [role], |row| row.get(0))?,
                None => conn.query_row(&count_sql, [], |row| row.get(0))?,
            };
            let mut stmt = conn.prepare(&list_sql)?;
            let mut out = Vec::new();
            match &role_param {
                Some(role) => {
                    let rows = stmt.query_map([role], row_to_agent)?;
                    for row in rows {
                        out.push(row?);
                    }
                }
                None => {
                    let rows = stmt.query_map([], row_to_agent)?;
                    for row in rows {
                        out.push(row?);
                    }
                }
            }
            Ok((out, total as u64))
        })
    }

    /// Non-deleted agents holding `role`.
    pub fn agents_with_role(&self, role: &str) -> Result<Vec<AgentId>, StoreError> {
        self.read(|conn| {
            let mut stmt =
                conn.prepare("SELECT agent_id FROM agents WHERE deleted = 0 AND role = ?1")?;
            let rows = stmt.query_map([role], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(AgentId::new(row?));
            }
            Ok(out)
        })
    }

    /// All non-deleted agents (the broadcast audience before author
    /// removal).
    pub fn active_agents(&self) -> Result<Vec<AgentId>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT agent_id FROM agents WHERE deleted = 0")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(AgentId::new(row?));
            }
            Ok(out)
        })
    }
}

pub(crate) fn upsert_agent_row(tx: &Transaction<'_>, agent: &Agent) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO agents (agent_id, role, module, display, worktree, registered_at, last_seen_at, deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(agent_id) DO UPDATE SET
             role = excluded.role,
             module = excluded.module,
             display = excluded.display,
             worktree = excluded.worktree,
             last_seen_at = excluded.last_seen_at,
             deleted = excluded.deleted",
        params![
            agent.agent_id.as_str(),
            agent.role,
            agent.module,
            agent.display,
            agent.worktree,
            agent.registered_at as i64,
            agent.last_seen_at as i64,
            agent.deleted as i64,
        ],
    )?;
    Ok(())
}

pub(crate) fn mark_deleted_row(
    tx: &Transaction<'_>,
    agent_id: &str,
    deleted_at: u64,
) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE agents SET deleted = 1, last_seen_at = ?1 WHERE agent_id = ?2",
        params![deleted_at as i64, agent_id],
    )?;
    Ok(())
}

fn find_by_role_module(
    conn: &Connection,
    role: &str,
    module: &str,
    worktree: &str,
) -> Result<Option<Agent>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT agent_id, role, module, display, worktree, registered_at, last_seen_at, deleted
         FROM agents WHERE deleted = 0 AND role = ?1 AND module = ?2 AND worktree = ?3",
    )?;
    Ok(stmt.query_row(params![role, module, worktree], row_to_agent).optional()?)
}

pub(crate) fn get_agent_row(conn: &Connection, agent_id: &str) -> Result<Option<Agent>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT agent_id, role, module, display, worktree, registered_at, last_seen_at, deleted
         FROM agents WHERE agent_id = ?1",
    )?;
    Ok(stmt.query_row([agent_id], row_to_agent).optional()?)
}

fn row_to_agent(row: &rusqlite::Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        agent_id: AgentId::new(row.get::<_, String>(0)?),
        role: row.get(1)?,
        module: row.get(2)?,
        display: row.get(3)?,
        worktree: row.get(4)?,
        registered_at: row.get::<_, i64>(5)? as u64,
        last_seen_at: row.get::<_, i64>(6)? as u64,
        deleted: row.get::<_, i64>(7)? != 0,
    })
}

#[cfg(test)]
#[path = "agents_tests.rs"]
mod tests;
