// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Group CRUD and membership, with cycle rejection on insert.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thrum_core::{would_create_cycle, AgentId, Event, Group, GroupId, GroupMember, MemberType};

use crate::error::StoreError;
use crate::store::Store;

impl Store {
    /// Create a group. `name` must be unique among non-deleted groups.
    pub fn create_group(
        &self,
        name: String,
        description: Option<String>,
        created_by: AgentId,
        now: u64,
    ) -> Result<Group, StoreError> {
        let group = Group { group_id: GroupId::new(), name, description, created_by, created_at: now };
        self.mutate(now, {
            let group = group.clone();
            move |tx| {
                if find_group_by_name(tx, &group.name)?.is_some() {
                    return Err(StoreError::Conflict(format!("group {} exists", group.name)));
                }
                let event = Event::GroupCreated { group: group.clone() };
                Ok((group, vec![event]))
            }
        })
    }

    /// Soft-delete a group by id or name.
    pub fn delete_group(&self, identifier: &str, now: u64) -> Result<(), StoreError> {
        let identifier = identifier.to_string();
        self.mutate(now, move |tx| {
            let group = resolve_group_row(tx, &identifier)?
                .ok_or_else(|| StoreError::NotFound(format!("group {}", identifier)))?;
            let event = Event::GroupDeleted { group_id: group.group_id, deleted_at: now };
            Ok(((), vec![event]))
        })
    }

    pub fn get_group(&self, identifier: &str) -> Result<Option<Group>, StoreError> {
        self.read(|conn| resolve_group_row(conn, identifier))
    }

    pub fn list_groups(&self, offset: u64, limit: u64) -> Result<(Vec<Group>, u64), StoreError> {
        self.read(|conn| {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM groups WHERE deleted = 0", [], |row| row.get(0))?;
            let mut stmt = conn.prepare(&format!(
                "SELECT group_id, name, description, created_by, created_at
                 FROM groups WHERE deleted = 0 ORDER BY name LIMIT {} OFFSET {}",
                limit, offset
            ))?;
            let rows = stmt.query_map([], row_to_group)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok((out, total as u64))
        })
    }

    pub fn group_members(&self, identifier: &str) -> Result<Vec<GroupMember>, StoreError> {
        self.read(|conn| {
            let group = resolve_group_row(conn, identifier)?
                .ok_or_else(|| StoreError::NotFound(format!("group {}", identifier)))?;
            members_of(conn, group.group_id.as_str())
        })
    }

    /// Add a member. Group-type members are checked for cycles before the
    /// insert; a would-be cycle is a conflict.
    pub fn add_group_member(
        &self,
        identifier: &str,
        member_type: MemberType,
        member_value: String,
        added_by: AgentId,
        now: u64,
    ) -> Result<GroupMember, StoreError> {
        let identifier = identifier.to_string();
        self.mutate(now, move |tx| {
            let group = resolve_group_row(tx, &identifier)?
                .ok_or_else(|| StoreError::NotFound(format!("group {}", identifier)))?;

            // Group members are stored by canonical name so cycle checks
            // and expansion agree regardless of how the caller named
            // the child.
            let member_value = if member_type == MemberType::Group {
                let child = resolve_group_row(tx, &member_value)?
                    .ok_or_else(|| StoreError::NotFound(format!("group {}", member_value)))?;
                let edges = group_edges(tx)?;
                if would_create_cycle(&edges, &group.name, &child.name) {
                    return Err(StoreError::Conflict(format!(
                        "adding {} to {} would create a membership cycle",
                        child.name, group.name
                    )));
                }
                child.name
            } else {
                member_value
            };

            let member = GroupMember { member_type, member_value, added_at: now, added_by };
            let event =
                Event::GroupMemberAdded { group_id: group.group_id, member: member.clone() };
            Ok((member, vec![event]))
        })
    }

    pub fn remove_group_member(
        &self,
        identifier: &str,
        member_type: MemberType,
        member_value: String,
        now: u64,
    ) -> Result<(), StoreError> {
        let identifier = identifier.to_string();
        self.mutate(now, move |tx| {
            let group = resolve_group_row(tx, &identifier)?
                .ok_or_else(|| StoreError::NotFound(format!("group {}", identifier)))?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM group_members
                     WHERE group_id = ?1 AND member_type = ?2 AND member_value = ?3",
                    params![group.group_id.as_str(), member_type.as_str(), member_value],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_none() {
                return Err(StoreError::NotFound(format!(
                    "{} {} in group {}",
                    member_type.as_str(),
                    member_value,
                    identifier
                )));
            }
            let event = Event::GroupMemberRemoved {
                group_id: group.group_id,
                member_type,
                member_value,
            };
            Ok(((), vec![event]))
        })
    }

    /// Expand a group (by name) to its agent members, recursing through
    /// nested groups and resolving roles against the roster.
    pub fn expand_group(&self, name: &str) -> Result<Vec<AgentId>, StoreError> {
        self.read(|conn| {
            let mut out = Vec::new();
            let mut visited = Vec::new();
            expand_into(conn, name, &mut visited, &mut out)?;
            Ok(out)
        })
    }
}

fn expand_into(
    conn: &Connection,
    name: &str,
    visited: &mut Vec<String>,
    out: &mut Vec<AgentId>,
) -> Result<(), StoreError> {
    if visited.iter().any(|v| v == name) {
        return Ok(());
    }
    visited.push(name.to_string());
    let Some(group) = find_group_by_name(conn, name)? else {
        return Ok(());
    };
    for member in members_of(conn, group.group_id.as_str())? {
        match member.member_type {
            MemberType::Agent => out.push(AgentId::new(member.member_value)),
            MemberType::Role => {
                let mut stmt = conn
                    .prepare("SELECT agent_id FROM agents WHERE deleted = 0 AND role = ?1")?;
                let rows = stmt.query_map([&member.member_value], |row| row.get::<_, String>(0))?;
                for row in rows {
                    out.push(AgentId::new(row?));
                }
            }
            MemberType::Group => expand_into(conn, &member.member_value, visited, out)?,
        }
    }
    Ok(())
}

/// Group→group edges keyed by name, for the cycle check.
fn group_edges(conn: &Connection) -> Result<HashMap<String, Vec<String>>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT g.name, gm.member_value FROM group_members gm
         JOIN groups g ON g.group_id = gm.group_id
         WHERE gm.member_type = 'group' AND g.deleted = 0",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    for row in rows {
        let (parent, child) = row?;
        edges.entry(parent).or_default().push(child);
    }
    Ok(edges)
}

fn members_of(conn: &Connection, group_id: &str) -> Result<Vec<GroupMember>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT member_type, member_value, added_at, added_by FROM group_members
         WHERE group_id = ?1 ORDER BY added_at, member_value",
    )?;
    let rows = stmt.query_map([group_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (raw_type, member_value, added_at, added_by) = row?;
        let member_type = MemberType::parse(&raw_type)
            .ok_or_else(|| StoreError::Corrupt(format!("bad member_type {}", raw_type)))?;
        out.push(GroupMember {
            member_type,
            member_value,
            added_at: added_at as u64,
            added_by: AgentId::new(added_by),
        });
    }
    Ok(out)
}

pub(crate) fn find_group_by_name(conn: &Connection, name: &str) -> Result<Option<Group>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT group_id, name, description, created_by, created_at
         FROM groups WHERE deleted = 0 AND name = ?1",
    )?;
    Ok(stmt.query_row([name], row_to_group).optional()?)
}

/// Look up a non-deleted group by id or name.
fn resolve_group_row(conn: &Connection, identifier: &str) -> Result<Option<Group>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT group_id, name, description, created_by, created_at
         FROM groups WHERE deleted = 0 AND (group_id = ?1 OR name = ?1)",
    )?;
    Ok(stmt.query_row([identifier], row_to_group).optional()?)
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        group_id: GroupId::from_string(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        created_by: AgentId::new(row.get::<_, String>(3)?),
        created_at: row.get::<_, i64>(4)? as u64,
    })
}

pub(crate) fn upsert_group_row(tx: &Transaction<'_>, group: &Group) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO groups (group_id, name, description, created_by, created_at, deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)
         ON CONFLICT(group_id) DO NOTHING",
        params![
            group.group_id.as_str(),
            group.name,
            group.description,
            group.created_by.as_str(),
            group.created_at as i64,
        ],
    )?;
    Ok(())
}

pub(crate) fn mark_deleted_row(
    tx: &Transaction<'_>,
    group_id: &GroupId,
    _deleted_at: u64,
) -> Result<(), StoreError> {
    tx.execute("UPDATE groups SET deleted = 1 WHERE group_id = ?1", [group_id.as_str()])?;
    Ok(())
}

pub(crate) fn upsert_member_row(
    tx: &Transaction<'_>,
    group_id: &GroupId,
    member: &GroupMember,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT OR IGNORE INTO group_members (group_id, member_type, member_value, added_at, added_by)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            group_id.as_str(),
            member.member_type.as_str(),
            member.member_value,
            member.added_at as i64,
            member.added_by.as_str(),
        ],
    )?;
    Ok(())
}

pub(crate) fn remove_member_row(
    tx: &Transaction<'_>,
    group_id: &GroupId,
    member_type: MemberType,
    member_value: &str,
) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM group_members
         WHERE group_id = ?1 AND member_type = ?2 AND member_value = ?3",
        params![group_id.as_str(), member_type.as_str(), member_value],
    )?;
    Ok(())
}

#[cfg(test)]
#[path = "groups_tests.rs"]
mod tests;
