// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription rows. Local-only: tied to live WebSocket sessions on this
//! daemon, so they are never replicated.

use rusqlite::params;
use thrum_core::{AgentId, Scope, SessionId, SubFilter, SubscriptionId};

use crate::error::StoreError;
use crate::store::{from_json_col, to_json_col, Store};

/// A persisted subscription row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSubscription {
    pub subscription_id: SubscriptionId,
    pub session_id: SessionId,
    pub filter: SubFilter,
    pub created_at: u64,
}

impl Store {
    pub fn add_subscription(
        &self,
        session_id: &SessionId,
        filter: &SubFilter,
        now: u64,
    ) -> Result<StoredSubscription, StoreError> {
        let sub = StoredSubscription {
            subscription_id: SubscriptionId::new(),
            session_id: session_id.clone(),
            filter: filter.clone(),
            created_at: now,
        };
        let guard = self.inner.lock();
        guard.conn.execute(
            "INSERT INTO subscriptions (subscription_id, session_id, filter, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                sub.subscription_id.as_str(),
                sub.session_id.as_str(),
                to_json_col(&sub.filter)?,
                now as i64,
            ],
        )?;
        Ok(sub)
    }

    pub fn remove_subscription(&self, subscription_id: &str) -> Result<(), StoreError> {
        let guard = self.inner.lock();
        let removed = guard
            .conn
            .execute("DELETE FROM subscriptions WHERE subscription_id = ?1", [subscription_id])?;
        if removed == 0 {
            return Err(StoreError::NotFound(format!("subscription {}", subscription_id)));
        }
        Ok(())
    }

    /// Drop every subscription owned by a session (unsubscribe-all,
    /// session end, socket close).
    pub fn remove_session_subscriptions(&self, session_id: &str) -> Result<u64, StoreError> {
        let guard = self.inner.lock();
        let removed = guard
            .conn
            .execute("DELETE FROM subscriptions WHERE session_id = ?1", [session_id])?;
        Ok(removed as u64)
    }

    /// Agents whose stored subscriptions carry a scope filter matching
    /// `scope` (audience resolution, step 3).
    pub fn agents_subscribed_to_scope(&self, scope: &Scope) -> Result<Vec<AgentId>, StoreError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sub.filter, ses.agent_id FROM subscriptions sub
                 JOIN sessions ses ON ses.session_id = sub.session_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (raw_filter, agent_id) = row?;
                let filter: SubFilter = from_json_col(raw_filter)?;
                if matches!(&filter, SubFilter::Scope { scope: s } if s == scope) {
                    out.push(AgentId::new(agent_id));
                }
            }
            out.dedup();
            Ok(out)
        })
    }

    pub fn list_subscriptions(
        &self,
        session_id: Option<&str>,
        offset: u64,
        limit: u64,
    ) -> Result<(Vec<StoredSubscription>, u64), StoreError> {
        self.read(|conn| {
            let (where_sql, param) = match session_id {
                Some(id) => ("WHERE session_id = ?1", Some(id.to_string())),
                None => ("", None),
            };
            let count_sql = format!("SELECT COUNT(*) FROM subscriptions {}", where_sql);
            let total: i64 = match &param {
                Some(id) => conn.query_row(&count_sql, [id], |row| row.get(0))?,
                None => conn.query_row(&count_sql, [], |row| row.get(0))?,
            };
            let list_sql = format!(
                "SELECT subscription_id, session_id, filter, created_at
                 FROM subscriptions {} ORDER BY created_at, subscription_id LIMIT {} OFFSET {}",
                where_sql, limit, offset
            );
            let mut stmt = conn.prepare(&list_sql)?;
            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<(String, String, String, i64)> {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            };
            let mut raw = Vec::new();
            match &param {
                Some(id) => {
                    for row in stmt.query_map([id], map_row)? {
                        raw.push(row?);
                    }
                }
                None => {
                    for row in stmt.query_map([], map_row)? {
                        raw.push(row?);
                    }
                }
            }
            let mut out = Vec::new();
            for (sub_id, ses_id, filter, created_at) in raw {
                out.push(StoredSubscription {
                    subscription_id: SubscriptionId::from_string(sub_id),
                    session_id: SessionId::from_string(ses_id),
                    filter: from_json_col(filter)?,
                    created_at: created_at as u64,
                });
            }
            Ok((out, total as u64))
        })
    }
}
