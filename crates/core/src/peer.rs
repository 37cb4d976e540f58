// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer record: another daemon paired for event exchange.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A paired peer daemon. `auth_token` never leaves this daemon's store;
/// replicated views carry [`PeerInfo`] instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    pub daemon_id: String,
    pub name: String,
    pub address: String,
    pub paired_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<u64>,
    /// Highest applied sequence per origin daemon, for resume.
    #[serde(default)]
    pub last_synced_seq: HashMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Set after a token rejection; cleared by re-pairing.
    #[serde(default)]
    pub sync_disabled: bool,
}

impl Peer {
    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            daemon_id: self.daemon_id.clone(),
            name: self.name.clone(),
            address: self.address.clone(),
            paired_at: self.paired_at,
        }
    }
}

/// Token-free view of a peer, safe to put in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub daemon_id: String,
    pub name: String,
    pub address: String,
    pub paired_at: u64,
}
