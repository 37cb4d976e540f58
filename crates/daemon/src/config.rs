// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration, loaded from `.thrum/config.json`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

fn default_sync_interval_ms() -> u64 {
    5_000
}

fn default_peer_interval_ms() -> u64 {
    15_000
}

/// `.thrum/config.json`. Local-only by default: remote sync stays off
/// until a peer is paired or the flag is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Exchange events with remote peers.
    #[serde(default)]
    pub remote_sync: bool,
    /// Tick for the local branch writer.
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    /// Tick for peer fetch/exchange loops.
    #[serde(default = "default_peer_interval_ms")]
    pub peer_sync_interval_ms: u64,
    /// Display name presented to peers during pairing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemon_name: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            remote_sync: false,
            sync_interval_ms: default_sync_interval_ms(),
            peer_sync_interval_ms: default_peer_interval_ms(),
            daemon_name: None,
        }
    }
}

impl DaemonConfig {
    /// Load from `config.json`, creating the default file when missing.
    /// A malformed file logs a warning and falls back to defaults.
    pub fn load_or_create(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "malformed config.json, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                let config = Self::default();
                if let Ok(raw) = serde_json::to_string_pretty(&config) {
                    let _ = std::fs::write(path, raw + "\n");
                }
                config
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_local_only() {
        let config = DaemonConfig::default();
        assert!(!config.remote_sync);
        assert_eq!(config.sync_interval_ms, 5_000);
    }

    #[test]
    fn load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = DaemonConfig::load_or_create(&path);
        assert!(!config.remote_sync);
        assert!(path.exists());

        // Second load reads the file back.
        let again = DaemonConfig::load_or_create(&path);
        assert_eq!(again.sync_interval_ms, config.sync_interval_ms);
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{nope").unwrap();
        let config = DaemonConfig::load_or_create(&path);
        assert!(!config.remote_sync);
    }
}
