// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative `.thrum/` data directory layout.
//!
//! ```text
//! .thrum/
//!   config.json
//!   schema_version           # text "1\n"
//!   var/
//!     thrum.sock
//!     thrum.pid              # JSON {pid, repo_path, socket_path, started_at}
//!     ws.port
//!     thrum.db, events.jsonl
//!   identities/<name>.json
//!   redirect                 # optional
//! ```

use std::path::{Path, PathBuf};

use crate::redirect::{self, RedirectError};

/// Schema version written to `.thrum/schema_version`.
pub const SCHEMA_VERSION_TEXT: &str = "1\n";

/// Resolved paths under one authoritative `.thrum/` directory.
#[derive(Debug, Clone)]
pub struct ThrumDir {
    /// Worktree root containing the original `.thrum/`.
    pub worktree: PathBuf,
    /// The authoritative `.thrum/` directory (after redirects).
    pub root: PathBuf,
}

impl ThrumDir {
    /// Resolve the data directory for a repository worktree, following
    /// any redirect chain.
    pub fn resolve(worktree: &Path) -> Result<Self, RedirectError> {
        let local = worktree.join(".thrum");
        std::fs::create_dir_all(&local)
            .map_err(|source| RedirectError::Io { path: local.clone(), source })?;
        let root = redirect::resolve_redirect(&local)?;
        Ok(Self { worktree: worktree.to_path_buf(), root })
    }

    pub fn var_dir(&self) -> PathBuf {
        self.root.join("var")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.var_dir().join("thrum.sock")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.var_dir().join("thrum.pid")
    }

    pub fn ws_port_path(&self) -> PathBuf {
        self.var_dir().join("ws.port")
    }

    pub fn log_path(&self) -> PathBuf {
        self.var_dir().join("thrumd.log")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn identities_dir(&self) -> PathBuf {
        self.root.join("identities")
    }

    /// Create `var/`, `identities/`, and the `schema_version` marker.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.var_dir())?;
        std::fs::create_dir_all(self.identities_dir())?;
        let marker = self.root.join("schema_version");
        if !marker.exists() {
            std::fs::write(&marker, SCHEMA_VERSION_TEXT)?;
        }
        Ok(())
    }

    /// Make sure the repository ignores the whole `.thrum/` tree.
    pub fn ensure_gitignore(&self) -> std::io::Result<()> {
        let path = self.worktree.join(".gitignore");
        let current = std::fs::read_to_string(&path).unwrap_or_default();
        let mut lines: Vec<&str> = current.lines().collect();
        let mut changed = false;
        for required in [".thrum/", ".thrum.*.json"] {
            if !lines.iter().any(|l| l.trim() == required) {
                lines.push(required);
                changed = true;
            }
        }
        if changed {
            std::fs::write(&path, lines.join("\n") + "\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ThrumDir::resolve(tmp.path()).unwrap();
        assert_eq!(dir.root, tmp.path().join(".thrum"));
        assert!(dir.socket_path().ends_with("var/thrum.sock"));
        assert!(dir.pid_path().ends_with("var/thrum.pid"));
        assert!(dir.ws_port_path().ends_with("var/ws.port"));

        dir.ensure_layout().unwrap();
        assert!(dir.var_dir().is_dir());
        assert!(dir.identities_dir().is_dir());
        assert_eq!(
            std::fs::read_to_string(dir.root.join("schema_version")).unwrap(),
            SCHEMA_VERSION_TEXT
        );
    }

    #[test]
    fn resolve_follows_redirect() {
        let tmp = tempfile::tempdir().unwrap();
        let main = tmp.path().join("main");
        let other = tmp.path().join("other");
        std::fs::create_dir_all(main.join(".thrum")).unwrap();
        std::fs::create_dir_all(other.join(".thrum")).unwrap();
        std::fs::write(
            other.join(".thrum").join("redirect"),
            main.join(".thrum").display().to_string(),
        )
        .unwrap();

        let dir = ThrumDir::resolve(&other).unwrap();
        assert_eq!(dir.root, main.join(".thrum"));
        assert_eq!(dir.worktree, other);
    }

    #[test]
    fn gitignore_gains_thrum_entries_once() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".gitignore"), "target/\n").unwrap();
        let dir = ThrumDir::resolve(tmp.path()).unwrap();
        dir.ensure_gitignore().unwrap();
        dir.ensure_gitignore().unwrap();

        let content = std::fs::read_to_string(tmp.path().join(".gitignore")).unwrap();
        assert_eq!(content.matches(".thrum/").count(), 1);
        assert!(content.contains(".thrum.*.json"));
        assert!(content.contains("target/"));
    }
}
