// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caller identity resolution.
//!
//! An incoming call is attributed to an agent by, in order: the explicit
//! `caller_agent_id` parameter, the sole identity file in the caller's
//! worktree, the environment hint recorded at daemon start. Anything else
//! is `ambiguous_identity`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thrum_core::{Agent, AgentId};
use thrum_storage::Store;
use tracing::debug;

use crate::paths::ThrumDir;
use crate::redirect;

/// One `.thrum/identities/<name>.json` file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityFile {
    pub agent_id: AgentId,
    pub role: String,
    pub module: String,
    pub registered_at: u64,
}

impl IdentityFile {
    pub fn for_agent(agent: &Agent) -> Self {
        Self {
            agent_id: agent.agent_id.clone(),
            role: agent.role.clone(),
            module: agent.module.clone(),
            registered_at: agent.registered_at,
        }
    }
}

/// Why resolution failed.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("could not resolve caller to a single agent: {0}")]
    Ambiguous(String),
}

/// How the identity was determined, reported by `agent.whoami`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    /// Explicit `caller_agent_id` matched a registered agent.
    Daemon,
    /// Sole identity file in the caller's worktree.
    IdentityFile,
    /// `THRUM_AGENT` captured at daemon start.
    Environment,
}

pub struct IdentityResolver {
    store: Arc<Store>,
    home: ThrumDir,
    env_hint: Option<AgentId>,
}

impl IdentityResolver {
    pub fn new(store: Arc<Store>, home: ThrumDir, env_hint: Option<AgentId>) -> Self {
        Self { store, home, env_hint }
    }

    /// Capture the environment hint for the daemon's own worktree.
    pub fn from_env(store: Arc<Store>, home: ThrumDir) -> Self {
        let env_hint = std::env::var(crate::env::ENV_AGENT_HINT).ok().map(AgentId::new);
        Self::new(store, home, env_hint)
    }

    /// Resolve the calling agent.
    pub fn resolve(
        &self,
        caller_agent_id: Option<&str>,
        caller_cwd: Option<&Path>,
    ) -> Result<(AgentId, IdentitySource), IdentityError> {
        if let Some(explicit) = caller_agent_id {
            if let Ok(Some(agent)) = self.store.get_agent(explicit) {
                if !agent.deleted {
                    return Ok((agent.agent_id, IdentitySource::Daemon));
                }
            }
            debug!(caller_agent_id = explicit, "explicit caller id unknown, trying worktree");
        }

        let identities_dir = self.identities_dir_for(caller_cwd);
        let mut identities = list_identities(&identities_dir);
        match identities.len() {
            1 => {
                let identity = identities.remove(0);
                return Ok((identity.agent_id, IdentitySource::IdentityFile));
            }
            n if n > 1 => {
                return Err(IdentityError::Ambiguous(format!(
                    "{} identity files in {}",
                    n,
                    identities_dir.display()
                )));
            }
            _ => {}
        }

        if let Some(hint) = &self.env_hint {
            return Ok((hint.clone(), IdentitySource::Environment));
        }

        Err(IdentityError::Ambiguous(
            "no caller_agent_id, no identity file, no environment hint".to_string(),
        ))
    }

    /// The identities directory for a caller path: the caller's own
    /// worktree when it has a `.thrum/`, otherwise the daemon's.
    pub fn identities_dir_for(&self, caller_cwd: Option<&Path>) -> PathBuf {
        caller_cwd
            .and_then(redirect::find_worktree)
            .map(|worktree| worktree.join(".thrum").join("identities"))
            .unwrap_or_else(|| self.home.identities_dir())
    }
}

/// Write an identity file atomically (temp + rename), mode 0600.
pub fn write_identity(dir: &Path, identity: &IdentityFile) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", identity.agent_id));
    let tmp = dir.join(format!(".{}.json.tmp", identity.agent_id));
    let raw = serde_json::to_string_pretty(identity)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(&tmp, raw + "\n")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::rename(&tmp, &path)?;
    Ok(path)
}

/// Remove the identity file for an agent, if present.
pub fn remove_identity(dir: &Path, agent_id: &AgentId) -> std::io::Result<()> {
    let path = dir.join(format!("{}.json", agent_id));
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Parseable identity files under `dir`, sorted by file name.
pub fn list_identities(dir: &Path) -> Vec<IdentityFile> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .filter(|p| {
            !p.file_name().is_some_and(|n| n.to_string_lossy().starts_with('.'))
        })
        .collect();
    files.sort();
    files
        .into_iter()
        .filter_map(|path| {
            let raw = std::fs::read_to_string(&path).ok()?;
            serde_json::from_str(&raw).ok()
        })
        .collect()
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
