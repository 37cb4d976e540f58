// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git subprocess plumbing for the sync engine.
//!
//! All git work goes through subprocess calls for maximum compatibility;
//! the daemon never links a git library. Invocations strip inherited
//! GIT_DIR/GIT_WORK_TREE so worktree commands resolve paths themselves.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::env::GIT_TIMEOUT;

/// The orphan branch carrying the event log.
pub const SYNC_BRANCH: &str = "a-sync";

/// Fixed commit identity for sync commits.
pub const SYNC_AUTHOR_NAME: &str = "thrum-sync";
pub const SYNC_AUTHOR_EMAIL: &str = "sync@thrum.local";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("git {args}: {stderr}")]
    Git { args: String, stderr: String },

    #[error("git {0} timed out")]
    Timeout(String),

    #[error("not a git repository: {0}")]
    NotARepo(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] thrum_storage::StoreError),
}

/// Run git with `args` in `cwd`, returning trimmed stdout.
pub async fn run_git(cwd: &Path, args: &[&str]) -> Result<String, SyncError> {
    let mut cmd = Command::new("git");
    cmd.args(args)
        .current_dir(cwd)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .kill_on_drop(true);

    let pretty = args.join(" ");
    debug!(cwd = %cwd.display(), "git {}", pretty);
    let output = tokio::time::timeout(GIT_TIMEOUT, cmd.output())
        .await
        .map_err(|_| SyncError::Timeout(pretty.clone()))??;

    if !output.status.success() {
        return Err(SyncError::Git {
            args: pretty,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run git, returning `None` on failure (optional queries).
pub async fn run_git_optional(cwd: &Path, args: &[&str]) -> Option<String> {
    run_git(cwd, args).await.ok()
}

/// Handle on the repository's sync worktree.
#[derive(Debug, Clone)]
pub struct GitSync {
    /// Repository worktree the daemon serves.
    pub repo_root: PathBuf,
    /// Shared git common directory.
    pub common_dir: PathBuf,
    /// The dedicated `a-sync` worktree.
    pub sync_worktree: PathBuf,
}

impl GitSync {
    /// Discover the git layout for a repository root.
    pub async fn discover(repo_root: &Path) -> Result<Self, SyncError> {
        let raw = run_git(repo_root, &["rev-parse", "--git-common-dir"])
            .await
            .map_err(|_| SyncError::NotARepo(repo_root.to_path_buf()))?;
        let common_dir = if Path::new(&raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            repo_root.join(raw)
        };
        let sync_worktree = common_dir.join("thrum-sync").join(SYNC_BRANCH);
        Ok(Self { repo_root: repo_root.to_path_buf(), common_dir, sync_worktree })
    }

    /// Make sure the orphan-branch worktree exists and is checked out.
    pub async fn ensure_worktree(&self) -> Result<(), SyncError> {
        if self.sync_worktree.join(".git").exists() {
            return Ok(());
        }
        if let Some(parent) = self.sync_worktree.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // A stale registration from a removed directory blocks the add.
        let _ = run_git(&self.repo_root, &["worktree", "prune"]).await;

        let path = self.sync_worktree.display().to_string();
        let branch_exists = run_git(
            &self.repo_root,
            &["rev-parse", "--verify", "--quiet", &format!("refs/heads/{}", SYNC_BRANCH)],
        )
        .await
        .is_ok();

        if branch_exists {
            run_git(&self.repo_root, &["worktree", "add", &path, SYNC_BRANCH]).await?;
            return Ok(());
        }

        // Newer git grows the orphan flag; fall back to detach + checkout.
        if run_git(&self.repo_root, &["worktree", "add", "--orphan", "-b", SYNC_BRANCH, &path])
            .await
            .is_err()
        {
            run_git(&self.repo_root, &["worktree", "add", "--detach", &path, "HEAD"]).await?;
            run_git(&self.sync_worktree, &["checkout", "--orphan", SYNC_BRANCH]).await?;
            run_git(&self.sync_worktree, &["rm", "-rf", "--ignore-unmatch", "."]).await?;
        }
        self.commit_all("thrum sync init", true).await?;
        info!(worktree = %self.sync_worktree.display(), "created sync worktree");
        Ok(())
    }

    /// Stage everything and commit with the fixed sync identity. Returns
    /// false when there is nothing to commit (unless `allow_empty`).
    pub async fn commit_all(&self, message: &str, allow_empty: bool) -> Result<bool, SyncError> {
        run_git(&self.sync_worktree, &["add", "-A"]).await?;
        let dirty =
            !run_git(&self.sync_worktree, &["status", "--porcelain"]).await?.is_empty();
        if !dirty && !allow_empty {
            return Ok(false);
        }
        let mut args = vec![
            "-c",
            "user.name=thrum-sync",
            "-c",
            "user.email=sync@thrum.local",
            "commit",
            "-m",
            message,
        ];
        if allow_empty {
            args.push("--allow-empty");
        }
        run_git(&self.sync_worktree, &args).await?;
        Ok(true)
    }

    /// Configured remotes of the repository.
    pub async fn remotes(&self) -> Vec<String> {
        match run_git_optional(&self.repo_root, &["remote"]).await {
            Some(raw) if !raw.is_empty() => raw.lines().map(|l| l.trim().to_string()).collect(),
            _ => Vec::new(),
        }
    }

    /// Fetch a peer's sync branch tip into a private ref. Returns the
    /// ref name on success.
    pub async fn fetch_peer_branch(&self, remote: &str) -> Result<String, SyncError> {
        let target = format!("refs/thrum/peers/{}", remote);
        let spec = format!("+refs/heads/{}:{}", SYNC_BRANCH, target);
        run_git(&self.repo_root, &["fetch", "--quiet", remote, &spec]).await?;
        Ok(target)
    }

    /// Read a file from a committed tree (`<ref>:<path>`).
    pub async fn show_file(&self, reference: &str, path: &str) -> Option<String> {
        run_git_optional(&self.repo_root, &["show", &format!("{}:{}", reference, path)]).await
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
