// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotent sync-layout migration, run once at daemon start.
//!
//! Moves the legacy `.thrum/sync/` worktree to its home under the git
//! common directory, drops stale `.gitattributes` merge rules that named
//! the old path, and keeps `.gitignore` covering `.thrum/`.

use tracing::info;

use crate::paths::ThrumDir;

use super::git::{GitSync, SyncError};

pub async fn run(git: &GitSync, paths: &ThrumDir) -> Result<(), SyncError> {
    move_legacy_worktree(git, paths).await?;
    strip_stale_gitattributes(paths)?;
    paths.ensure_gitignore()?;
    Ok(())
}

/// Pre-migration daemons kept the sync worktree at `.thrum/sync/`.
async fn move_legacy_worktree(git: &GitSync, paths: &ThrumDir) -> Result<(), SyncError> {
    let legacy = paths.root.join("sync");
    if !legacy.is_dir() || git.sync_worktree.exists() {
        return Ok(());
    }
    if let Some(parent) = git.sync_worktree.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(&legacy, &git.sync_worktree).await?;
    // The moved worktree's gitdir pointer is stale; repair registration.
    let _ = super::git::run_git(&git.repo_root, &["worktree", "repair"]).await;
    info!(from = %legacy.display(), to = %git.sync_worktree.display(), "migrated legacy sync worktree");
    Ok(())
}

/// Remove merge-rule lines that referenced the pre-migration path.
fn strip_stale_gitattributes(paths: &ThrumDir) -> std::io::Result<()> {
    let path = paths.worktree.join(".gitattributes");
    let Ok(current) = std::fs::read_to_string(&path) else {
        return Ok(());
    };
    let kept: Vec<&str> =
        current.lines().filter(|line| !line.contains(".thrum/sync")).collect();
    if kept.len() != current.lines().count() {
        let mut out = kept.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        std::fs::write(&path, out)?;
        info!("dropped stale .gitattributes sync rules");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_removes_only_stale_lines() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".thrum")).unwrap();
        std::fs::write(
            tmp.path().join(".gitattributes"),
            "*.png binary\n.thrum/sync/events.jsonl merge=union\n",
        )
        .unwrap();
        let paths = ThrumDir::resolve(tmp.path()).unwrap();

        strip_stale_gitattributes(&paths).unwrap();
        let content = std::fs::read_to_string(tmp.path().join(".gitattributes")).unwrap();
        assert_eq!(content, "*.png binary\n");

        // Second run is a no-op.
        strip_stale_gitattributes(&paths).unwrap();
        assert_eq!(
            std::fs::read_to_string(tmp.path().join(".gitattributes")).unwrap(),
            "*.png binary\n"
        );
    }

    #[test]
    fn strip_without_file_is_fine() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".thrum")).unwrap();
        let paths = ThrumDir::resolve(tmp.path()).unwrap();
        strip_stale_gitattributes(&paths).unwrap();
    }
}
