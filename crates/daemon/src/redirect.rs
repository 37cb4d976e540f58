// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree redirect resolution.
//!
//! A worktree's `.thrum/redirect` file points at the authoritative
//! `.thrum/` directory of another worktree so all worktrees of a
//! repository share one daemon. Chains are followed with a fixed depth
//! limit and a cycle set.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Maximum redirect hops before giving up.
pub const MAX_REDIRECT_DEPTH: usize = 8;

#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("redirect loop through {0}")]
    Loop(PathBuf),

    #[error("redirect chain exceeds {MAX_REDIRECT_DEPTH} hops at {0}")]
    TooDeep(PathBuf),

    #[error("redirect target missing: {0}")]
    BrokenTarget(PathBuf),

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Walk up from `start` until a directory containing `.thrum/` is found.
pub fn find_worktree(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(".thrum").is_dir() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// Resolve a `.thrum/` directory through its redirect chain.
///
/// Returns the authoritative `.thrum/` directory. A directory without a
/// `redirect` file resolves to itself.
pub fn resolve_redirect(thrum_dir: &Path) -> Result<PathBuf, RedirectError> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut current = thrum_dir.to_path_buf();

    for _ in 0..=MAX_REDIRECT_DEPTH {
        let canonical = current.canonicalize().unwrap_or_else(|_| current.clone());
        if !seen.insert(canonical.clone()) {
            return Err(RedirectError::Loop(canonical));
        }

        let redirect = current.join("redirect");
        if !redirect.is_file() {
            return Ok(current);
        }
        let raw = std::fs::read_to_string(&redirect)
            .map_err(|source| RedirectError::Io { path: redirect.clone(), source })?;
        let target = PathBuf::from(raw.trim());
        if !target.is_dir() {
            return Err(RedirectError::BrokenTarget(target));
        }
        current = target;
    }
    Err(RedirectError::TooDeep(current))
}

/// Find the authoritative `.thrum/` directory for a caller path: walk up
/// to the containing worktree, then follow redirects.
pub fn resolve_for_path(start: &Path) -> Option<Result<PathBuf, RedirectError>> {
    find_worktree(start).map(|worktree| resolve_redirect(&worktree.join(".thrum")))
}

#[cfg(test)]
#[path = "redirect_tests.rs"]
mod tests;
