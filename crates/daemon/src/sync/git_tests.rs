// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

async fn init_repo(dir: &Path) {
    run_git(dir, &["init", "--quiet"]).await.unwrap();
    std::fs::write(dir.join("README.md"), "fixture\n").unwrap();
    run_git(dir, &["add", "-A"]).await.unwrap();
    run_git(
        dir,
        &[
            "-c",
            "user.name=test",
            "-c",
            "user.email=test@example.com",
            "commit",
            "-q",
            "-m",
            "init",
        ],
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn discover_finds_common_dir() {
    let tmp = tempfile::tempdir().unwrap();
    init_repo(tmp.path()).await;
    let git = GitSync::discover(tmp.path()).await.unwrap();
    assert!(git.common_dir.ends_with(".git"));
    assert!(git.sync_worktree.ends_with("thrum-sync/a-sync"));
}

#[tokio::test]
async fn discover_fails_outside_a_repo() {
    let tmp = tempfile::tempdir().unwrap();
    assert!(matches!(
        GitSync::discover(tmp.path()).await,
        Err(SyncError::NotARepo(_))
    ));
}

#[tokio::test]
async fn ensure_worktree_creates_orphan_branch() {
    let tmp = tempfile::tempdir().unwrap();
    init_repo(tmp.path()).await;
    let git = GitSync::discover(tmp.path()).await.unwrap();

    git.ensure_worktree().await.unwrap();
    assert!(git.sync_worktree.join(".git").exists());

    // The orphan branch shares no history with the default branch.
    let branch = run_git(&git.sync_worktree, &["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .unwrap();
    assert_eq!(branch, SYNC_BRANCH);

    // Idempotent.
    git.ensure_worktree().await.unwrap();
}

#[tokio::test]
async fn commit_all_detects_changes() {
    let tmp = tempfile::tempdir().unwrap();
    init_repo(tmp.path()).await;
    let git = GitSync::discover(tmp.path()).await.unwrap();
    git.ensure_worktree().await.unwrap();

    // Nothing to commit.
    assert!(!git.commit_all("noop", false).await.unwrap());

    std::fs::write(git.sync_worktree.join("events.jsonl"), "{}\n").unwrap();
    assert!(git.commit_all("one event", false).await.unwrap());

    let author = run_git(&git.sync_worktree, &["log", "-1", "--format=%an <%ae>"])
        .await
        .unwrap();
    assert_eq!(author, format!("{} <{}>", SYNC_AUTHOR_NAME, SYNC_AUTHOR_EMAIL));

    let content = git.show_file(SYNC_BRANCH, "events.jsonl").await.unwrap();
    assert_eq!(content, "{}");
}

#[tokio::test]
async fn remotes_empty_by_default() {
    let tmp = tempfile::tempdir().unwrap();
    init_repo(tmp.path()).await;
    let git = GitSync::discover(tmp.path()).await.unwrap();
    assert!(git.remotes().await.is_empty());
}
