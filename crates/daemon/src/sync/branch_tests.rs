// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::rpc::test_support::test_ctx_at;
use crate::sync::git::{run_git, GitSync, SYNC_BRANCH};
use thrum_storage::PutAgentOptions;

async fn git_fixture() -> (crate::rpc::test_support::TestCtx, GitSync) {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().to_path_buf();
    run_git(&repo, &["init", "--quiet"]).await.unwrap();
    std::fs::write(repo.join("README.md"), "fixture\n").unwrap();
    run_git(&repo, &["add", "-A"]).await.unwrap();
    run_git(
        &repo,
        &["-c", "user.name=t", "-c", "user.email=t@example.com", "commit", "-q", "-m", "init"],
    )
    .await
    .unwrap();

    let t = test_ctx_at(tmp, &repo);
    let git = GitSync::discover(&repo).await.unwrap();
    git.ensure_worktree().await.unwrap();
    (t, git)
}

#[tokio::test]
async fn commit_pending_writes_and_advances_watermark() {
    let (t, git) = git_fixture().await;
    t.ctx
        .store
        .put_agent("implementer", "auth", None, "/repo", 1_000, PutAgentOptions::default())
        .unwrap();

    let committed = commit_pending(&t.ctx, &git).await.unwrap();
    assert_eq!(committed, 1);

    // The committed log is readable from the branch.
    let content = git.show_file(SYNC_BRANCH, "events.jsonl").await.unwrap();
    let records = crate::sync::reconcile::parse_event_lines(&content);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, "agent.registered");

    // Nothing new: no second commit.
    assert_eq!(commit_pending(&t.ctx, &git).await.unwrap(), 0);
}

#[tokio::test]
async fn message_events_are_sharded() {
    let (t, git) = git_fixture().await;
    let agent = match t
        .ctx
        .store
        .put_agent("coordinator", "core", None, "/repo", 1_000, PutAgentOptions::default())
        .unwrap()
    {
        thrum_storage::RegisterOutcome::Registered(agent) => agent,
        other => panic!("unexpected: {:?}", other),
    };
    t.ctx
        .store
        .create_message(
            thrum_storage::MessageDraft {
                thread_id: None,
                author: thrum_core::MessageAuthor {
                    agent_id: agent.agent_id.clone(),
                    session_id: None,
                },
                body: thrum_core::MessageBody::text("hello"),
                scopes: vec![],
                refs: vec![],
            },
            vec![],
            1_100,
        )
        .unwrap();

    commit_pending(&t.ctx, &git).await.unwrap();
    let shard = git.sync_worktree.join("messages").join("shard-000.jsonl");
    assert!(shard.exists());
    let raw = std::fs::read_to_string(&shard).unwrap();
    let records = crate::sync::reconcile::parse_event_lines(&raw);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, "message.created");
}

#[tokio::test]
async fn successive_commits_append() {
    let (t, git) = git_fixture().await;
    t.ctx
        .store
        .put_agent("a", "m", None, "/r", 1, PutAgentOptions::default())
        .unwrap();
    commit_pending(&t.ctx, &git).await.unwrap();

    t.ctx
        .store
        .put_agent("b", "m", None, "/r", 2, PutAgentOptions::default())
        .unwrap();
    commit_pending(&t.ctx, &git).await.unwrap();

    let content = git.show_file(SYNC_BRANCH, "events.jsonl").await.unwrap();
    let records = crate::sync::reconcile::parse_event_lines(&content);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].sequence, 1);
    assert_eq!(records[1].sequence, 2);
}
