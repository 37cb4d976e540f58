// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level scenarios: a real daemon on a real socket, driven by
//! the client crate.

use std::path::{Path, PathBuf};

use serde_json::json;
use thrum_client::Client;
use thrum_daemon::lifecycle::{self, StartupResult};

struct TestDaemon {
    result: StartupResult,
    client: Client,
    repo: PathBuf,
    _tmp: tempfile::TempDir,
}

async fn git(repo: &Path, args: &[&str]) {
    let status = tokio::process::Command::new("git")
        .args(args)
        .current_dir(repo)
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .status()
        .await
        .expect("git not available");
    assert!(status.success(), "git {:?} failed", args);
}

async fn spawn_daemon() -> TestDaemon {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().to_path_buf();
    git(&repo, &["init", "--quiet"]).await;
    std::fs::write(repo.join("README.md"), "fixture\n").unwrap();
    git(&repo, &["add", "-A"]).await;
    git(
        &repo,
        &["-c", "user.name=t", "-c", "user.email=t@example.com", "commit", "-q", "-m", "init"],
    )
    .await;

    let result = lifecycle::startup(&repo).await.unwrap();
    let client = Client::new(result.state.ctx.paths.socket_path());
    TestDaemon { result, client, repo, _tmp: tmp }
}

impl TestDaemon {
    async fn stop(self) {
        self.result.state.shutdown().await;
    }
}

#[tokio::test]
async fn register_then_whoami() {
    let daemon = spawn_daemon().await;

    let registered = daemon
        .client
        .call("agent.register", json!({ "role": "implementer", "module": "auth" }))
        .await
        .unwrap();
    assert_eq!(registered["status"], "registered");
    let agent_id = registered["agent_id"].as_str().unwrap().to_string();
    assert!(agent_id.starts_with("implementer_"));
    assert_eq!(agent_id.len(), "implementer_".len() + 10);

    let whoami = daemon
        .client
        .call("agent.whoami", json!({ "caller_agent_id": agent_id }))
        .await
        .unwrap();
    assert_eq!(whoami["agent_id"], agent_id);
    assert_eq!(whoami["source"], "daemon");

    daemon.stop().await;
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let daemon = spawn_daemon().await;

    let first = daemon
        .client
        .call("agent.register", json!({ "role": "implementer", "module": "auth" }))
        .await
        .unwrap();
    let second = daemon
        .client
        .call("agent.register", json!({ "role": "implementer", "module": "auth" }))
        .await
        .unwrap();
    assert_eq!(second["status"], "conflict");
    assert_eq!(second["conflict"]["existing_agent_id"], first["agent_id"]);

    daemon.stop().await;
}

#[tokio::test]
async fn send_and_list_with_session() {
    let daemon = spawn_daemon().await;

    let author = daemon
        .client
        .call("agent.register", json!({ "role": "coordinator", "module": "core" }))
        .await
        .unwrap();
    let author_id = author["agent_id"].as_str().unwrap().to_string();
    daemon
        .client
        .call("agent.register", json!({ "role": "reviewer", "module": "auth" }))
        .await
        .unwrap();
    daemon
        .client
        .call("session.start", json!({ "caller_agent_id": author_id }))
        .await
        .unwrap();

    let sent = daemon
        .client
        .call(
            "message.send",
            json!({ "content": "hi", "mentions": ["@reviewer"], "caller_agent_id": author_id }),
        )
        .await
        .unwrap();
    assert!(sent["message_id"].as_str().unwrap().starts_with("msg_"));

    let listed = daemon
        .client
        .call("message.list", json!({ "for_agent_role": "reviewer" }))
        .await
        .unwrap();
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["items"][0]["message_id"], sent["message_id"]);
    assert_eq!(listed["items"][0]["is_read"], false);

    daemon.stop().await;
}

#[tokio::test]
async fn reply_copies_audience() {
    let daemon = spawn_daemon().await;

    let coordinator = daemon
        .client
        .call("agent.register", json!({ "role": "coordinator", "module": "core" }))
        .await
        .unwrap();
    let coordinator_id = coordinator["agent_id"].as_str().unwrap().to_string();
    let implementer = daemon
        .client
        .call("agent.register", json!({ "role": "implementer", "module": "auth" }))
        .await
        .unwrap();
    let implementer_id = implementer["agent_id"].as_str().unwrap().to_string();

    let parent = daemon
        .client
        .call(
            "message.send",
            json!({
                "content": "please fix",
                "mentions": ["@implementer"],
                "caller_agent_id": coordinator_id,
            }),
        )
        .await
        .unwrap();

    let reply = daemon
        .client
        .call(
            "message.send",
            json!({
                "content": "ok",
                "refs": [{ "type": "reply_to", "value": parent["message_id"] }],
                "caller_agent_id": implementer_id,
            }),
        )
        .await
        .unwrap();

    let detail = daemon
        .client
        .call("message.get", json!({ "message_id": reply["message_id"] }))
        .await
        .unwrap();
    let recipients: Vec<&str> = detail["read_state"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["agent_id"].as_str().unwrap())
        .collect();
    assert!(recipients.contains(&coordinator_id.as_str()));

    daemon.stop().await;
}

#[tokio::test]
async fn mark_read_idempotence() {
    let daemon = spawn_daemon().await;

    let author = daemon
        .client
        .call("agent.register", json!({ "role": "coordinator", "module": "core" }))
        .await
        .unwrap();
    let author_id = author["agent_id"].as_str().unwrap().to_string();
    let reviewer = daemon
        .client
        .call("agent.register", json!({ "role": "reviewer", "module": "auth" }))
        .await
        .unwrap();
    let reviewer_id = reviewer["agent_id"].as_str().unwrap().to_string();

    let sent = daemon
        .client
        .call(
            "message.send",
            json!({ "content": "hi", "mentions": ["@reviewer"], "caller_agent_id": author_id }),
        )
        .await
        .unwrap();

    let first = daemon
        .client
        .call(
            "message.markRead",
            json!({ "message_ids": [sent["message_id"]], "caller_agent_id": reviewer_id }),
        )
        .await
        .unwrap();
    assert_eq!(first["marked_count"], 1);

    let second = daemon
        .client
        .call(
            "message.markRead",
            json!({ "message_ids": [sent["message_id"]], "caller_agent_id": reviewer_id }),
        )
        .await
        .unwrap();
    assert_eq!(second["marked_count"], 0);

    daemon.stop().await;
}

#[tokio::test]
async fn sync_force_commits_to_branch() {
    let daemon = spawn_daemon().await;

    daemon
        .client
        .call("agent.register", json!({ "role": "implementer", "module": "auth" }))
        .await
        .unwrap();
    // The periodic writer may or may not have beaten us to the commit;
    // either way the force leaves nothing pending.
    let forced = daemon.client.call("sync.force", json!({})).await.unwrap();
    assert!(forced["committed"].is_u64());

    let status = daemon.client.call("sync.status", json!({})).await.unwrap();
    assert_eq!(status["sync_state"], "synced");
    assert_eq!(status["pending_events"], 0);

    // The orphan branch now exists in the repository.
    let output = tokio::process::Command::new("git")
        .args(["rev-parse", "--verify", "refs/heads/a-sync"])
        .current_dir(&daemon.repo)
        .output()
        .await
        .unwrap();
    assert!(output.status.success());

    daemon.stop().await;
}

#[tokio::test]
async fn pair_and_sync_round_trip() {
    let a = spawn_daemon().await;
    let b = spawn_daemon().await;

    // Pair: A opens the window, B joins with the code.
    let pairing = a.client.call("peer.start_pairing", json!({})).await.unwrap();
    let joined = b
        .client
        .call(
            "peer.join",
            json!({
                "code": pairing["code"],
                "address": pairing["address"],
                "name": "daemon-b",
            }),
        )
        .await
        .unwrap();
    assert_eq!(joined["peer"]["daemon_id"], a.result.state.ctx.store.daemon_id());

    let a_peers = a.client.call("peer.list", json!({})).await.unwrap();
    assert_eq!(a_peers["total"], 1);

    // A message authored on A...
    let author = a
        .client
        .call("agent.register", json!({ "role": "coordinator", "module": "core" }))
        .await
        .unwrap();
    let author_id = author["agent_id"].as_str().unwrap().to_string();
    let sent = a
        .client
        .call(
            "message.send",
            json!({ "content": "cross-daemon hello", "broadcast": true, "caller_agent_id": author_id }),
        )
        .await
        .unwrap();

    // ...arrives on B after one exchange cycle.
    let peer = b.result.state.ctx.store.list_peers(0, 10).unwrap().0.remove(0);
    thrum_daemon::sync::transport::sync_with_peer(&b.result.state.ctx, &peer)
        .await
        .unwrap();

    let listed = b
        .client
        .call("message.list", json!({ "author": author_id }))
        .await
        .unwrap();
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["items"][0]["message_id"], sent["message_id"]);
    assert_eq!(listed["items"][0]["created_at"], sent["message"]["created_at"]);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn missing_daemon_is_unavailable() {
    let tmp = tempfile::tempdir().unwrap();
    let client = Client::new(tmp.path().join("no.sock"));
    let err = client.call("health", json!({})).await.unwrap_err();
    assert_eq!(err.kind(), thrum_wire::ErrorKind::DaemonUnavailable);
}
