// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use thrum_core::{AgentId, MessageAuthor, MessageBody, MessageId, Scope};

fn message(scopes: Vec<Scope>) -> Message {
    Message {
        message_id: MessageId::new(),
        thread_id: None,
        author: MessageAuthor { agent_id: AgentId::new("author_0000000000"), session_id: None },
        body: MessageBody::text("hello"),
        scopes,
        refs: vec![],
        created_at: 1,
        updated_at: None,
        deleted: false,
        version: 1,
    }
}

fn session(n: u32) -> SessionId {
    SessionId::from_string(format!("ses_{}", n))
}

#[tokio::test]
async fn all_filter_receives_everything() {
    let registry = SubscriptionRegistry::new();
    let (conn, mut rx) = registry.register_conn();
    registry.subscribe(conn, &session(1), SubscriptionId::new(), SubFilter::All);

    registry.publish(&message(vec![]), &HashSet::new());
    let frame = rx.recv().await.unwrap();
    assert_eq!(frame.method, "message.created");
    assert!(frame.is_notification());
}

#[tokio::test]
async fn scope_filter_matches_scoped_messages_only() {
    let registry = SubscriptionRegistry::new();
    let (conn, mut rx) = registry.register_conn();
    registry.subscribe(
        conn,
        &session(1),
        SubscriptionId::new(),
        SubFilter::Scope { scope: Scope::new("module", "auth") },
    );

    registry.publish(&message(vec![]), &HashSet::new());
    registry.publish(&message(vec![Scope::new("module", "auth")]), &HashSet::new());

    let frame = rx.recv().await.unwrap();
    assert_eq!(frame.params["message"]["scopes"][0]["value"], "auth");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn mention_role_filter_uses_resolved_roles() {
    let registry = SubscriptionRegistry::new();
    let (conn, mut rx) = registry.register_conn();
    registry.subscribe(
        conn,
        &session(1),
        SubscriptionId::new(),
        SubFilter::MentionRole { role: "reviewer".to_string() },
    );

    let mut roles = HashSet::new();
    roles.insert("reviewer".to_string());
    registry.publish(&message(vec![]), &roles);
    assert!(rx.recv().await.is_some());

    registry.publish(&message(vec![]), &HashSet::new());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn at_most_once_per_subscriber() {
    let registry = SubscriptionRegistry::new();
    let (conn, mut rx) = registry.register_conn();
    // Two overlapping filters on one connection.
    registry.subscribe(conn, &session(1), SubscriptionId::new(), SubFilter::All);
    registry.subscribe(
        conn,
        &session(1),
        SubscriptionId::new(),
        SubFilter::Scope { scope: Scope::new("module", "auth") },
    );

    registry.publish(&message(vec![Scope::new("module", "auth")]), &HashSet::new());
    assert!(rx.recv().await.is_some());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn unsubscribe_stops_delivery_for_that_subscription_only() {
    let registry = SubscriptionRegistry::new();
    let (conn_a, mut rx_a) = registry.register_conn();
    let (conn_b, mut rx_b) = registry.register_conn();
    let sub_a = SubscriptionId::new();
    registry.subscribe(conn_a, &session(1), sub_a.clone(), SubFilter::All);
    registry.subscribe(conn_b, &session(2), SubscriptionId::new(), SubFilter::All);

    // Unsubscribing session 1's filter must not touch session 2.
    assert_eq!(registry.unsubscribe(sub_a.as_str()), Some(session(1)));
    registry.publish(&message(vec![]), &HashSet::new());

    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.recv().await.is_some());
}

#[tokio::test]
async fn slow_consumer_is_dropped_and_reported() {
    let registry = SubscriptionRegistry::new();
    let (conn, _rx) = registry.register_conn();
    registry.subscribe(conn, &session(7), SubscriptionId::new(), SubFilter::All);

    // Fill the buffer without draining, then overflow it.
    let mut dropped = Vec::new();
    for _ in 0..=crate::env::SUBSCRIBER_BUFFER {
        dropped = registry.publish(&message(vec![]), &HashSet::new());
        if !dropped.is_empty() {
            break;
        }
    }
    assert_eq!(dropped, vec![session(7)]);
    assert_eq!(registry.filter_count(), 0);

    // Publishing afterwards reports nothing new.
    assert!(registry.publish(&message(vec![]), &HashSet::new()).is_empty());
}

#[tokio::test]
async fn remove_conn_clears_filters() {
    let registry = SubscriptionRegistry::new();
    let (conn, _rx) = registry.register_conn();
    registry.subscribe(conn, &session(1), SubscriptionId::new(), SubFilter::All);
    assert_eq!(registry.remove_conn(conn), Some(session(1)));
    assert_eq!(registry.filter_count(), 0);
}

#[tokio::test]
async fn delivery_order_matches_publish_order() {
    let registry = SubscriptionRegistry::new();
    let (conn, mut rx) = registry.register_conn();
    registry.subscribe(conn, &session(1), SubscriptionId::new(), SubFilter::All);

    let first = message(vec![]);
    let second = message(vec![]);
    registry.publish(&first, &HashSet::new());
    registry.publish(&second, &HashSet::new());

    let got_first = rx.recv().await.unwrap();
    let got_second = rx.recv().await.unwrap();
    assert_eq!(got_first.params["message"]["message_id"], first.message_id.as_str());
    assert_eq!(got_second.params["message"]["message_id"], second.message_id.as_str());
}
