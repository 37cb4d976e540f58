// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent_name;

#[test]
fn legacy_triple_role() {
    let id = AgentId::new("agent:reviewer:a1b2c3");
    assert!(id.is_legacy());
    assert_eq!(id.role(), Some("reviewer"));
}

#[test]
fn generated_token_role() {
    let id = AgentId::new(agent_name("implementer", "auth", "/repo"));
    assert!(!id.is_legacy());
    assert_eq!(id.role(), Some("implementer"));
}

#[test]
fn role_with_underscore_preserved() {
    let id = AgentId::new(agent_name("db_admin", "storage", "/repo"));
    assert_eq!(id.role(), Some("db_admin"));
}

#[test]
fn arbitrary_token_has_no_role() {
    let id = AgentId::new("carol");
    assert_eq!(id.role(), None);
}

#[test]
fn serde_is_transparent() {
    let id = AgentId::new("agent:impl:xyz");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"agent:impl:xyz\"");
    let back: AgentId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
