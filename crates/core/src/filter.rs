// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription filters for live message fan-out.

use serde::{Deserialize, Serialize};

use crate::scope::Scope;

/// What a subscriber wants delivered. A subscription holds zero or more
/// of these; a subscriber still receives at most one notification per
/// message however many filters match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubFilter {
    /// Every committed message.
    All,
    /// Messages carrying this scope.
    Scope { scope: Scope },
    /// Messages mentioning this role (directly or via an agent with it).
    MentionRole { role: String },
}
