// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scopes and mentions: the routing vocabulary attached to messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `{type, value}` topic pair, e.g. `module:auth`.
///
/// Unknown scope types are accepted and stored; they simply match no
/// current subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    #[serde(rename = "type")]
    pub scope_type: String,
    pub value: String,
}

impl Scope {
    pub fn new(scope_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self { scope_type: scope_type.into(), value: value.into() }
    }

    /// Parse `type:value`. A bare token becomes a `topic` scope.
    pub fn parse(s: &str) -> Self {
        match s.split_once(':') {
            Some((t, v)) if !t.is_empty() => Self::new(t, v),
            _ => Self::new("topic", s),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope_type, self.value)
    }
}

/// An explicit addressee token attached to a message.
///
/// The `@` prefix is optional on input and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mention(pub String);

impl Mention {
    pub fn parse(raw: &str) -> Self {
        Self(raw.strip_prefix('@').unwrap_or(raw).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Mention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
