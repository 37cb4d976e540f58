// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ID generation for prefixed entity identifiers.

use sha2::{Digest, Sha256};

/// Crockford base32 alphabet (no I, L, O, U).
const CROCKFORD: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Length of the random suffix appended to each ID prefix.
pub const SUFFIX_LEN: usize = 19;

/// Length of the hash suffix in generated agent names.
pub const AGENT_HASH_LEN: usize = 10;

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    if s.len() <= n {
        s
    } else {
        &s[..n]
    }
}

/// Generate a random ID suffix. Used by [`define_id!`].
pub fn random_suffix() -> String {
    nanoid::nanoid!(SUFFIX_LEN)
}

/// Generated identity name for an agent: `<role>_<BASE32-10>`.
///
/// The hash is deterministic over (role, module, worktree) so re-registering
/// the same agent from the same worktree produces the same name.
pub fn agent_name(role: &str, module: &str, worktree: &str) -> String {
    agent_name_salted(role, module, worktree, 0)
}

/// [`agent_name`] with a salt, for forced re-registration where the
/// replaced record keeps the unsalted name.
pub fn agent_name_salted(role: &str, module: &str, worktree: &str, salt: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(role.as_bytes());
    hasher.update([0]);
    hasher.update(module.as_bytes());
    hasher.update([0]);
    hasher.update(worktree.as_bytes());
    if salt != 0 {
        hasher.update([0]);
        hasher.update(salt.to_le_bytes());
    }
    let digest = hasher.finalize();
    format!("{}_{}", role, crockford32(&digest, AGENT_HASH_LEN))
}

/// Returns true if `s` is a plausible generated hash suffix.
pub fn is_hash_suffix(s: &str) -> bool {
    s.len() == AGENT_HASH_LEN && s.bytes().all(|b| CROCKFORD.contains(&b))
}

/// Encode the leading bits of `bytes` as `len` Crockford base32 characters.
fn crockford32(bytes: &[u8], len: usize) -> String {
    let mut out = String::with_capacity(len);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    for &b in bytes {
        acc = (acc << 8) | u32::from(b);
        bits += 8;
        while bits >= 5 && out.len() < len {
            bits -= 5;
            let idx = ((acc >> bits) & 0x1f) as usize;
            out.push(CROCKFORD[idx] as char);
        }
        if out.len() == len {
            break;
        }
    }
    out
}

/// Define a newtype ID wrapper around `String` with a type prefix.
///
/// Generates `new()` for random ID generation, `from_string()`, `as_str()`,
/// `Display`, `From<String>`, `From<&str>`, `PartialEq<str>` and
/// `Borrow<str>` implementations.
///
/// The ID format is `{prefix}{suffix}` where `suffix` is a 19-character
/// random ID.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a new random ID with the type prefix.
            pub fn new() -> Self {
                Self(format!("{}{}", Self::PREFIX, $crate::id::random_suffix()))
            }

            /// Create an ID from an existing string (parsing/deserialization).
            pub fn from_string(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a message (`msg_`).
    pub struct MessageId("msg_");
}

define_id! {
    /// Unique identifier for a session (`ses_`).
    pub struct SessionId("ses_");
}

define_id! {
    /// Unique identifier for a thread (`thr_`).
    pub struct ThreadId("thr_");
}

define_id! {
    /// Unique identifier for a subscription (`sub_`).
    pub struct SubscriptionId("sub_");
}

define_id! {
    /// Unique identifier for a group (`grp_`).
    pub struct GroupId("grp_");
}

define_id! {
    /// Unique identifier for a message ref (`r_`).
    pub struct RefId("r_");
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
