//! Cache-defeat tokens.
//!
//! Every load of a module gets a fresh token appended to its loader address
//! (`./module.so?reload=3`). Loaders that key their cache on the full address
//! therefore never serve a previous load.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Query key used to carry the token on a loader address.
pub const TOKEN_KEY: &str = "reload";

/// One cache-defeat token. Strictly increasing within one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheToken(u64);

impl CacheToken {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Append this token to an address as a query suffix.
    pub fn decorate(self, address: &str) -> String {
        format!("{address}?{TOKEN_KEY}={}", self.0)
    }
}

impl fmt::Display for CacheToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Split a decorated address into its base and token.
///
/// Addresses without a well-formed `?reload=<n>` suffix come back unchanged
/// with no token.
pub fn split_token(address: &str) -> (&str, Option<CacheToken>) {
    let Some((base, query)) = address.rsplit_once('?') else {
        return (address, None);
    };

    let token = query
        .strip_prefix(TOKEN_KEY)
        .and_then(|rest| rest.strip_prefix('='))
        .and_then(|value| value.parse::<u64>().ok());

    match token {
        Some(value) => (base, Some(CacheToken(value))),
        None => (address, None),
    }
}

/// Per-invocation token source.
///
/// Owned by exactly one orchestrator, so it needs no synchronization. It is
/// never reset; the first token handed out is `0`.
#[derive(Debug, Default)]
pub struct TokenCounter {
    next: u64,
}

impl TokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next token.
    pub fn next_token(&mut self) -> CacheToken {
        let token = CacheToken(self.next);
        self.next = self.next.saturating_add(1);
        token
    }

    /// Number of tokens handed out so far.
    pub fn issued(&self) -> u64 {
        self.next
    }
}
