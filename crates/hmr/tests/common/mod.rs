//! Shared fixtures: an in-memory module loader and a recording notifier.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmr::token::split_token;
use hmr::{CacheToken, LoadError, LoadResult, ModuleLoader, PathResolver, ReloadNotifier, RestartNotice};
use parking_lot::Mutex;

/// Base directory the test resolver and loader agree on.
pub const BASE: &str = "/work/hmr/src";

/// Caller file used by most tests.
pub const CALLER: &str = "/work/app/src/main.rs";

pub fn resolver() -> PathResolver {
    PathResolver::new(BASE)
}

pub fn caller() -> PathBuf {
    PathBuf::from(CALLER)
}

/// Module with the two exports of the greeter fixture.
#[derive(Debug)]
pub struct Greeter {
    pub token: CacheToken,
    pub source: PathBuf,
}

impl Greeter {
    pub fn default(&self, a: &str, b: &str) -> String {
        format!("{a}{b}")
    }

    pub fn named_export(&self, a: &str, b: &str) -> String {
        format!("{b}{a}")
    }
}

#[derive(Default)]
struct State {
    addresses: Vec<String>,
    fail_tokens: HashSet<u64>,
    missing: bool,
    delay: Option<Duration>,
}

/// Loader producing a fresh [`Greeter`] per address.
#[derive(Clone, Default)]
pub struct MemoryLoader {
    state: Arc<Mutex<State>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every load fails as if the module did not exist.
    pub fn missing(self) -> Self {
        self.state.lock().missing = true;
        self
    }

    /// Fail the load carrying `token`.
    pub fn fail_on(self, token: u64) -> Self {
        self.state.lock().fail_tokens.insert(token);
        self
    }

    /// Sleep inside every load.
    pub fn delay(self, delay: Duration) -> Self {
        self.state.lock().delay = Some(delay);
        self
    }

    /// Addresses requested so far, in order.
    pub fn addresses(&self) -> Vec<String> {
        self.state.lock().addresses.clone()
    }
}

#[async_trait]
impl ModuleLoader for MemoryLoader {
    type Module = Greeter;

    async fn load(&self, address: &str) -> LoadResult<Greeter> {
        let delay = {
            let mut state = self.state.lock();
            state.addresses.push(address.to_string());
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (_, token) = split_token(address);
        let token = token.ok_or_else(|| LoadError::Other(format!("untokened address {address}")))?;
        let source = resolver().locate(address);

        let state = self.state.lock();
        if state.missing {
            return Err(LoadError::NotFound(source));
        }
        if state.fail_tokens.contains(&token.get()) {
            return Err(LoadError::Other(format!("broken module at load {token}")));
        }

        Ok(Greeter { token, source })
    }
}

/// Notifier remembering every restart notice.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<RestartNotice>>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<RestartNotice> {
        self.notices.lock().clone()
    }
}

impl ReloadNotifier for RecordingNotifier {
    fn restarted(&self, notice: &RestartNotice) {
        self.notices.lock().push(notice.clone());
    }
}
