//! The load / callback / watch / reload loop.
//!
//! One [`Orchestrator`] drives one invocation: a single loader address, a
//! single token stream and a single change listener. It runs as one async
//! task, so callback invocations never overlap and every invocation sees a
//! newer load than the one before.
//!
//! Every load sequence runs behind two boundaries. The callback is wrapped
//! in `catch_unwind` so an erroring or panicking consumer is reported and the
//! loop moves on. The whole sequence is wrapped again, so anything escaping
//! the stages (a panicking loader) is reported as an unexpected failure
//! instead of tearing down the watch.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{FailureKind, HmrError, panic_message};
use crate::events::{EventSender, HmrEvent};
use crate::loader::{ModuleHandle, ModuleLoader};
use crate::notifier::{ReloadNotifier, RestartNotice, SilentNotifier};
use crate::resolver::LoaderAddress;
use crate::token::{CacheToken, TokenCounter};
use crate::watcher::{Watch, WatchTarget};

/// Slot holding the most recent successfully loaded handle.
pub type CurrentHandle<M> = Arc<RwLock<Option<ModuleHandle<M>>>>;

/// Lifecycle of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadState {
    /// Nothing has loaded successfully yet
    Initializing,
    /// A handle is current and the loop is waiting for changes
    Loaded,
    /// A reload sequence is in flight
    Reloading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Initial,
    Reload,
}

/// How an invocation ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Stopped by a fatal failure
    Halted(HmrError),
    /// The change source closed
    WatchEnded,
    /// The task was aborted from outside
    Aborted,
}

/// Summary returned when an invocation ends.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Number of callback invocations
    pub deliveries: usize,
    /// Every contained or fatal failure, in order
    pub failures: Vec<FailureKind>,
    /// Token of the last load attempt
    pub last_token: Option<CacheToken>,
    pub state: ReloadState,
    /// Whether the last sequence failed
    pub faulted: bool,
}

impl RunReport {
    pub(crate) fn halted(error: HmrError) -> Self {
        Self {
            failures: vec![error.kind()],
            outcome: RunOutcome::Halted(error),
            deliveries: 0,
            last_token: None,
            state: ReloadState::Initializing,
            faulted: true,
        }
    }

    pub(crate) fn aborted() -> Self {
        Self {
            outcome: RunOutcome::Aborted,
            deliveries: 0,
            failures: Vec::new(),
            last_token: None,
            state: ReloadState::Initializing,
            faulted: false,
        }
    }

    pub fn is_halted(&self) -> bool {
        matches!(self.outcome, RunOutcome::Halted(_))
    }

    /// The fatal error, if the invocation halted.
    pub fn halt_error(&self) -> Option<&HmrError> {
        match &self.outcome {
            RunOutcome::Halted(error) => Some(error),
            RunOutcome::WatchEnded | RunOutcome::Aborted => None,
        }
    }
}

/// Log a failure with its code and forward it to the event channel.
pub(crate) fn report_failure(target: &str, err: &HmrError, events: Option<&EventSender>) {
    let code = err.code();
    match err.kind() {
        FailureKind::ReloadFailed | FailureKind::CallbackFailed => {
            warn!(code, module = target, error = %err, "reload failure contained")
        }
        _ => error!(code, module = target, error = %err, "hmr failure"),
    }

    if let Some(events) = events {
        let _ = events.send(HmrEvent::failed(err));
    }
}

/// Whether a failure of the first load sequence stops the invocation.
///
/// A failing initial callback is contained like any other callback failure.
fn halts_invocation(err: &HmrError) -> bool {
    matches!(
        err.kind(),
        FailureKind::InitialLoadFailed | FailureKind::UnexpectedFailure
    )
}

/// Drives one reload invocation.
pub struct Orchestrator<L, F>
where
    L: ModuleLoader,
{
    target: String,
    address: LoaderAddress,
    watch_target: String,
    loader: L,
    watcher: Arc<dyn Watch>,
    notifier: Arc<dyn ReloadNotifier>,
    clear_on_reload: bool,
    callback: F,
    tokens: TokenCounter,
    current: CurrentHandle<L::Module>,
    events: Option<EventSender>,
    state: ReloadState,
    faulted: bool,
    deliveries: usize,
    failures: Vec<FailureKind>,
    last_token: Option<CacheToken>,
}

impl<L, F> Orchestrator<L, F>
where
    L: ModuleLoader,
    F: FnMut(ModuleHandle<L::Module>) -> anyhow::Result<()> + Send,
{
    /// Create an orchestrator.
    ///
    /// # Arguments
    ///
    /// * `target` - Module path as given by the caller, used in reports
    /// * `address` - Resolved loader address of the module
    /// * `watch_target` - Path or glob to watch
    /// * `loader` - Loads a fresh module per token
    /// * `watcher` - Registers the change listener
    /// * `callback` - Receives every freshly loaded handle
    pub fn new(
        target: impl Into<String>,
        address: LoaderAddress,
        watch_target: impl Into<String>,
        loader: L,
        watcher: Arc<dyn Watch>,
        callback: F,
    ) -> Self {
        Self {
            target: target.into(),
            address,
            watch_target: watch_target.into(),
            loader,
            watcher,
            notifier: Arc::new(SilentNotifier),
            clear_on_reload: false,
            callback,
            tokens: TokenCounter::new(),
            current: Arc::new(RwLock::new(None)),
            events: None,
            state: ReloadState::Initializing,
            faulted: false,
            deliveries: 0,
            failures: Vec::new(),
            last_token: None,
        }
    }

    /// Hook called at the start of every reload when `clear_on_reload` is set.
    pub fn notifier(mut self, notifier: Arc<dyn ReloadNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn clear_on_reload(mut self, enabled: bool) -> Self {
        self.clear_on_reload = enabled;
        self
    }

    pub fn events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Publish the current handle into an existing slot.
    pub fn with_current(mut self, current: CurrentHandle<L::Module>) -> Self {
        self.current = current;
        self
    }

    /// The slot holding the last successfully loaded handle.
    pub fn current(&self) -> CurrentHandle<L::Module> {
        Arc::clone(&self.current)
    }

    pub fn state(&self) -> ReloadState {
        self.state
    }

    /// Run until the change source closes or a fatal failure halts the invocation.
    pub async fn run(mut self) -> RunReport {
        if let Err(err) = self.sequence(Stage::Initial).await {
            self.record(&err);
            if halts_invocation(&err) {
                return self.finish(RunOutcome::Halted(err));
            }
        }

        let registered = WatchTarget::parse(&self.watch_target)
            .and_then(|target| self.watcher.watch(&target));
        let mut changes = match registered {
            Ok(changes) => changes,
            Err(source) => {
                let err = HmrError::WatchFailed {
                    target: self.watch_target.clone(),
                    source,
                };
                self.record(&err);
                return self.finish(RunOutcome::Halted(err));
            }
        };

        info!(module = %self.target, watch = %self.watch_target, "watching for changes");
        self.emit(HmrEvent::WatchRegistered {
            target: self.watch_target.clone(),
        });

        while let Some(change) = changes.changed().await {
            debug!(paths = ?change.paths, "change detected");
            if let Err(err) = self.sequence(Stage::Reload).await {
                self.record(&err);
            }
        }

        info!(module = %self.target, "change source closed");
        self.emit(HmrEvent::WatchEnded);
        self.finish(RunOutcome::WatchEnded)
    }

    /// One load sequence, with panics from any stage turned into errors.
    async fn sequence(&mut self, stage: Stage) -> Result<(), HmrError> {
        let token = self.tokens.next_token();
        self.last_token = Some(token);
        if stage == Stage::Reload {
            self.state = ReloadState::Reloading;
        }

        let outcome = AssertUnwindSafe(self.attempt(stage, token))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(HmrError::Unexpected(panic_message(payload.as_ref()))));

        self.state = if self.current.read().is_some() {
            ReloadState::Loaded
        } else {
            ReloadState::Initializing
        };

        if outcome.is_ok() {
            self.faulted = false;
        }
        outcome
    }

    async fn attempt(&mut self, stage: Stage, token: CacheToken) -> Result<(), HmrError> {
        let address = self.address.with_token(token);

        if stage == Stage::Reload && self.clear_on_reload {
            self.notifier.restarted(&RestartNotice {
                target: self.target.clone(),
                token,
            });
            self.emit(HmrEvent::Restarted { token });
        }

        debug!(address = %address, token = %token, "loading module");
        let module = match self.loader.load(&address).await {
            Ok(module) => module,
            Err(source) => {
                return Err(match stage {
                    Stage::Initial => HmrError::InitialLoadFailed { address, source },
                    Stage::Reload => HmrError::ReloadFailed {
                        address,
                        token,
                        source,
                    },
                });
            }
        };

        let handle = ModuleHandle::new(token, address, module);
        *self.current.write() = Some(handle.clone());
        self.state = ReloadState::Loaded;
        self.emit(HmrEvent::Loaded {
            token,
            initial: stage == Stage::Initial,
        });

        self.deliveries += 1;
        let callback = &mut self.callback;
        let message = match std::panic::catch_unwind(AssertUnwindSafe(|| callback(handle))) {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => panic_message(payload.as_ref()),
        };

        Err(HmrError::CallbackFailed {
            target: self.target.clone(),
            message,
        })
    }

    fn record(&mut self, err: &HmrError) {
        self.faulted = true;
        self.failures.push(err.kind());
        report_failure(&self.target, err, self.events.as_ref());
    }

    fn emit(&self, event: HmrEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn finish(self, outcome: RunOutcome) -> RunReport {
        RunReport {
            outcome,
            deliveries: self.deliveries,
            failures: self.failures,
            last_token: self.last_token,
            state: self.state,
            faulted: self.faulted,
        }
    }
}
