//! Entry point and session builder.
//!
//! [`hmr`] is the one-call form: it figures out who called it, resolves the
//! module path against that caller, and spawns the reload loop on the current
//! tokio runtime. [`Hmr`] exposes every collaborator for embedders and tests.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span, warn};

use crate::caller::{CallerLocator, SourceLocation};
use crate::config::HmrOptions;
use crate::error::{HmrError, panic_message};
use crate::events::EventSender;
use crate::loader::{Dylib, DylibLoader, ModuleHandle, ModuleLoader};
use crate::notifier::{ConsoleNotifier, ReloadNotifier};
use crate::orchestrator::{CurrentHandle, Orchestrator, RunReport, report_failure};
use crate::resolver::PathResolver;
use crate::watcher::{FsWatcher, Watch};

/// Hot reload `target` and hand every load to `callback`.
///
/// `target` is relative to the calling source file, `watch` (a path or glob,
/// `"."` for the working directory) is relative to the working directory.
/// Options come from `hmr.toml` and `HMR_*` variables when present.
///
/// Must be called from within a tokio runtime; otherwise the returned task is
/// already halted with an unexpected failure.
///
/// ```rust,no_run
/// # async fn demo() {
/// let task = hmr::hmr("../target/debug/libgreeter.so", ".", |module| {
///     let greet = unsafe { module.get::<extern "C" fn(i32, i32) -> i32>("default")? };
///     println!("{}", greet(1, 2));
///     Ok(())
/// });
/// task.join().await;
/// # }
/// ```
#[track_caller]
pub fn hmr<F>(target: &str, watch: &str, callback: F) -> HmrTask<Dylib>
where
    F: FnMut(ModuleHandle<Dylib>) -> anyhow::Result<()> + Send + 'static,
{
    let options = match HmrOptions::load() {
        Ok(options) => options,
        Err(e) => {
            warn!(error = %e, "ignoring invalid hmr configuration");
            HmrOptions::default()
        }
    };
    Hmr::with_options(target, options).watch(watch).spawn(callback)
}

/// Builder for one reload invocation.
pub struct Hmr<L = DylibLoader> {
    target: String,
    watch: String,
    caller: Box<dyn CallerLocator>,
    resolver: PathResolver,
    loader: L,
    watcher: Option<Arc<dyn Watch>>,
    notifier: Option<Arc<dyn ReloadNotifier>>,
    options: HmrOptions,
    events: Option<EventSender>,
}

impl Hmr<DylibLoader> {
    /// Start a session for `target`, relative to the calling source file.
    #[track_caller]
    pub fn new(target: impl Into<String>) -> Self {
        Self::with_options(target, HmrOptions::default())
    }

    /// Like [`Hmr::new`], with the dylib loader configured from `options`.
    #[track_caller]
    pub fn with_options(target: impl Into<String>, options: HmrOptions) -> Self {
        Self {
            target: target.into(),
            watch: ".".to_string(),
            caller: Box::new(SourceLocation::caller()),
            resolver: PathResolver::default(),
            loader: DylibLoader::from_options(&options),
            watcher: None,
            notifier: None,
            options,
            events: None,
        }
    }

    /// Resolve and load relative to `dir` instead of the crate's core directory.
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resolver = PathResolver::new(dir.into());
        self.loader = self.loader.with_resolver(self.resolver.clone());
        self
    }
}

impl<L> Hmr<L> {
    /// Path or glob to watch. Defaults to `"."`.
    pub fn watch(mut self, watch: impl Into<String>) -> Self {
        self.watch = watch.into();
        self
    }

    /// Override caller detection, e.g. with [`caller_location!`](crate::caller_location)
    /// or an explicit path.
    pub fn caller(mut self, caller: impl CallerLocator + 'static) -> Self {
        self.caller = Box::new(caller);
        self
    }

    /// Resolver used for the loader address. A custom loader must resolve
    /// addresses against the same base.
    pub fn resolver(mut self, resolver: PathResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Load with another [`ModuleLoader`].
    pub fn loader<L2>(self, loader: L2) -> Hmr<L2> {
        Hmr {
            target: self.target,
            watch: self.watch,
            caller: self.caller,
            resolver: self.resolver,
            loader,
            watcher: self.watcher,
            notifier: self.notifier,
            options: self.options,
            events: self.events,
        }
    }

    /// Register change listeners with `watcher` instead of the file system.
    pub fn watcher(mut self, watcher: impl Watch + 'static) -> Self {
        self.watcher = Some(Arc::new(watcher));
        self
    }

    /// Hook called before each reload when `clear_on_reload` is set.
    pub fn notifier(mut self, notifier: impl ReloadNotifier + 'static) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    /// Options for the orchestrator and the default watcher.
    ///
    /// The dylib loader's shadow directory is fixed by [`Hmr::with_options`].
    pub fn options(mut self, options: HmrOptions) -> Self {
        self.options = options;
        self
    }

    /// Forward lifecycle events to `events`.
    pub fn events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }
}

impl<L> Hmr<L>
where
    L: ModuleLoader,
{
    /// Run the invocation on the current task until it ends.
    pub async fn run<F>(self, callback: F) -> RunReport
    where
        F: FnMut(ModuleHandle<L::Module>) -> anyhow::Result<()> + Send,
    {
        let span = info_span!("hmr", module = %self.target);
        match self.prepare(callback, Arc::new(RwLock::new(None))) {
            Ok(orchestrator) => orchestrator.run().instrument(span).await,
            Err(report) => report,
        }
    }

    /// Spawn the invocation on the current tokio runtime.
    pub fn spawn<F>(self, callback: F) -> HmrTask<L::Module>
    where
        L: 'static,
        F: FnMut(ModuleHandle<L::Module>) -> anyhow::Result<()> + Send + 'static,
    {
        let current: CurrentHandle<L::Module> = Arc::new(RwLock::new(None));

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                let err = HmrError::Unexpected(format!("no tokio runtime to spawn on: {e}"));
                report_failure(&self.target, &err, self.events.as_ref());
                return HmrTask::finished(current, RunReport::halted(err));
            }
        };

        let span = info_span!("hmr", module = %self.target);
        match self.prepare(callback, Arc::clone(&current)) {
            Ok(orchestrator) => {
                let handle = runtime.spawn(orchestrator.run().instrument(span));
                HmrTask {
                    current,
                    inner: TaskInner::Running(handle),
                }
            }
            Err(report) => HmrTask::finished(current, report),
        }
    }

    fn prepare<F>(
        self,
        callback: F,
        current: CurrentHandle<L::Module>,
    ) -> Result<Orchestrator<L, F>, RunReport>
    where
        F: FnMut(ModuleHandle<L::Module>) -> anyhow::Result<()> + Send,
    {
        let caller = self.caller.caller_location();
        let address = match self.resolver.resolve(&self.target, caller.as_deref()) {
            Ok(address) => address,
            Err(e) => {
                let err = HmrError::from(e);
                report_failure(&self.target, &err, self.events.as_ref());
                return Err(RunReport::halted(err));
            }
        };

        let watcher = self
            .watcher
            .unwrap_or_else(|| Arc::new(FsWatcher::from_options(&self.options)));
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(ConsoleNotifier::default()));

        let mut orchestrator = Orchestrator::new(
            self.target,
            address,
            self.watch,
            self.loader,
            watcher,
            callback,
        )
        .notifier(notifier)
        .clear_on_reload(self.options.clear_on_reload)
        .with_current(current);

        if let Some(events) = self.events {
            orchestrator = orchestrator.events(events);
        }

        Ok(orchestrator)
    }
}

/// A spawned reload invocation.
pub struct HmrTask<M> {
    current: CurrentHandle<M>,
    inner: TaskInner,
}

enum TaskInner {
    Running(JoinHandle<RunReport>),
    Finished(RunReport),
}

impl<M> HmrTask<M> {
    fn finished(current: CurrentHandle<M>, report: RunReport) -> Self {
        Self {
            current,
            inner: TaskInner::Finished(report),
        }
    }

    /// The last successfully loaded handle, if any.
    ///
    /// After a failed reload this is still the previous handle.
    pub fn current(&self) -> Option<ModuleHandle<M>> {
        self.current.read().clone()
    }

    pub fn is_finished(&self) -> bool {
        match &self.inner {
            TaskInner::Running(handle) => handle.is_finished(),
            TaskInner::Finished(_) => true,
        }
    }

    /// Stop the invocation. The change listener is dropped with the task.
    pub fn abort(&self) {
        if let TaskInner::Running(handle) = &self.inner {
            handle.abort();
        }
    }

    /// Wait for the invocation to end.
    pub async fn join(self) -> RunReport {
        match self.inner {
            TaskInner::Finished(report) => report,
            TaskInner::Running(handle) => match handle.await {
                Ok(report) => report,
                Err(e) if e.is_cancelled() => RunReport::aborted(),
                Err(e) => {
                    let message = match e.try_into_panic() {
                        Ok(payload) => panic_message(payload.as_ref()),
                        Err(e) => e.to_string(),
                    };
                    RunReport::halted(HmrError::Unexpected(message))
                }
            },
        }
    }
}

impl<M> std::fmt::Debug for HmrTask<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmrTask")
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
