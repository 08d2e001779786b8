//! # hmr
//!
//! Hot module reloading for a single module.
//!
//! `hmr` loads a target module (by default a `cdylib`), hands it to a
//! callback, watches a path or glob for changes and, on each change, loads a
//! fresh copy of the module and calls the callback again.
//!
//! ```rust,no_run
//! # async fn demo() -> anyhow::Result<()> {
//! let task = hmr::hmr("../../../target/debug/libgreeter.so", ".", |module| {
//!     let greet = unsafe { module.get::<extern "C" fn(i32, i32) -> i32>("default")? };
//!     println!("1 + 2 = {}", greet(1, 2));
//!     Ok(())
//! });
//!
//! let report = task.join().await;
//! println!("{:?}", report.outcome);
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! 1. The caller's source file is located ([`CallerLocator`]).
//! 2. The module path, relative to that file, becomes a [`LoaderAddress`]
//!    relative to this crate's core directory ([`PathResolver`]).
//! 3. Each load appends a fresh [`CacheToken`] (`?reload=<n>`) so no load is
//!    ever served from a loader cache ([`ModuleLoader`]).
//! 4. The [`Orchestrator`] serializes load, callback and reload, and contains
//!    every failure to the stage it happened in.
//!
//! Failures never surface as panics in the embedding program. They are
//! logged through `tracing`, sent as [`HmrEvent`]s and summarized in the
//! final [`RunReport`].

pub mod caller;
pub mod config;
pub mod error;
pub mod events;
pub mod loader;
pub mod logger;
pub mod notifier;
pub mod orchestrator;
pub mod resolver;
pub mod session;
pub mod token;
pub mod watcher;

pub use caller::{CallerLocator, SourceLocation};
pub use config::HmrOptions;
pub use error::{
    ConfigError, FailureKind, HmrError, LoadError, ResolveError, Result, WatchError,
};
pub use events::HmrEvent;
pub use loader::{Dylib, DylibLoader, LoadResult, ModuleHandle, ModuleLoader};
pub use notifier::{ConsoleNotifier, ReloadNotifier, RestartNotice, SilentNotifier};
pub use orchestrator::{Orchestrator, ReloadState, RunOutcome, RunReport};
pub use resolver::{LoaderAddress, PathResolver, core_dir};
pub use session::{Hmr, HmrTask, hmr};
pub use token::{CacheToken, TokenCounter};
pub use watcher::{Change, ChangeSource, ChangeTrigger, FsWatcher, ManualWatcher, Watch, WatchTarget};
