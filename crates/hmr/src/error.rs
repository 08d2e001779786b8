//! Error types for the reload pipeline.
//!
//! Every stage has its own error enum so failures can be reported with the
//! right severity:
//!
//! - [`ResolveError`] - the caller-relative path could not be turned into a
//!   loader address. The invocation aborts before anything is loaded.
//! - [`LoadError`] - the module loader could not produce a module.
//! - [`WatchError`] - the change listener could not be registered.
//! - [`ConfigError`] - `hmr.toml` / `HMR_*` settings are invalid.
//!
//! [`HmrError`] is what the orchestrator reports. None of these ever escape
//! to the embedding program as a panic; they end up in the log, on the event
//! channel and in the final [`RunReport`](crate::RunReport).

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::CacheToken;

/// Result alias defaulting to [`HmrError`].
pub type Result<T, E = HmrError> = std::result::Result<T, E>;

/// Failures while computing the loader address.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The caller locator could not tell who invoked the entry point.
    #[error("could not determine the location of the calling module")]
    MissingCallerLocation,

    /// The target path (or the caller location) cannot be resolved.
    #[error("invalid module path '{path}': {reason}")]
    InvalidPath {
        /// The offending path as given
        path: String,
        /// Why it was rejected
        reason: String,
    },
}

impl ResolveError {
    pub(crate) fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by a [`ModuleLoader`](crate::ModuleLoader).
#[derive(Debug, Error)]
pub enum LoadError {
    /// Nothing exists at the resolved module path.
    #[error("module not found: {}", .0.display())]
    NotFound(PathBuf),

    /// I/O error while preparing the module (shadow copy, directory creation).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The platform loader rejected the library.
    #[error("failed to open library: {0}")]
    Library(#[from] libloading::Error),

    /// The module loaded but does not export a required binding.
    #[error("module does not export '{symbol}'")]
    MissingExport {
        /// Name of the missing export
        symbol: String,
    },

    /// Loader-specific failure with a custom message.
    #[error("{0}")]
    Other(String),
}

/// Failures while registering a change listener.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The notify backend refused the path.
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The watch target looked like a glob but does not compile.
    #[error("invalid watch pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The pattern as given
        pattern: String,
        /// Underlying glob error
        #[source]
        source: globset::Error,
    },

    /// The watch collaborator only supports one listener and already has it.
    #[error("a change listener is already registered")]
    AlreadyRegistered,

    /// The watch target could not be resolved against the working directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value in `hmr.toml` or the environment has the wrong shape.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),

    /// An explicitly requested config file does not exist.
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Invalid(Box::new(err))
    }
}

/// The failure taxonomy, independent of the error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingCallerLocation,
    InvalidPath,
    InitialLoadFailed,
    ReloadFailed,
    CallbackFailed,
    WatchFailed,
    UnexpectedFailure,
}

impl FailureKind {
    /// Stable code used in log lines and events.
    pub fn code(self) -> &'static str {
        match self {
            FailureKind::MissingCallerLocation => "MISSING_CALLER_LOCATION",
            FailureKind::InvalidPath => "INVALID_PATH",
            FailureKind::InitialLoadFailed => "FIRST_IMPORT_FAILED",
            FailureKind::ReloadFailed => "WATCH_IMPORT_FAILED",
            FailureKind::CallbackFailed => "EXECUTION_ERROR",
            FailureKind::WatchFailed => "WATCH_FAILED",
            FailureKind::UnexpectedFailure => "UNEXPECTED_ERROR",
        }
    }

    /// Whether this failure stops the invocation (no watch, or no more reloads).
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            FailureKind::MissingCallerLocation
                | FailureKind::InvalidPath
                | FailureKind::InitialLoadFailed
                | FailureKind::WatchFailed
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors reported by the reload orchestrator.
#[derive(Debug, Error)]
pub enum HmrError {
    /// Path resolution failed; nothing was loaded or watched.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The first load failed; no watch was registered.
    #[error("initial load of '{address}' failed: {source}")]
    InitialLoadFailed {
        /// Decorated loader address of the attempt
        address: String,
        /// Loader error
        #[source]
        source: LoadError,
    },

    /// A load triggered by a change signal failed; the watch keeps running.
    #[error("reload #{token} of '{address}' failed: {source}")]
    ReloadFailed {
        /// Decorated loader address of the attempt
        address: String,
        /// Token of the failed attempt
        token: CacheToken,
        /// Loader error
        #[source]
        source: LoadError,
    },

    /// The consumer callback returned an error or panicked.
    #[error("error while executing callback for '{target}': {message}")]
    CallbackFailed {
        /// Target module path as given by the caller
        target: String,
        /// Error or panic message
        message: String,
    },

    /// The change listener could not be registered.
    #[error("failed to watch '{target}': {source}")]
    WatchFailed {
        /// Watch target as given by the caller
        target: String,
        /// Watcher error
        #[source]
        source: WatchError,
    },

    /// Anything that escaped the stage boundaries.
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl HmrError {
    /// Taxonomy kind of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            HmrError::Resolve(ResolveError::MissingCallerLocation) => {
                FailureKind::MissingCallerLocation
            }
            HmrError::Resolve(ResolveError::InvalidPath { .. }) => FailureKind::InvalidPath,
            HmrError::InitialLoadFailed { .. } => FailureKind::InitialLoadFailed,
            HmrError::ReloadFailed { .. } => FailureKind::ReloadFailed,
            HmrError::CallbackFailed { .. } => FailureKind::CallbackFailed,
            HmrError::WatchFailed { .. } => FailureKind::WatchFailed,
            HmrError::Unexpected(_) => FailureKind::UnexpectedFailure,
        }
    }

    /// Stable code of this error, e.g. `FIRST_IMPORT_FAILED`.
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }
}

/// Best-effort message out of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
