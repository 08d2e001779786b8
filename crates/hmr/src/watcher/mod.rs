//! Change notification.
//!
//! The orchestrator registers exactly one listener per invocation through
//! [`Watch::watch`] and then awaits [`ChangeSource::changed`] between
//! reloads. Debouncing and coalescing are the watcher's job: whatever arrives
//! while a reload is in flight must come out as (at most) one change.

mod fs;
mod manual;

pub use fs::FsWatcher;
pub use manual::{ChangeTrigger, ManualWatcher};

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use path_clean::PathClean;

use crate::error::WatchError;

/// One change signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Change {
    /// Paths that changed since the previous signal (may be empty for
    /// programmatic triggers)
    pub paths: Vec<PathBuf>,
}

impl Change {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

/// A registered listener: yields change signals until the watch ends.
#[async_trait]
pub trait ChangeSource: Send {
    /// Wait for the next change. `None` once the source is closed.
    async fn changed(&mut self) -> Option<Change>;
}

/// Registers change listeners.
pub trait Watch: Send + Sync {
    fn watch(&self, target: &WatchTarget) -> Result<Box<dyn ChangeSource>, WatchError>;
}

/// What to watch: a plain path or a glob pattern.
#[derive(Clone)]
pub enum WatchTarget {
    Path(PathBuf),
    Glob {
        /// The pattern as given
        pattern: String,
        /// Longest directory prefix without glob metacharacters
        root: PathBuf,
        /// Matcher for absolute, `/`-separated event paths
        matcher: GlobMatcher,
    },
}

impl WatchTarget {
    /// Parse a watch target; strings containing `* ? [ {` are globs.
    ///
    /// Relative targets stay relative here; [`WatchTarget::absolute`] anchors
    /// them to a directory.
    pub fn parse(target: &str) -> Result<Self, WatchError> {
        let target = if target.is_empty() { "." } else { target };

        if !is_glob(target) {
            return Ok(WatchTarget::Path(PathBuf::from(target)));
        }

        let normalized = target.replace('\\', "/");
        let matcher = GlobBuilder::new(&normalized)
            .literal_separator(true)
            .build()
            .map_err(|source| WatchError::InvalidPattern {
                pattern: target.to_string(),
                source,
            })?
            .compile_matcher();

        Ok(WatchTarget::Glob {
            pattern: target.to_string(),
            root: literal_root(&normalized),
            matcher,
        })
    }

    /// Anchor a relative target to `base`.
    pub fn absolute(&self, base: &Path) -> Result<Self, WatchError> {
        match self {
            WatchTarget::Path(path) => Ok(WatchTarget::Path(base.join(path).clean())),
            WatchTarget::Glob { pattern, .. } => {
                let normalized = pattern.replace('\\', "/");
                if Path::new(&normalized).is_absolute() {
                    return Ok(self.clone());
                }
                let base = base.to_string_lossy().replace('\\', "/");
                let joined = format!("{}/{}", base.trim_end_matches('/'), normalized);
                let mut anchored = WatchTarget::parse(&joined)?;
                if let WatchTarget::Glob { pattern: p, .. } = &mut anchored {
                    p.clone_from(pattern);
                }
                Ok(anchored)
            }
        }
    }

    /// Directory (or file) handed to the backend.
    pub fn root(&self) -> &Path {
        match self {
            WatchTarget::Path(path) => path,
            WatchTarget::Glob { root, .. } => root,
        }
    }

    /// Whether an event on `path` concerns this target.
    pub fn matches(&self, path: &Path) -> bool {
        match self {
            WatchTarget::Path(root) => path.starts_with(root),
            WatchTarget::Glob { matcher, .. } => {
                matcher.is_match(path.to_string_lossy().replace('\\', "/"))
            }
        }
    }
}

impl fmt::Debug for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchTarget::Path(path) => f.debug_tuple("Path").field(path).finish(),
            WatchTarget::Glob { pattern, root, .. } => f
                .debug_struct("Glob")
                .field("pattern", pattern)
                .field("root", root)
                .finish_non_exhaustive(),
        }
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchTarget::Path(path) => write!(f, "{}", path.display()),
            WatchTarget::Glob { pattern, .. } => f.write_str(pattern),
        }
    }
}

fn is_glob(target: &str) -> bool {
    target.contains(['*', '?', '[', '{'])
}

fn literal_root(pattern: &str) -> PathBuf {
    let literal: Vec<&str> = pattern
        .split('/')
        .take_while(|segment| !is_glob(segment))
        .collect();

    match literal.as_slice() {
        [] => PathBuf::from("."),
        [""] => PathBuf::from("/"),
        segments => PathBuf::from(segments.join("/")),
    }
}
