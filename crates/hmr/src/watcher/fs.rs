//! File system watcher with debouncing for reload mode.
//!
//! Wraps the notify recommended watcher. Raw events are filtered against the
//! watch target and the ignore list on the notify thread, then debounced on
//! the async side: a burst of events becomes a single [`Change`] once the
//! watched tree has been quiet for the debounce window.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{info, trace, warn};

use super::{Change, ChangeSource, Watch, WatchTarget};
use crate::config::HmrOptions;
use crate::error::WatchError;

/// Notify-backed [`Watch`] implementation.
#[derive(Debug, Clone)]
pub struct FsWatcher {
    debounce: Duration,
    ignore_patterns: Vec<String>,
    cwd: Option<PathBuf>,
}

impl Default for FsWatcher {
    fn default() -> Self {
        Self::from_options(&HmrOptions::default())
    }
}

impl FsWatcher {
    /// Create a new file watcher.
    ///
    /// # Arguments
    ///
    /// * `debounce` - Quiet period that ends a burst of events
    /// * `ignore_patterns` - Directory names or `*.ext` patterns to drop
    pub fn new(debounce: Duration, ignore_patterns: Vec<String>) -> Self {
        Self {
            debounce,
            ignore_patterns,
            cwd: None,
        }
    }

    pub fn from_options(options: &HmrOptions) -> Self {
        Self::new(options.debounce(), options.ignore.clone())
    }

    /// Anchor relative watch targets here instead of the process working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    fn base_dir(&self) -> Result<PathBuf, WatchError> {
        let base = match &self.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir()?,
        };
        Ok(base.canonicalize().unwrap_or(base))
    }

    /// Check if a path should be ignored.
    ///
    /// Patterns starting with `*` match file name suffixes (`*.tmp`), every
    /// other pattern matches a whole path component below `root` (`.git`).
    fn should_ignore(path: &Path, root: &Path, ignore_patterns: &[String]) -> bool {
        let rel_path = path.strip_prefix(root).unwrap_or(path);
        let path_str = rel_path.to_string_lossy();

        ignore_patterns.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix('*') {
                path_str.ends_with(suffix)
            } else {
                rel_path
                    .components()
                    .any(|component| component.as_os_str() == pattern.as_str())
            }
        })
    }
}

/// Create and content changes count; access, metadata and removal do not.
fn is_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

impl Watch for FsWatcher {
    fn watch(&self, target: &WatchTarget) -> Result<Box<dyn ChangeSource>, WatchError> {
        let target = match target.absolute(&self.base_dir()?)? {
            WatchTarget::Path(path) => WatchTarget::Path(path.canonicalize().unwrap_or(path)),
            glob => glob,
        };

        let root = target.root().to_path_buf();
        if !root.exists() {
            return Err(notify::Error::path_not_found().add_path(root).into());
        }

        // A single file is watched through its directory so atomic
        // replacements (unlink + rename) keep producing events.
        let (watch_root, mode) = if root.is_dir() {
            (root.clone(), RecursiveMode::Recursive)
        } else {
            let parent = root.parent().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
            (parent, RecursiveMode::NonRecursive)
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let filter = target.clone();
        let ignore_patterns = self.ignore_patterns.clone();
        let ignore_root = watch_root.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "file watcher error");
                    return;
                }
            };

            if !is_change(&event.kind) {
                return;
            }

            for path in event.paths {
                if !filter.matches(&path)
                    || FsWatcher::should_ignore(&path, &ignore_root, &ignore_patterns)
                {
                    continue;
                }
                trace!(path = %path.display(), kind = ?event.kind, "file event");
                // Receiver gone means the listener was dropped; nothing to do.
                let _ = tx.send(path);
            }
        })?;

        watcher.watch(&watch_root, mode)?;

        info!(watch = %target, root = %watch_root.display(), "watching for changes");

        Ok(Box::new(FsChanges {
            _watcher: watcher,
            rx,
            debounce: self.debounce,
        }))
    }
}

/// Listener returned by [`FsWatcher::watch`]; dropping it stops the watch.
struct FsChanges {
    /// Held to keep the notify backend alive
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<PathBuf>,
    debounce: Duration,
}

#[async_trait]
impl ChangeSource for FsChanges {
    async fn changed(&mut self) -> Option<Change> {
        let first = self.rx.recv().await?;
        let mut paths = vec![first];

        // Trailing debounce: keep collecting until the burst goes quiet.
        while let Ok(Some(path)) = tokio::time::timeout(self.debounce, self.rx.recv()).await {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }

        Some(Change::new(paths))
    }
}
