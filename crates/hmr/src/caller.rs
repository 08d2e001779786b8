//! Locating the module that invoked the entry point.
//!
//! Module paths are given relative to the caller's source file, so the
//! session needs to know where that file lives. The lookup is a pluggable
//! [`CallerLocator`]; the provided implementations are an explicit path and
//! a [`SourceLocation`] captured by `#[track_caller]` or by the
//! [`caller_location!`](crate::caller_location) macro.

use std::path::{Path, PathBuf};

/// Yields the absolute location of whoever invoked the entry point.
pub trait CallerLocator: Send + Sync {
    /// `None` when the caller cannot be determined.
    fn caller_location(&self) -> Option<PathBuf>;
}

impl CallerLocator for PathBuf {
    fn caller_location(&self) -> Option<PathBuf> {
        (!self.as_os_str().is_empty()).then(|| self.clone())
    }
}

/// A source file as reported by the compiler (`file!()` or
/// [`std::panic::Location::file`]).
///
/// Those paths are usually relative to the directory the compiler ran in,
/// which is the workspace root for workspace members. The file is looked up
/// under each candidate root (and its ancestors) until it exists.
#[derive(Debug, Clone)]
pub struct SourceLocation {
    file: PathBuf,
    roots: Vec<PathBuf>,
}

impl SourceLocation {
    /// Location of the code calling this function, resolved against the
    /// current working directory.
    #[track_caller]
    pub fn caller() -> Self {
        let file = std::panic::Location::caller().file();
        Self::new(file, std::env::current_dir().ok())
    }

    /// Location of `file` resolved against a crate manifest directory.
    ///
    /// Used by [`caller_location!`](crate::caller_location), which passes the
    /// caller's own `CARGO_MANIFEST_DIR`.
    pub fn with_manifest_dir(file: &str, manifest_dir: &str) -> Self {
        let mut location = Self::new(file, Some(PathBuf::from(manifest_dir)));
        if let Ok(cwd) = std::env::current_dir() {
            location.roots.push(cwd);
        }
        location
    }

    fn new(file: &str, root: Option<PathBuf>) -> Self {
        Self {
            file: PathBuf::from(file),
            roots: root.into_iter().collect(),
        }
    }

    /// The file exactly as the compiler reported it.
    pub fn file(&self) -> &Path {
        &self.file
    }

    fn find(&self) -> Option<PathBuf> {
        if self.file.as_os_str().is_empty() {
            return None;
        }
        if self.file.is_absolute() {
            return Some(self.file.clone());
        }

        self.roots
            .iter()
            .flat_map(|root| root.ancestors())
            .map(|dir| dir.join(&self.file))
            .find(|candidate| candidate.is_file())
    }
}

impl CallerLocator for SourceLocation {
    fn caller_location(&self) -> Option<PathBuf> {
        self.find()
    }
}

/// Capture the invoking source file as a [`SourceLocation`].
///
/// ```rust,no_run
/// let caller = hmr::caller_location!();
/// ```
#[macro_export]
macro_rules! caller_location {
    () => {
        $crate::SourceLocation::with_manifest_dir(file!(), env!("CARGO_MANIFEST_DIR"))
    };
}
