//! Caller-relative module paths to loader addresses.
//!
//! The caller names its module relative to its own source file
//! (`./plugins/libgreeter.so`), but the loader resolves addresses against a
//! single fixed base: the core directory of this crate. The resolver bridges
//! the two:
//!
//! 1. take the caller's containing directory,
//! 2. resolve the target against it (`.`/`..` collapse, absolute targets win),
//! 3. express the result relative to the core directory,
//! 4. normalize separators to `/` and mark it as a relative file reference.

use std::fmt;
use std::path::{Path, PathBuf};

use path_clean::PathClean;

use crate::error::ResolveError;
use crate::token::{split_token, CacheToken};

/// Directory the loader resolves addresses against.
pub fn core_dir() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/src"))
}

/// A normalized, relative-file-marked module address.
///
/// Always uses `/` separators and always starts with `./` or `../`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoaderAddress(String);

impl LoaderAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address decorated with a cache-defeat token.
    pub fn with_token(&self, token: CacheToken) -> String {
        token.decorate(&self.0)
    }
}

impl fmt::Display for LoaderAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LoaderAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolves caller-relative paths against a fixed base directory.
#[derive(Debug, Clone)]
pub struct PathResolver {
    base_dir: PathBuf,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new(core_dir())
    }
}

impl PathResolver {
    /// Resolver for a custom base directory.
    ///
    /// The loader that consumes the addresses must use the same base.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().clean(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Turn `target`, relative to the caller's file, into a loader address.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::MissingCallerLocation`] when `caller` is absent or empty
    /// - [`ResolveError::InvalidPath`] for an empty target, a relative caller
    ///   location, or when no relative path from the base exists
    pub fn resolve(
        &self,
        target: &str,
        caller: Option<&Path>,
    ) -> Result<LoaderAddress, ResolveError> {
        let caller = caller
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(ResolveError::MissingCallerLocation)?;

        if target.is_empty() {
            return Err(ResolveError::invalid(target, "module path is empty"));
        }

        if !caller.is_absolute() {
            return Err(ResolveError::invalid(
                caller.to_string_lossy(),
                "caller location must be absolute",
            ));
        }

        let caller_dir = caller.parent().unwrap_or(caller);
        let absolute = caller_dir.join(target).clean();

        let relative = pathdiff::diff_paths(&absolute, &self.base_dir).ok_or_else(|| {
            ResolveError::invalid(
                target,
                format!("no relative path from {}", self.base_dir.display()),
            )
        })?;

        Ok(LoaderAddress(mark_relative(&normalize_separators(&relative))))
    }

    /// Map an address (with or without token) back to an absolute path.
    pub fn locate(&self, address: &str) -> PathBuf {
        let (base, _) = split_token(address);
        self.base_dir.join(base).clean()
    }
}

fn normalize_separators(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn mark_relative(path: &str) -> String {
    if path.is_empty() {
        "./".to_string()
    } else if path.starts_with("./") || path.starts_with("../") {
        path.to_string()
    } else {
        format!("./{path}")
    }
}
