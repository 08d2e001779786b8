//! Dynamic library loader.
//!
//! The platform loader caches opened libraries by path and file identity, so
//! a token on the address alone would still hand back the first mapping. Each
//! load therefore copies the library to a uniquely named shadow file and opens
//! the copy. Names carry the token plus random characters, so loaders that
//! share a shadow directory (two sessions in one process, or two libraries
//! with the same file name) never open each other's copies. On Unix the copy
//! is unlinked right after opening; the mapping stays valid until the
//! [`Dylib`] is dropped.

use std::ffi::OsStr;
use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use libloading::{Library, Symbol};
use tracing::{debug, trace};

use super::{LoadResult, ModuleLoader};
use crate::config::HmrOptions;
use crate::error::LoadError;
use crate::resolver::PathResolver;
use crate::token::{split_token, CacheToken};

/// A loaded dynamic library.
#[derive(Debug)]
pub struct Dylib {
    library: Library,
    source: PathBuf,
    token: Option<CacheToken>,
}

impl Dylib {
    /// Look up an exported symbol.
    ///
    /// # Safety
    ///
    /// `T` must match the actual type of the exported symbol.
    pub unsafe fn get<T>(&self, symbol: &str) -> LoadResult<Symbol<'_, T>> {
        // SAFETY: forwarded to the caller
        unsafe { self.library.get::<T>(symbol.as_bytes()) }.map_err(LoadError::from)
    }

    /// Whether the library exports `symbol`.
    pub fn has_symbol(&self, symbol: &str) -> bool {
        // SAFETY: the symbol is only looked up, never dereferenced
        unsafe { self.library.get::<*const ()>(symbol.as_bytes()).is_ok() }
    }

    /// The original library this copy was made from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn token(&self) -> Option<CacheToken> {
        self.token
    }
}

/// Loads [`Dylib`]s from loader addresses.
#[derive(Debug, Clone)]
pub struct DylibLoader {
    resolver: PathResolver,
    shadow_dir: PathBuf,
    required: Vec<String>,
}

impl Default for DylibLoader {
    fn default() -> Self {
        Self::from_options(&HmrOptions::default())
    }
}

impl DylibLoader {
    pub fn new(resolver: PathResolver, shadow_dir: impl Into<PathBuf>) -> Self {
        Self {
            resolver,
            shadow_dir: shadow_dir.into(),
            required: Vec::new(),
        }
    }

    /// Loader for the core directory, with the shadow directory from `options`.
    pub fn from_options(options: &HmrOptions) -> Self {
        Self::new(PathResolver::default(), options.shadow_dir())
    }

    /// Resolve addresses against another base directory.
    pub fn with_resolver(mut self, resolver: PathResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Fail loads of libraries that do not export all of `symbols`.
    pub fn require<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(symbols.into_iter().map(Into::into));
        self
    }

    pub fn shadow_dir(&self) -> &Path {
        &self.shadow_dir
    }

    /// Prefix and suffix of the shadow file name for `source` loaded with `token`.
    ///
    /// `libgreeter.so` with token 3 becomes `libgreeter.3.<random>.so`.
    pub fn shadow_affixes(source: &Path, token: Option<CacheToken>) -> (String, String) {
        let stem = source
            .file_stem()
            .and_then(OsStr::to_str)
            .unwrap_or("module");
        let tag = match token {
            Some(token) => token.to_string(),
            None => "untokened".to_string(),
        };
        let suffix = match source.extension().and_then(OsStr::to_str) {
            Some(ext) => format!(".{ext}"),
            None => String::new(),
        };
        (format!("{stem}.{tag}."), suffix)
    }
}

/// Copy `source` into a fresh file under `shadow_dir` and open the copy.
fn open_shadow_copy(
    source: &Path,
    shadow_dir: &Path,
    token: Option<CacheToken>,
) -> LoadResult<Library> {
    let (prefix, suffix) = DylibLoader::shadow_affixes(source, token);
    let mut shadow = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(&suffix)
        .tempfile_in(shadow_dir)?;
    std::io::copy(&mut File::open(source)?, shadow.as_file_mut())?;

    let path = shadow.into_temp_path();
    trace!(source = %source.display(), shadow = %path.display(), "copied library");

    // SAFETY: opening a library runs its initializers; the target module
    // is trusted code the user asked to hot reload.
    let opened = unsafe { Library::new(path.as_os_str()) };

    // Windows cannot delete a loaded library, so the copy is left behind.
    #[cfg(not(unix))]
    if opened.is_ok() {
        path.keep()
            .map_err(|e| LoadError::Other(format!("could not keep shadow copy: {e}")))?;
    }
    #[cfg(unix)]
    if let Err(e) = path.close() {
        debug!(error = %e, "could not remove shadow copy");
    }

    Ok(opened?)
}

#[async_trait]
impl ModuleLoader for DylibLoader {
    type Module = Dylib;

    async fn load(&self, address: &str) -> LoadResult<Dylib> {
        let (_, token) = split_token(address);
        let source = self.resolver.locate(address);

        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return Err(LoadError::NotFound(source));
        }

        tokio::fs::create_dir_all(&self.shadow_dir).await?;

        let (from, dir) = (source.clone(), self.shadow_dir.clone());
        let library = tokio::task::spawn_blocking(move || open_shadow_copy(&from, &dir, token))
            .await
            .map_err(|e| LoadError::Other(format!("loader thread failed: {e}")))??;

        let dylib = Dylib {
            library,
            source,
            token,
        };

        if let Some(missing) = self.required.iter().find(|name| !dylib.has_symbol(name)) {
            return Err(LoadError::MissingExport {
                symbol: missing.clone(),
            });
        }

        debug!(source = %dylib.source.display(), token = ?token, "library loaded");
        Ok(dylib)
    }
}
