//! Module loader abstraction.
//!
//! The orchestrator never opens modules itself. It asks a [`ModuleLoader`]
//! for the module at a decorated address and wraps the result in a
//! [`ModuleHandle`]. The default loader is [`DylibLoader`], which treats the
//! module as a dynamic library; embedders can plug in anything else that can
//! turn an address into a fresh module.

pub mod dylib;

pub use dylib::{Dylib, DylibLoader};

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LoadError;
use crate::token::CacheToken;

/// Result type for loader operations
pub type LoadResult<T> = Result<T, LoadError>;

/// Loads a module from a loader address.
///
/// `address` is a [`LoaderAddress`](crate::LoaderAddress) decorated with a
/// cache-defeat token (`../lib/libgreeter.so?reload=3`). Implementations must
/// never serve two different tokens from the same cached module.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// The loaded module, shared with the callback.
    type Module: Send + Sync + 'static;

    /// Load a fresh copy of the module.
    async fn load(&self, address: &str) -> LoadResult<Self::Module>;
}

#[async_trait]
impl<L: ModuleLoader + ?Sized> ModuleLoader for Arc<L> {
    type Module = L::Module;

    async fn load(&self, address: &str) -> LoadResult<Self::Module> {
        (**self).load(address).await
    }
}

/// The bindings produced by one load of the target module.
///
/// Cloning is cheap and keeps the same load alive. Each load produces a
/// distinct handle; use [`ModuleHandle::same_load`] to compare identities.
pub struct ModuleHandle<M> {
    token: CacheToken,
    address: Arc<str>,
    module: Arc<M>,
}

impl<M> ModuleHandle<M> {
    pub(crate) fn new(token: CacheToken, address: impl Into<Arc<str>>, module: M) -> Self {
        Self {
            token,
            address: address.into(),
            module: Arc::new(module),
        }
    }

    /// Token of the load that produced this handle.
    pub fn token(&self) -> CacheToken {
        self.token
    }

    /// Decorated address the module was loaded from.
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn module(&self) -> &Arc<M> {
        &self.module
    }

    /// Whether both handles come from the very same load.
    pub fn same_load(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.module, &other.module)
    }
}

impl<M> Clone for ModuleHandle<M> {
    fn clone(&self) -> Self {
        Self {
            token: self.token,
            address: Arc::clone(&self.address),
            module: Arc::clone(&self.module),
        }
    }
}

impl<M> Deref for ModuleHandle<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.module
    }
}

impl<M> fmt::Debug for ModuleHandle<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("token", &self.token)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_identity() {
        let first = ModuleHandle::new(CacheToken::new(0), "./m.so?reload=0", 5_u32);
        let clone = first.clone();
        let second = ModuleHandle::new(CacheToken::new(1), "./m.so?reload=1", 5_u32);

        assert!(first.same_load(&clone));
        assert!(!first.same_load(&second));
        assert_eq!(*first, *second);
        assert_eq!(second.token(), CacheToken::new(1));
        assert_eq!(second.address(), "./m.so?reload=1");
    }
}
