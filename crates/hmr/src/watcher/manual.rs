//! Programmatic change source.
//!
//! Useful for embedders that learn about changes some other way (a build
//! server, an IPC message) and in tests. Every trigger becomes one change;
//! triggers sent while a reload is in flight queue up in order.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Change, ChangeSource, Watch, WatchTarget};
use crate::error::WatchError;

/// A [`Watch`] that can be registered once and is driven by [`ChangeTrigger`]s.
#[derive(Debug)]
pub struct ManualWatcher {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Change>>>,
    registrations: Arc<AtomicUsize>,
}

/// Sending half of a [`ManualWatcher`]. The source ends once every trigger is dropped.
#[derive(Debug, Clone)]
pub struct ChangeTrigger {
    tx: mpsc::UnboundedSender<Change>,
    registrations: Arc<AtomicUsize>,
}

impl ManualWatcher {
    pub fn new() -> (Self, ChangeTrigger) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registrations = Arc::new(AtomicUsize::new(0));
        let watcher = Self {
            rx: Mutex::new(Some(rx)),
            registrations: Arc::clone(&registrations),
        };
        (watcher, ChangeTrigger { tx, registrations })
    }
}

impl Watch for ManualWatcher {
    fn watch(&self, _target: &WatchTarget) -> Result<Box<dyn ChangeSource>, WatchError> {
        let rx = self.rx.lock().take().ok_or(WatchError::AlreadyRegistered)?;
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ManualChanges { rx }))
    }
}

impl ChangeTrigger {
    /// Signal a change. Returns `false` once the listener is gone.
    pub fn trigger(&self) -> bool {
        self.tx.send(Change::default()).is_ok()
    }

    /// Signal a change of specific paths.
    pub fn trigger_paths<I, P>(&self, paths: I) -> bool
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let change = Change::new(paths.into_iter().map(Into::into).collect());
        self.tx.send(change).is_ok()
    }

    /// How many listeners were registered on the watcher.
    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}

struct ManualChanges {
    rx: mpsc::UnboundedReceiver<Change>,
}

#[async_trait]
impl ChangeSource for ManualChanges {
    async fn changed(&mut self) -> Option<Change> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_triggers_arrive_in_order() {
        let (watcher, trigger) = ManualWatcher::new();
        let target = WatchTarget::parse(".").unwrap();
        let mut source = watcher.watch(&target).unwrap();

        assert!(trigger.trigger_paths(["a.rs"]));
        assert!(trigger.trigger());
        drop(trigger);

        let first = source.changed().await.unwrap();
        assert_eq!(first.paths, vec![PathBuf::from("a.rs")]);
        assert_eq!(source.changed().await, Some(Change::default()));
        assert_eq!(source.changed().await, None);
    }

    #[test]
    fn test_second_registration_is_rejected() {
        let (watcher, trigger) = ManualWatcher::new();
        let target = WatchTarget::parse(".").unwrap();

        assert!(watcher.watch(&target).is_ok());
        assert!(matches!(
            watcher.watch(&target),
            Err(WatchError::AlreadyRegistered)
        ));
        assert_eq!(trigger.registrations(), 1);
    }
}
