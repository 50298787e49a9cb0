//! Matrix update instrumentation
//!
//! The host exposes an observer slot that its scene graph notifies whenever
//! an object recomputes its local or world matrix. [`MatrixHooks::install`]
//! puts the engine's counters into that slot and chains to whatever observer
//! was there before; [`MatrixHooks::uninstall`] puts the previous observer
//! back, the same `Rc`, so the host ends up exactly as it was.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::Serialize;
use tracing::debug;

/// Receives matrix update notifications from the host scene graph
pub trait MatrixObserver {
    fn local_matrix_updated(&self);
    fn world_matrix_updated(&self);
}

/// Host-owned slot holding the active observer
pub type ObserverSlot = Rc<RefCell<Option<Rc<dyn MatrixObserver>>>>;

/// Create an empty observer slot
pub fn observer_slot() -> ObserverSlot {
    Rc::new(RefCell::new(None))
}

/// Matrix updates seen during the current frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatrixCounts {
    pub local: u64,
    pub world: u64,
}

#[derive(Default)]
struct MatrixCounters {
    local: Cell<u64>,
    world: Cell<u64>,
    chained: RefCell<Option<Rc<dyn MatrixObserver>>>,
}

impl MatrixObserver for MatrixCounters {
    fn local_matrix_updated(&self) {
        self.local.set(self.local.get() + 1);
        if let Some(next) = self.chained.borrow().as_ref() {
            next.local_matrix_updated();
        }
    }

    fn world_matrix_updated(&self) {
        self.world.set(self.world.get() + 1);
        if let Some(next) = self.chained.borrow().as_ref() {
            next.world_matrix_updated();
        }
    }
}

/// Engine-owned counters, optionally installed into a host slot
pub struct MatrixHooks {
    counters: Rc<MatrixCounters>,
    slot: Option<ObserverSlot>,
    previous: Option<Rc<dyn MatrixObserver>>,
}

impl MatrixHooks {
    /// Counters that nothing feeds yet
    pub fn detached() -> Self {
        Self {
            counters: Rc::new(MatrixCounters::default()),
            slot: None,
            previous: None,
        }
    }

    /// Install into `slot`. Installing again first restores the previous slot.
    pub fn install(&mut self, slot: ObserverSlot) {
        self.uninstall();

        let observer: Rc<dyn MatrixObserver> = self.counters.clone();
        let previous = slot.borrow_mut().replace(observer);
        *self.counters.chained.borrow_mut() = previous.clone();
        self.previous = previous;
        self.slot = Some(slot);
        debug!("matrix update hooks installed");
    }

    /// Restore the observer found at install time. No-op when not installed.
    pub fn uninstall(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        *slot.borrow_mut() = self.previous.take();
        self.counters.chained.borrow_mut().take();
        debug!("matrix update hooks removed");
    }

    pub fn is_installed(&self) -> bool {
        self.slot.is_some()
    }

    pub fn counts(&self) -> MatrixCounts {
        MatrixCounts {
            local: self.counters.local.get(),
            world: self.counters.world.get(),
        }
    }

    /// Zero the counters; called at every frame boundary
    pub fn reset(&self) {
        self.counters.local.set(0);
        self.counters.world.set(0);
    }
}

impl Default for MatrixHooks {
    fn default() -> Self {
        Self::detached()
    }
}

impl Drop for MatrixHooks {
    fn drop(&mut self) {
        self.uninstall();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct HostObserver {
        world: Cell<u64>,
    }

    impl MatrixObserver for HostObserver {
        fn local_matrix_updated(&self) {}
        fn world_matrix_updated(&self) {
            self.world.set(self.world.get() + 1);
        }
    }

    fn notify_world(slot: &ObserverSlot) {
        if let Some(observer) = slot.borrow().as_ref() {
            observer.world_matrix_updated();
        }
    }

    #[test]
    fn test_counts_and_chains() {
        let slot = observer_slot();
        let host = Rc::new(HostObserver::default());
        *slot.borrow_mut() = Some(host.clone() as Rc<dyn MatrixObserver>);

        let mut hooks = MatrixHooks::detached();
        hooks.install(slot.clone());
        notify_world(&slot);
        notify_world(&slot);

        assert_eq!(hooks.counts().world, 2);
        assert_eq!(host.world.get(), 2);

        hooks.reset();
        assert_eq!(hooks.counts(), MatrixCounts::default());
    }

    #[test]
    fn test_uninstall_restores_exactly() {
        let slot = observer_slot();
        let host: Rc<dyn MatrixObserver> = Rc::new(HostObserver::default());
        *slot.borrow_mut() = Some(host.clone());

        let mut hooks = MatrixHooks::detached();
        hooks.install(slot.clone());
        hooks.uninstall();
        hooks.uninstall();

        let restored = slot.borrow().clone().unwrap();
        assert!(Rc::ptr_eq(&restored, &host));
        assert!(!hooks.is_installed());
    }

    #[test]
    fn test_drop_restores_empty_slot() {
        let slot = observer_slot();
        {
            let mut hooks = MatrixHooks::detached();
            hooks.install(slot.clone());
            assert!(slot.borrow().is_some());
        }
        assert!(slot.borrow().is_none());
    }
}
