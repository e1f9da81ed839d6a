//! Cache invalidation bus.
//!
//! Writers announce "the catalog changed" here instead of calling the caches
//! that derive state from the store. Listeners are isolated from each other:
//! an error or panic in one is logged and the rest still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

/// A component holding state derived from the catalog store.
pub trait CacheListener: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Drop or rebuild derived state. Called synchronously from
    /// [`InvalidationBus::trigger`].
    fn on_invalidate(&self) -> anyhow::Result<()>;
}

/// Outcome of one [`InvalidationBus::trigger`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerReport {
    pub invoked: usize,
    pub failed: Vec<String>,
}

impl TriggerReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Default)]
pub struct InvalidationBus {
    listeners: Mutex<Vec<Arc<dyn CacheListener>>>,
}

impl InvalidationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `listener`. Registering the same object twice is a no-op and
    /// returns `false`.
    pub fn register(&self, listener: Arc<dyn CacheListener>) -> bool {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        debug!("Registered cache listener {}", listener.name());
        listeners.push(listener);
        true
    }

    /// Invokes every registered listener in registration order.
    pub fn trigger(&self) -> TriggerReport {
        // Snapshot so listeners may touch the bus without deadlocking.
        let listeners: Vec<Arc<dyn CacheListener>> = self.listeners.lock().clone();
        let mut report = TriggerReport::default();

        for listener in listeners {
            report.invoked += 1;
            match catch_unwind(AssertUnwindSafe(|| listener.on_invalidate())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Cache listener {} failed to invalidate: {:#}", listener.name(), e);
                    report.failed.push(listener.name().to_string());
                }
                Err(_) => {
                    error!("Cache listener {} panicked during invalidation", listener.name());
                    report.failed.push(listener.name().to_string());
                }
            }
        }
        report
    }

    /// Drops every registration. Meant for tests.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn same_listener(a: &Arc<dyn CacheListener>, b: &Arc<dyn CacheListener>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
