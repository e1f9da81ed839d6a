use std::sync::atomic::{AtomicU64, Ordering};

/// Invalidation counter for caches that read the store outside their own
/// lock.
///
/// A loader records [`Epoch::current`] before reading and installs its result
/// only while [`Epoch::is_current`] still holds. `advance` and the install
/// check must both happen under the cache's write lock.
#[derive(Debug, Default)]
pub struct Epoch(AtomicU64);

impl Epoch {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn advance(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_current(&self, seen: u64) -> bool {
        self.current() == seen
    }
}
