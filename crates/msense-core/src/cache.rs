//! Latest-result cache shared between the refresher and request handlers
//!
//! Holds exactly one immutable [`CacheEntry`] behind a read-write lock.
//! Readers clone an `Arc`; the single publisher swaps it. Neither side
//! holds the lock for longer than that pointer operation.

use crate::types::CacheEntry;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug)]
struct Published {
    entry: Arc<CacheEntry>,
    generation: u64,
}

/// Read side of the prediction cache
///
/// Cheap to clone; every clone observes the same published entry.
#[derive(Debug, Clone)]
pub struct PredictionCache {
    inner: Arc<RwLock<Published>>,
}

/// Write side of the prediction cache
///
/// Not clonable: the refresher owns the only instance.
#[derive(Debug)]
pub struct CachePublisher {
    inner: Arc<RwLock<Published>>,
}

impl PredictionCache {
    /// Create an empty cache and its publisher
    #[must_use]
    pub fn with_publisher() -> (Self, CachePublisher) {
        let inner = Arc::new(RwLock::new(Published {
            entry: Arc::new(CacheEntry::Empty),
            generation: 0,
        }));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            CachePublisher { inner },
        )
    }

    /// Most recently published entry
    #[inline]
    #[must_use]
    pub fn read(&self) -> Arc<CacheEntry> {
        Arc::clone(&self.inner.read().entry)
    }

    /// Number of publishes so far
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }
}

impl CachePublisher {
    /// Atomically replace the published entry
    #[inline]
    pub fn publish(&self, entry: CacheEntry) {
        let entry = Arc::new(entry);
        let mut guard = self.inner.write();
        guard.entry = entry;
        guard.generation += 1;
    }

    /// Entry as last published by this publisher
    #[inline]
    #[must_use]
    pub fn current(&self) -> Arc<CacheEntry> {
        Arc::clone(&self.inner.read().entry)
    }

    /// A read handle onto the same cache
    #[inline]
    #[must_use]
    pub fn reader(&self) -> PredictionCache {
        PredictionCache {
            inner: Arc::clone(&self.inner),
        }
    }
}
