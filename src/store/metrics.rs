use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for tracking store activity.
///
/// Implementations receive counts from the publish, notify, garbage
/// collection and incremental-delivery paths. Calls happen on the hot path,
/// so implementations should be cheap.
pub trait StoreMetrics: Send + Sync {
    /// Records a publish that wrote `records` entries.
    fn published(&self, records: usize);

    /// Records a notify pass that fired `fired` subscription callbacks.
    fn notified(&self, fired: usize);

    /// Records a collection that removed `records` entries.
    fn collected(&self, records: usize);

    /// Records an incremental payload matched to a pending entry.
    fn incremental_resolved(&self);

    /// Records an incremental payload rejected (unknown label or path).
    fn incremental_rejected(&self);
}

/// A no-op implementation of [`StoreMetrics`].
#[derive(Default)]
pub struct NoopMetrics;

impl StoreMetrics for NoopMetrics {
    fn published(&self, _records: usize) {}
    fn notified(&self, _fired: usize) {}
    fn collected(&self, _records: usize) {}
    fn incremental_resolved(&self) {}
    fn incremental_rejected(&self) {}
}

/// Thread-safe counter-based implementation of [`StoreMetrics`].
#[derive(Default, Debug)]
pub struct CounterMetrics {
    /// Number of publishes.
    pub publishes: AtomicU64,

    /// Number of records written across all publishes.
    pub records_published: AtomicU64,

    /// Number of notify passes.
    pub notifies: AtomicU64,

    /// Number of subscription callbacks fired.
    pub callbacks_fired: AtomicU64,

    /// Number of records removed by garbage collection.
    pub records_collected: AtomicU64,

    pub incremental_resolved: AtomicU64,

    pub incremental_rejected: AtomicU64,
}

impl StoreMetrics for CounterMetrics {
    fn published(&self, records: usize) {
        self.publishes.fetch_add(1, Ordering::Relaxed);
        self.records_published
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    fn notified(&self, fired: usize) {
        self.notifies.fetch_add(1, Ordering::Relaxed);
        self.callbacks_fired.fetch_add(fired as u64, Ordering::Relaxed);
    }

    fn collected(&self, records: usize) {
        self.records_collected
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    fn incremental_resolved(&self) {
        self.incremental_resolved.fetch_add(1, Ordering::Relaxed);
    }

    fn incremental_rejected(&self) {
        self.incremental_rejected.fetch_add(1, Ordering::Relaxed);
    }
}

/// Returns the default metrics sink (no-op).
pub fn default_metrics() -> Arc<dyn StoreMetrics> {
    Arc::new(NoopMetrics)
}
