use std::sync::Arc;

use super::metrics::StoreMetrics;
use crate::primitives::scheduler::{ImmediateScheduler, TaskScheduler};
use crate::schema::Schema;

/// Configuration options supplied when creating a [`super::Store`].
#[derive(Clone)]
pub struct StoreOptions {
    /// Scheduler running debounced garbage collection.
    pub gc_scheduler: Arc<dyn TaskScheduler>,
    /// Whether releasing roots schedules collection at all.
    pub gc_enabled: bool,
    /// Schema used for abstract type conditions.
    pub schema: Option<Arc<Schema>>,
    /// Optional metrics collection implementation.
    pub metrics: Option<Arc<dyn StoreMetrics>>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            gc_scheduler: Arc::new(ImmediateScheduler::new()),
            gc_enabled: true,
            schema: None,
            metrics: None,
        }
    }
}

impl StoreOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scheduler garbage collection runs on.
    pub fn gc_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.gc_scheduler = scheduler;
        self
    }

    /// Enables or disables scheduled garbage collection.
    pub fn gc_enabled(mut self, enabled: bool) -> Self {
        self.gc_enabled = enabled;
        self
    }

    pub fn schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn StoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}
