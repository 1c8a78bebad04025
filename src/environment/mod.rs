//! Execution environment: wires a [`Network`] to a [`Store`].
//!
//! [`Environment::execute`] is the one entry point for fetching: responses
//! stream through normalization, incremental matching and handlers before
//! each is published and observed.

mod executor;
pub mod handlers;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

pub use executor::ExecutionState;
use executor::Executor;
pub use handlers::{FieldHandler, HandlerProvider, HandlerRegistry};

use crate::error::{CacheError, Result};
use crate::network::{CacheConfig, Network, Response};
use crate::primitives::disposable::Disposable;
use crate::primitives::observable::{Observable, Teardown};
use crate::primitives::scheduler::TaskScheduler;
use crate::selection::{OperationDescriptor, Selector};
use crate::store::{
    normalize, GetDataId, HandleFieldPayload, MutationBatch, NormalizationOptions, OverlayId,
    RecordSourceMutator, Snapshot, Store,
};
use crate::types::{DataId, ROOT_TYPE};

/// Everything an [`Environment`] is built from.
pub struct EnvironmentConfig {
    network: Arc<dyn Network>,
    store: Arc<Store>,
    handler_provider: Option<Arc<dyn HandlerProvider>>,
    scheduler: Option<Arc<dyn TaskScheduler>>,
    get_data_id: Option<Arc<GetDataId>>,
    incremental_delivery: bool,
    id_field: String,
}

impl EnvironmentConfig {
    pub fn new(network: Arc<dyn Network>, store: Arc<Store>) -> Self {
        Self {
            network,
            store,
            handler_provider: None,
            scheduler: None,
            get_data_id: None,
            incremental_delivery: true,
            id_field: "id".to_owned(),
        }
    }

    pub fn handler_provider(mut self, provider: Arc<dyn HandlerProvider>) -> Self {
        self.handler_provider = Some(provider);
        self
    }

    /// Runs each publish as a scheduled task instead of inline.
    pub fn scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn get_data_id<F>(mut self, get_data_id: F) -> Self
    where
        F: Fn(&Map<String, Value>, Option<&str>) -> Option<DataId> + Send + Sync + 'static,
    {
        self.get_data_id = Some(Arc::new(get_data_id));
        self
    }

    /// When disabled, deferred and streamed selections arrive inline.
    pub fn incremental_delivery(mut self, enabled: bool) -> Self {
        self.incremental_delivery = enabled;
        self
    }

    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }
}

pub struct Environment {
    network: Arc<dyn Network>,
    store: Arc<Store>,
    handler_provider: Option<Arc<dyn HandlerProvider>>,
    scheduler: Option<Arc<dyn TaskScheduler>>,
    options: NormalizationOptions,
}

impl Environment {
    pub fn new(config: EnvironmentConfig) -> Arc<Self> {
        let options = NormalizationOptions {
            get_data_id: config.get_data_id,
            id_field: config.id_field,
            schema: config.store.schema().cloned(),
            incremental_delivery: config.incremental_delivery,
        };
        Arc::new(Self {
            network: config.network,
            store: config.store,
            handler_provider: config.handler_provider,
            scheduler: config.scheduler,
            options,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn lookup(&self, selector: &Selector) -> Snapshot {
        self.store.lookup(selector)
    }

    pub fn subscribe(
        &self,
        snapshot: Snapshot,
        callback: impl Fn(&Snapshot) + Send + Sync + 'static,
    ) -> Disposable {
        self.store.subscribe(snapshot, callback)
    }

    pub fn retain(&self, operation: &OperationDescriptor) -> Disposable {
        self.store.retain(operation)
    }

    /// Fetches `operation` and publishes every response it produces.
    ///
    /// Nothing happens until the returned observable is subscribed. Each
    /// response is emitted after its publish and notify; unsubscribing cancels
    /// scheduled publishes and the network request.
    pub fn execute(
        self: &Arc<Self>,
        operation: &OperationDescriptor,
        cache_config: CacheConfig,
    ) -> Observable<Response> {
        let environment = self.clone();
        let operation = operation.clone();
        Observable::create(move |sink| {
            let executor = Executor::start(environment, operation, cache_config, sink);
            Some(Box::new(move || executor.cancel()) as Teardown)
        })
    }

    /// Applies an optimistic update and notifies subscribers.
    pub fn commit_update<F>(&self, updater: F) -> OptimisticUpdate
    where
        F: FnOnce(&mut RecordSourceMutator<'_>),
    {
        let overlay = self.store.apply_update(updater);
        self.store.notify();
        OptimisticUpdate {
            store: self.store.clone(),
            overlay,
            settled: AtomicBool::new(false),
        }
    }

    /// Normalizes `data` for `operation` and publishes it without a network
    /// round trip. Deferred and streamed selections are read inline.
    pub fn commit_payload(&self, operation: &OperationDescriptor, data: Value) -> Result<()> {
        let Value::Object(object) = &data else {
            return Err(CacheError::invalid_payload("payload data is not an object"));
        };
        let options = NormalizationOptions {
            incremental_delivery: false,
            ..self.options.clone()
        };
        let mut batch = MutationBatch::new();
        let normalized = normalize(
            &mut batch,
            &DataId::root(),
            Some(ROOT_TYPE),
            object,
            &operation.request.selections,
            &operation.variables,
            &[],
            &options,
        )?;
        self.apply_handlers(&normalized.handles, &mut batch)?;
        debug!(
            operation = operation.name(),
            records = batch.len(),
            "environment.commit_payload"
        );
        self.store.publish(batch);
        self.store.notify();
        Ok(())
    }

    pub(crate) fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    pub(crate) fn scheduler(&self) -> Option<&Arc<dyn TaskScheduler>> {
        self.scheduler.as_ref()
    }

    pub(crate) fn normalization_options(&self) -> &NormalizationOptions {
        &self.options
    }

    /// Runs the handler of every handle-bound field against `batch`.
    ///
    /// Handlers read the canonical source only, never optimistic overlays.
    pub(crate) fn apply_handlers(
        &self,
        handles: &[HandleFieldPayload],
        batch: &mut MutationBatch,
    ) -> Result<()> {
        if handles.is_empty() {
            return Ok(());
        }
        let provider = self.handler_provider.as_deref();
        self.store.with_canonical_view(|view| -> Result<()> {
            let mut mutator = RecordSourceMutator::new(view, batch);
            for payload in handles {
                let handler = provider
                    .and_then(|provider| provider.get(&payload.handle))
                    .ok_or_else(|| CacheError::MissingHandler {
                        handle: payload.handle.clone(),
                    })?;
                handler.update(&mut mutator, payload);
            }
            Ok(())
        })?;
        batch.settle_list_handles();
        Ok(())
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("revision", &self.store.revision())
            .field("scheduled", &self.scheduler.is_some())
            .field("incremental_delivery", &self.options.incremental_delivery)
            .finish()
    }
}

/// Handle to an applied optimistic update.
///
/// Dropping it leaves the overlay in place; settle it with
/// [`OptimisticUpdate::revert`] or [`OptimisticUpdate::commit`].
pub struct OptimisticUpdate {
    store: Arc<Store>,
    overlay: OverlayId,
    settled: AtomicBool,
}

impl OptimisticUpdate {
    pub fn id(&self) -> OverlayId {
        self.overlay
    }

    /// Removes the overlay and notifies. Returns `false` if already settled.
    pub fn revert(&self) -> bool {
        if self.settled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let reverted = self.store.revert_update(self.overlay);
        self.store.notify();
        reverted
    }

    /// Publishes the overlay's writes into the canonical source.
    pub fn commit(&self) -> bool {
        if self.settled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let committed = self.store.commit_update(self.overlay);
        self.store.notify();
        committed
    }
}
