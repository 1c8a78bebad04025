use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, trace};

use super::gc::{self, GcStats};
use super::metrics::{default_metrics, StoreMetrics};
use super::mutator::RecordSourceMutator;
use super::optimistic::{EffectiveSource, OptimisticLayer, OverlayId};
use super::options::StoreOptions;
use super::reader::{read, Snapshot};
use super::record::Version;
use super::source::{MutationBatch, RecordSource, RecordSourceView};
use super::subscriptions::{SubscriptionRegistry, PendingCallback};
use crate::primitives::disposable::Disposable;
use crate::primitives::scheduler::TaskToken;
use crate::schema::Schema;
use crate::selection::{OperationDescriptor, Selector};
use crate::types::DataId;

struct RetainedRoot {
    selector: Selector,
    count: usize,
}

#[derive(Default)]
struct GcState {
    holds: usize,
    scheduled: bool,
    deferred: bool,
    token: Option<TaskToken>,
}

struct StoreInner {
    source: RecordSource,
    optimistic: OptimisticLayer,
    subscriptions: SubscriptionRegistry,
    roots: FxHashMap<String, RetainedRoot>,
    revision: Version,
    gc: GcState,
}

impl StoreInner {
    fn view(&self) -> EffectiveSource<'_> {
        EffectiveSource {
            canonical: &self.source,
            optimistic: &self.optimistic,
        }
    }

    fn next_revision(&mut self) -> Version {
        self.revision += 1;
        self.revision
    }

    /// Re-merges overlay entries for canonical ids that just changed.
    fn refresh_shadowed(&mut self, touched: &[DataId], revision: Version) {
        if self.optimistic.is_empty() {
            return;
        }
        let shadowed: Vec<DataId> = touched
            .iter()
            .filter(|id| self.optimistic.contains(id))
            .cloned()
            .collect();
        self.optimistic
            .refresh(shadowed.iter(), &self.source, revision);
    }
}

/// Owner of the canonical record source.
///
/// All writes go through [`Store::publish`] as whole batches under one lock,
/// so readers never observe a partially applied batch. Subscription callbacks
/// and scheduled collection run outside the lock.
pub struct Store {
    inner: Mutex<StoreInner>,
    options: StoreOptions,
    metrics: Arc<dyn StoreMetrics>,
    this: Weak<Store>,
}

impl Store {
    pub fn new(options: StoreOptions) -> Arc<Self> {
        let metrics = options.metrics.clone().unwrap_or_else(default_metrics);
        Arc::new_cyclic(|this| Store {
            inner: Mutex::new(StoreInner {
                source: RecordSource::new(),
                optimistic: OptimisticLayer::default(),
                subscriptions: SubscriptionRegistry::default(),
                roots: FxHashMap::default(),
                revision: 0,
                gc: GcState::default(),
            }),
            options,
            metrics,
            this: this.clone(),
        })
    }

    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.options.schema.as_ref()
    }

    pub fn metrics(&self) -> &Arc<dyn StoreMetrics> {
        &self.metrics
    }

    /// Global revision, advanced by every publish and overlay change.
    pub fn revision(&self) -> Version {
        self.inner.lock().revision
    }

    /// Number of canonical entries, deleted markers included.
    pub fn record_count(&self) -> usize {
        self.inner.lock().source.len()
    }

    /// Number of active optimistic overlays.
    pub fn optimistic_updates(&self) -> usize {
        self.inner.lock().optimistic.len()
    }

    /// Number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    /// Reads `selector` against the effective (canonical plus overlays) source.
    pub fn lookup(&self, selector: &Selector) -> Snapshot {
        let inner = self.inner.lock();
        read(&inner.view(), selector, self.options.schema.as_deref())
    }

    /// Runs `f` with a read view of the effective source.
    ///
    /// The store is locked for the duration; `f` must not call back into it.
    pub fn with_view<R>(&self, f: impl FnOnce(&dyn RecordSourceView) -> R) -> R {
        let inner = self.inner.lock();
        f(&inner.view())
    }

    /// Runs `f` with a read view of the canonical source only, ignoring
    /// optimistic overlays. Same locking rules as [`Store::with_view`].
    pub fn with_canonical_view<R>(&self, f: impl FnOnce(&dyn RecordSourceView) -> R) -> R {
        let inner = self.inner.lock();
        f(&inner.source)
    }

    /// Debug dump of the canonical source.
    pub fn to_json(&self) -> Value {
        self.inner.lock().source.to_json()
    }

    /// Applies `batch` to the canonical source atomically and returns the new
    /// revision.
    pub fn publish(&self, batch: MutationBatch) -> Version {
        let records = batch.len();
        let mut inner = self.inner.lock();
        let revision = inner.next_revision();
        let outcome = inner.source.apply(batch, revision);
        inner.refresh_shadowed(&outcome.touched, revision);
        drop(inner);
        debug!(
            revision,
            records,
            diverged = outcome.diverged,
            "store.publish"
        );
        self.metrics.published(records);
        revision
    }

    /// Re-evaluates stale subscriptions and fires callbacks whose data changed.
    /// Returns the number of callbacks fired.
    pub fn notify(&self) -> usize {
        let (due, stats) = {
            let mut inner = self.inner.lock();
            let StoreInner {
                source,
                optimistic,
                subscriptions,
                ..
            } = &mut *inner;
            let view = EffectiveSource {
                canonical: source,
                optimistic,
            };
            subscriptions.update(&view, self.options.schema.as_deref())
        };
        trace!(stale = stats.stale, fired = stats.fired, "store.notify");
        self.metrics.notified(stats.fired);
        due.into_iter().for_each(PendingCallback::fire);
        stats.fired
    }

    /// Registers a subscription retaining `snapshot`.
    ///
    /// Disposing it also releases the subscription's selector as a GC root.
    pub fn subscribe(
        &self,
        snapshot: Snapshot,
        callback: impl Fn(&Snapshot) + Send + Sync + 'static,
    ) -> Disposable {
        let id = self
            .inner
            .lock()
            .subscriptions
            .add(snapshot, Arc::new(callback));
        let store = self.this.clone();
        Disposable::new(move || {
            if let Some(store) = store.upgrade() {
                let removed = store.inner.lock().subscriptions.remove(id);
                if removed {
                    store.schedule_gc();
                }
            }
        })
    }

    /// Holds `operation` as a GC root until the returned handle is disposed.
    pub fn retain(&self, operation: &OperationDescriptor) -> Disposable {
        let key = operation.identifier();
        {
            let mut inner = self.inner.lock();
            inner
                .roots
                .entry(key.clone())
                .or_insert_with(|| RetainedRoot {
                    selector: operation.root.clone(),
                    count: 0,
                })
                .count += 1;
        }
        let store = self.this.clone();
        Disposable::new(move || {
            if let Some(store) = store.upgrade() {
                store.release(&key);
            }
        })
    }

    fn release(&self, key: &str) {
        let released = {
            let mut inner = self.inner.lock();
            match inner.roots.get_mut(key) {
                Some(root) if root.count > 1 => {
                    root.count -= 1;
                    false
                }
                Some(_) => {
                    inner.roots.remove(key);
                    true
                }
                None => false,
            }
        };
        if released {
            self.schedule_gc();
        }
    }

    /// Pushes an optimistic overlay built by `updater`.
    ///
    /// The updater sees the effective source and runs under the store lock.
    pub fn apply_update<F>(&self, updater: F) -> OverlayId
    where
        F: FnOnce(&mut RecordSourceMutator<'_>),
    {
        let mut inner = self.inner.lock();
        let mut batch = MutationBatch::new();
        {
            let view = inner.view();
            let mut mutator = RecordSourceMutator::new(&view, &mut batch);
            updater(&mut mutator);
        }
        let records = batch.len();
        let revision = inner.next_revision();
        let StoreInner {
            source, optimistic, ..
        } = &mut *inner;
        let id = optimistic.push(batch, source, revision);
        debug!(overlay = id.0, records, revision, "store.optimistic.push");
        id
    }

    /// Removes an overlay without publishing it. Returns `false` if unknown.
    pub fn revert_update(&self, id: OverlayId) -> bool {
        let (removed, resume_gc) = {
            let mut inner = self.inner.lock();
            let revision = inner.next_revision();
            let StoreInner {
                source,
                optimistic,
                gc,
                ..
            } = &mut *inner;
            let removed = optimistic.remove(id, source, revision).is_some();
            (removed, removed && optimistic.is_empty() && gc.deferred)
        };
        if removed {
            debug!(overlay = id.0, "store.optimistic.revert");
        }
        if resume_gc {
            self.schedule_gc();
        }
        removed
    }

    /// Publishes an overlay's writes to the canonical source and removes it.
    pub fn commit_update(&self, id: OverlayId) -> bool {
        let (committed, resume_gc) = {
            let mut inner = self.inner.lock();
            let revision = inner.next_revision();
            let StoreInner {
                source,
                optimistic,
                ..
            } = &mut *inner;
            match optimistic.remove(id, source, revision) {
                Some(batch) => {
                    let records = batch.len();
                    let outcome = source.apply(batch, revision);
                    inner.refresh_shadowed(&outcome.touched, revision);
                    self.metrics.published(records);
                    (true, inner.optimistic.is_empty() && inner.gc.deferred)
                }
                None => (false, false),
            }
        };
        if committed {
            debug!(overlay = id.0, "store.optimistic.commit");
        }
        if resume_gc {
            self.schedule_gc();
        }
        committed
    }

    /// Runs mark-and-sweep now, unless a hold or an overlay defers it.
    pub fn collect_garbage(&self) -> GcStats {
        let stats = {
            let mut inner = self.inner.lock();
            if inner.gc.holds > 0 || !inner.optimistic.is_empty() {
                inner.gc.deferred = true;
                debug!(
                    holds = inner.gc.holds,
                    overlays = inner.optimistic.len(),
                    "store.gc.deferred"
                );
                return GcStats::deferred();
            }
            inner.gc.deferred = false;
            let StoreInner {
                source,
                roots,
                subscriptions,
                ..
            } = &mut *inner;
            let selectors = roots
                .values()
                .map(|root| &root.selector)
                .chain(subscriptions.selectors());
            let marked = gc::mark(source, selectors, self.options.schema.as_deref());
            let collected = gc::sweep(source, &marked);
            GcStats {
                marked: marked.len(),
                collected,
                deferred: false,
            }
        };
        self.metrics.collected(stats.collected);
        stats
    }

    /// Requests a debounced collection on the GC scheduler.
    ///
    /// Requests made while one is already scheduled are coalesced.
    pub fn schedule_gc(&self) {
        if !self.options.gc_enabled {
            return;
        }
        {
            let mut inner = self.inner.lock();
            if inner.gc.scheduled {
                return;
            }
            inner.gc.scheduled = true;
        }
        let store = self.this.clone();
        let token = self.options.gc_scheduler.schedule(Box::new(move || {
            if let Some(store) = store.upgrade() {
                store.run_scheduled_gc();
            }
        }));
        let mut inner = self.inner.lock();
        if inner.gc.scheduled {
            inner.gc.token = Some(token);
        }
    }

    fn run_scheduled_gc(&self) {
        {
            let mut inner = self.inner.lock();
            inner.gc.scheduled = false;
            inner.gc.token = None;
        }
        self.collect_garbage();
    }

    /// Defers collection until the returned guard is dropped.
    pub fn hold_gc(&self) -> GcHold {
        self.inner.lock().gc.holds += 1;
        GcHold {
            store: self.this.clone(),
        }
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Some(token) = self.inner.get_mut().gc.token.take() {
            self.options.gc_scheduler.cancel(token);
        }
    }
}

/// Guard returned by [`Store::hold_gc`].
pub struct GcHold {
    store: Weak<Store>,
}

impl Drop for GcHold {
    fn drop(&mut self) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        let resume = {
            let mut inner = store.inner.lock();
            inner.gc.holds = inner.gc.holds.saturating_sub(1);
            inner.gc.holds == 0 && inner.gc.deferred && inner.optimistic.is_empty()
        };
        if resume {
            store.schedule_gc();
        }
    }
}
