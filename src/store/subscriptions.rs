use std::collections::BTreeMap;
use std::sync::Arc;

use super::reader::{read, Snapshot};
use super::source::RecordSourceView;
use crate::schema::Schema;
use crate::selection::Selector;

/// Callback invoked with the new snapshot when a subscription's data changes.
pub type SnapshotCallback = dyn Fn(&Snapshot) + Send + Sync;

/// Identifier of a registered subscription.
pub(crate) type SubscriptionId = u64;

struct SubscriptionEntry {
    snapshot: Snapshot,
    callback: Arc<SnapshotCallback>,
}

/// Callback due after a notify pass, invoked outside the store lock.
pub(crate) struct PendingCallback {
    pub(crate) callback: Arc<SnapshotCallback>,
    pub(crate) snapshot: Snapshot,
}

impl PendingCallback {
    pub(crate) fn fire(self) {
        (self.callback)(&self.snapshot);
    }
}

/// Counts gathered by one notify pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct NotifyStats {
    pub(crate) stale: usize,
    pub(crate) fired: usize,
}

/// Active subscriptions in registration order.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    entries: BTreeMap<SubscriptionId, SubscriptionEntry>,
    next_id: SubscriptionId,
}

impl SubscriptionRegistry {
    pub(crate) fn add(&mut self, snapshot: Snapshot, callback: Arc<SnapshotCallback>) -> SubscriptionId {
        self.next_id += 1;
        self.entries
            .insert(self.next_id, SubscriptionEntry { snapshot, callback });
        self.next_id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn selectors(&self) -> impl Iterator<Item = &Selector> {
        self.entries.values().map(|entry| &entry.snapshot.selector)
    }

    /// Re-reads every subscription whose seen records changed version and
    /// returns the callbacks whose data actually changed.
    ///
    /// Retained snapshots are refreshed even when the data compares equal, so
    /// the next version check starts from the latest stamps.
    pub(crate) fn update(
        &mut self,
        view: &dyn RecordSourceView,
        schema: Option<&Schema>,
    ) -> (Vec<PendingCallback>, NotifyStats) {
        let mut due = Vec::new();
        let mut stats = NotifyStats::default();
        for entry in self.entries.values_mut() {
            if !has_stale_records(&entry.snapshot, view) {
                continue;
            }
            stats.stale += 1;
            let next = read(view, &entry.snapshot.selector, schema);
            let changed = next.data != entry.snapshot.data
                || next.is_missing_data != entry.snapshot.is_missing_data;
            entry.snapshot = next;
            if changed {
                stats.fired += 1;
                due.push(PendingCallback {
                    callback: entry.callback.clone(),
                    snapshot: entry.snapshot.clone(),
                });
            }
        }
        (due, stats)
    }
}

fn has_stale_records(snapshot: &Snapshot, view: &dyn RecordSourceView) -> bool {
    snapshot
        .seen_records
        .iter()
        .any(|(id, seen)| view.version(id).unwrap_or(0) != *seen)
}
