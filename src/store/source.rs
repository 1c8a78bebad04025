use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tracing::debug;

use super::record::{FieldValue, ListItem, Record, RecordLookup, Version};
use crate::types::DataId;

/// Read access to a record source with version stamps.
pub trait RecordSourceView {
    /// Looks a record up.
    fn get(&self, id: &DataId) -> RecordLookup<'_>;

    /// Version of the entry for `id`, if any entry (existent or deleted) exists.
    fn version(&self, id: &DataId) -> Option<Version>;
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Slot {
    Existent(Record),
    Nonexistent,
}

impl Slot {
    pub(crate) fn lookup(&self) -> RecordLookup<'_> {
        match self {
            Slot::Existent(record) => RecordLookup::Existent(record),
            Slot::Nonexistent => RecordLookup::Nonexistent,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Entry {
    pub(crate) slot: Slot,
    pub(crate) version: Version,
}

/// Write to one record inside a [`MutationBatch`].
#[derive(Clone, Debug, PartialEq)]
pub enum RecordPatch {
    /// Field-level writes merged over the current record (creating it if absent).
    Merge(Record),
    /// Whole-record replacement.
    Replace(Record),
    /// Marks the record deleted.
    Delete,
}

impl RecordPatch {
    pub(crate) fn record(&self) -> Option<&Record> {
        match self {
            RecordPatch::Merge(record) | RecordPatch::Replace(record) => Some(record),
            RecordPatch::Delete => None,
        }
    }
}

/// Applies a patch to the current slot of a record.
pub(crate) fn apply_patch(current: Option<Slot>, patch: RecordPatch) -> Slot {
    match patch {
        RecordPatch::Merge(fields) => match current {
            Some(Slot::Existent(mut record)) => {
                record.merge(&fields);
                Slot::Existent(record)
            }
            _ => Slot::Existent(fields),
        },
        RecordPatch::Replace(record) => Slot::Existent(record),
        RecordPatch::Delete => Slot::Nonexistent,
    }
}

/// Conditional relink of a streamed item into its parent list.
///
/// Applied only when the parent list in the canonical source still equals
/// `expected`; otherwise the parent is left untouched. A handle-bound field
/// carries its derived value along so both keys move together.
#[derive(Clone, Debug, PartialEq)]
pub struct ListItemUpdate {
    pub parent: DataId,
    pub storage_key: String,
    pub expected: Vec<ListItem>,
    pub next: Vec<ListItem>,
    /// Handle key of the streamed field, when it has a handle.
    pub handle_key: Option<String>,
    /// Value the handler derived for `handle_key`.
    pub derived: Option<FieldValue>,
}

/// Set of record writes published atomically.
#[derive(Clone, Debug, Default)]
pub struct MutationBatch {
    patches: FxHashMap<DataId, RecordPatch>,
    list_updates: Vec<ListItemUpdate>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure a patch exists for `id`, recording its typename when known.
    pub fn ensure(&mut self, id: &DataId, typename: Option<&str>) {
        match self.patches.get_mut(id) {
            Some(RecordPatch::Merge(record)) | Some(RecordPatch::Replace(record)) => {
                if record.typename().is_none() {
                    if let Some(typename) = typename {
                        record.set(
                            super::record::TYPENAME_KEY,
                            FieldValue::Scalar(Value::String(typename.to_owned())),
                        );
                    }
                }
            }
            Some(patch @ RecordPatch::Delete) => {
                *patch = RecordPatch::Replace(Record::with_typename(id.clone(), typename));
            }
            None => {
                self.patches.insert(
                    id.clone(),
                    RecordPatch::Merge(Record::with_typename(id.clone(), typename)),
                );
            }
        }
    }

    /// Records a field write.
    pub fn set_field(&mut self, id: &DataId, key: impl Into<String>, value: FieldValue) {
        match self.patches.get_mut(id) {
            Some(RecordPatch::Merge(record)) | Some(RecordPatch::Replace(record)) => {
                record.set(key, value);
            }
            Some(patch @ RecordPatch::Delete) => {
                let mut record = Record::new(id.clone());
                record.set(key, value);
                *patch = RecordPatch::Replace(record);
            }
            None => {
                let mut record = Record::new(id.clone());
                record.set(key, value);
                self.patches.insert(id.clone(), RecordPatch::Merge(record));
            }
        }
    }

    /// Replaces the record with an empty one carrying only its typename.
    pub fn create(&mut self, id: &DataId, typename: Option<&str>) {
        self.patches.insert(
            id.clone(),
            RecordPatch::Replace(Record::with_typename(id.clone(), typename)),
        );
    }

    pub fn delete(&mut self, id: &DataId) {
        self.patches.insert(id.clone(), RecordPatch::Delete);
    }

    pub fn push_list_update(&mut self, update: ListItemUpdate) {
        self.list_updates.push(update);
    }

    /// Appends every write of `other`; later writes win per field.
    pub fn merge(&mut self, other: MutationBatch) {
        for (id, patch) in other.patches {
            match patch {
                RecordPatch::Merge(record) => {
                    for (key, value) in record.fields() {
                        self.set_field(&id, key, value.clone());
                    }
                    self.ensure(&id, record.typename());
                }
                other => {
                    self.patches.insert(id, other);
                }
            }
        }
        self.list_updates.extend(other.list_updates);
    }

    pub fn patch(&self, id: &DataId) -> Option<&RecordPatch> {
        self.patches.get(id)
    }

    pub fn patches(&self) -> impl Iterator<Item = (&DataId, &RecordPatch)> {
        self.patches.iter()
    }

    pub fn list_updates(&self) -> &[ListItemUpdate] {
        &self.list_updates
    }

    /// List a pending relink will write at `(id, key)`, if any.
    pub fn pending_list(&self, id: &DataId, key: &str) -> Option<&[ListItem]> {
        self.list_updates
            .iter()
            .rev()
            .find(|update| update.parent == *id && update.storage_key == key)
            .map(|update| update.next.as_slice())
    }

    /// Moves handler writes to the handle keys of relinked lists into their
    /// updates, so they apply only when the relink does.
    pub fn settle_list_handles(&mut self) {
        for update in &mut self.list_updates {
            let Some(handle_key) = update.handle_key.as_deref() else {
                continue;
            };
            let Some(RecordPatch::Merge(record)) = self.patches.get_mut(&update.parent) else {
                continue;
            };
            if let Some(value) = record.remove(handle_key) {
                update.derived = Some(value);
            }
            if record.is_empty() {
                self.patches.remove(&update.parent);
            }
        }
    }

    /// Number of records written.
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty() && self.list_updates.is_empty()
    }

    pub(crate) fn into_parts(self) -> (FxHashMap<DataId, RecordPatch>, Vec<ListItemUpdate>) {
        (self.patches, self.list_updates)
    }
}

/// Outcome of applying a batch to the canonical source.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Ids whose entries were written, in no particular order.
    pub touched: Vec<DataId>,
    /// List relinks skipped because the parent diverged.
    pub diverged: usize,
}

/// Canonical `DataId -> Record` mapping owned by the store.
#[derive(Clone, Debug, Default)]
pub struct RecordSource {
    records: FxHashMap<DataId, Entry>,
}

impl RecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, deleted markers included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &DataId> {
        self.records.keys()
    }

    pub(crate) fn slot(&self, id: &DataId) -> Option<&Slot> {
        self.records.get(id).map(|entry| &entry.slot)
    }

    pub(crate) fn remove(&mut self, id: &DataId) -> bool {
        self.records.remove(id).is_some()
    }

    /// Applies a whole batch, stamping every written entry with `revision`.
    pub fn apply(&mut self, batch: MutationBatch, revision: Version) -> ApplyOutcome {
        let (patches, list_updates) = batch.into_parts();
        let mut outcome = ApplyOutcome::default();
        for (id, patch) in patches {
            let current = self.records.remove(&id).map(|entry| entry.slot);
            let slot = apply_patch(current, patch);
            self.records.insert(
                id.clone(),
                Entry {
                    slot,
                    version: revision,
                },
            );
            outcome.touched.push(id);
        }
        for update in list_updates {
            let Some(entry) = self.records.get_mut(&update.parent) else {
                debug!(parent = %update.parent, key = %update.storage_key, "matcher.stream.parent_diverged");
                outcome.diverged += 1;
                continue;
            };
            let Slot::Existent(parent) = &mut entry.slot else {
                debug!(parent = %update.parent, key = %update.storage_key, "matcher.stream.parent_diverged");
                outcome.diverged += 1;
                continue;
            };
            let current_matches = matches!(
                parent.get(&update.storage_key),
                Some(FieldValue::Links(items)) if *items == update.expected
            );
            if !current_matches {
                debug!(parent = %update.parent, key = %update.storage_key, "matcher.stream.parent_diverged");
                outcome.diverged += 1;
                continue;
            }
            parent.set(update.storage_key, FieldValue::Links(update.next));
            if let (Some(handle_key), Some(derived)) = (update.handle_key, update.derived) {
                parent.set(handle_key, derived);
            }
            entry.version = revision;
            outcome.touched.push(update.parent);
        }
        outcome
    }

    /// Debug dump of every entry keyed by id; deleted records map to `null`.
    pub fn to_json(&self) -> Value {
        let mut ids: Vec<&DataId> = self.records.keys().collect();
        ids.sort();
        let mut map = Map::new();
        for id in ids {
            let value = match &self.records[id].slot {
                Slot::Existent(record) => record.to_json(),
                Slot::Nonexistent => Value::Null,
            };
            map.insert(id.as_str().to_owned(), value);
        }
        Value::Object(map)
    }
}

impl RecordSourceView for RecordSource {
    fn get(&self, id: &DataId) -> RecordLookup<'_> {
        match self.records.get(id) {
            Some(entry) => entry.slot.lookup(),
            None => RecordLookup::Unknown,
        }
    }

    fn version(&self, id: &DataId) -> Option<Version> {
        self.records.get(id).map(|entry| entry.version)
    }
}
