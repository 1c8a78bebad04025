use serde_json::Value;

use super::record::{FieldValue, ListItem, RecordLookup, TYPENAME_KEY};
use super::source::{MutationBatch, RecordPatch, RecordSourceView};
use crate::types::DataId;

/// Scoped read-write view: reads see `sink` over `base`, writes go to `sink`.
///
/// Handed to field handlers and optimistic updaters; never outlives the call.
pub struct RecordSourceMutator<'a> {
    base: &'a dyn RecordSourceView,
    sink: &'a mut MutationBatch,
}

impl<'a> RecordSourceMutator<'a> {
    pub fn new(base: &'a dyn RecordSourceView, sink: &'a mut MutationBatch) -> Self {
        Self { base, sink }
    }

    /// Returns `true` when the record exists in the combined view.
    pub fn exists(&self, id: &DataId) -> bool {
        match self.sink.patch(id) {
            Some(RecordPatch::Delete) => false,
            Some(_) => true,
            None => matches!(self.base.get(id), RecordLookup::Existent(_)),
        }
    }

    /// Reads the raw field value at `key`, including pending list relinks.
    pub fn get_field(&self, id: &DataId, key: &str) -> Option<FieldValue> {
        if let Some(items) = self.sink.pending_list(id, key) {
            return Some(FieldValue::Links(items.to_vec()));
        }
        match self.sink.patch(id) {
            Some(RecordPatch::Delete) => None,
            Some(RecordPatch::Replace(record)) => record.get(key).cloned(),
            Some(RecordPatch::Merge(record)) => match record.get(key) {
                Some(value) => Some(value.clone()),
                None => self.base_field(id, key),
            },
            None => self.base_field(id, key),
        }
    }

    fn base_field(&self, id: &DataId, key: &str) -> Option<FieldValue> {
        self.base.get(id).record().and_then(|r| r.get(key).cloned())
    }

    pub fn get_value(&self, id: &DataId, key: &str) -> Option<Value> {
        match self.get_field(id, key)? {
            FieldValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn get_type(&self, id: &DataId) -> Option<String> {
        match self.get_value(id, TYPENAME_KEY)? {
            Value::String(name) => Some(name),
            _ => None,
        }
    }

    pub fn get_linked_record_id(&self, id: &DataId, key: &str) -> Option<DataId> {
        match self.get_field(id, key)? {
            FieldValue::Link(target) => Some(target),
            _ => None,
        }
    }

    /// Linked ids of a plural field; `None` entries are nulls or holes.
    pub fn get_linked_record_ids(&self, id: &DataId, key: &str) -> Option<Vec<Option<DataId>>> {
        match self.get_field(id, key)? {
            FieldValue::Links(items) => Some(
                items
                    .into_iter()
                    .map(|item| match item {
                        ListItem::Link(id) => Some(id),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Creates (or resets) a record.
    pub fn create(&mut self, id: &DataId, typename: &str) {
        self.sink.create(id, Some(typename));
    }

    pub fn delete(&mut self, id: &DataId) {
        self.sink.delete(id);
    }

    pub fn set_value(&mut self, id: &DataId, key: &str, value: Value) {
        self.sink.set_field(id, key, FieldValue::Scalar(value));
    }

    pub fn set_linked_record(&mut self, id: &DataId, key: &str, target: &DataId) {
        self.sink.set_field(id, key, FieldValue::Link(target.clone()));
    }

    pub fn set_linked_records(&mut self, id: &DataId, key: &str, targets: Vec<Option<DataId>>) {
        let items = targets
            .into_iter()
            .map(|target| target.map_or(ListItem::Null, ListItem::Link))
            .collect();
        self.sink.set_field(id, key, FieldValue::Links(items));
    }

    /// Convenience accessor bound to one record.
    pub fn record(&mut self, id: &DataId) -> RecordProxy<'_, 'a> {
        RecordProxy {
            mutator: self,
            id: id.clone(),
        }
    }
}

/// Handle on one record of a [`RecordSourceMutator`].
pub struct RecordProxy<'m, 'a> {
    mutator: &'m mut RecordSourceMutator<'a>,
    id: DataId,
}

impl RecordProxy<'_, '_> {
    pub fn id(&self) -> &DataId {
        &self.id
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.mutator.get_value(&self.id, key)
    }

    pub fn set_value(&mut self, key: &str, value: Value) -> &mut Self {
        self.mutator.set_value(&self.id, key, value);
        self
    }

    pub fn set_linked_record(&mut self, key: &str, target: &DataId) -> &mut Self {
        self.mutator.set_linked_record(&self.id, key, target);
        self
    }
}
