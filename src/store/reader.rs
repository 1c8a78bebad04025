use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tracing::warn;

use super::record::{FieldValue, ListItem, Record, RecordLookup, Version};
use super::source::RecordSourceView;
use crate::schema::{type_condition_applies, Schema};
use crate::selection::{condition_passes, LinkedField, ScalarField, Selection, Selector};
use crate::types::{DataId, Variables};

/// Materialized value of a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub enum Data {
    /// Not available: missing field, unknown record or list hole.
    Undefined,
    /// Scalar value or `null`.
    Value(Value),
    Object(BTreeMap<String, Data>),
    List(Vec<Data>),
}

impl Data {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Data::Undefined)
    }

    /// Field of an object; `None` for non-objects and absent keys.
    pub fn get(&self, key: &str) -> Option<&Data> {
        match self {
            Data::Object(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Element of a list.
    pub fn index(&self, index: usize) -> Option<&Data> {
        match self {
            Data::List(items) => items.get(index),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Data::Value(value) => Some(value),
            _ => None,
        }
    }

    /// JSON rendering: undefined object fields are omitted, undefined list
    /// elements become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Data::Undefined => Value::Null,
            Data::Value(value) => value.clone(),
            Data::Object(fields) => {
                let mut map = Map::new();
                for (key, value) in fields {
                    if !value.is_undefined() {
                        map.insert(key.clone(), value.to_json());
                    }
                }
                Value::Object(map)
            }
            Data::List(items) => Value::Array(items.iter().map(Data::to_json).collect()),
        }
    }
}

/// Result of evaluating a selector against a record source.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub selector: Selector,
    pub data: Data,
    pub is_missing_data: bool,
    /// Every record visited with the version seen; `0` for records never written.
    pub seen_records: FxHashMap<DataId, Version>,
}

/// Evaluates `selector` against `source`.
pub fn read(source: &dyn RecordSourceView, selector: &Selector, schema: Option<&Schema>) -> Snapshot {
    let mut reader = Reader {
        source,
        schema,
        variables: &selector.variables,
        is_missing_data: false,
        seen_records: FxHashMap::default(),
    };
    let data = reader.read_record(&selector.data_id, &selector.selections);
    Snapshot {
        selector: selector.clone(),
        data,
        is_missing_data: reader.is_missing_data,
        seen_records: reader.seen_records,
    }
}

struct Reader<'a> {
    source: &'a dyn RecordSourceView,
    schema: Option<&'a Schema>,
    variables: &'a Variables,
    is_missing_data: bool,
    seen_records: FxHashMap<DataId, Version>,
}

impl<'a> Reader<'a> {
    fn read_record(&mut self, id: &DataId, selections: &[Selection]) -> Data {
        self.seen_records
            .insert(id.clone(), self.source.version(id).unwrap_or(0));
        let source = self.source;
        match source.get(id) {
            RecordLookup::Existent(record) => {
                let mut fields = BTreeMap::new();
                self.read_selections(record, selections, &mut fields);
                Data::Object(fields)
            }
            RecordLookup::Nonexistent => Data::Value(Value::Null),
            RecordLookup::Unknown => {
                self.is_missing_data = true;
                Data::Undefined
            }
        }
    }

    fn read_selections(
        &mut self,
        record: &'a Record,
        selections: &[Selection],
        out: &mut BTreeMap<String, Data>,
    ) {
        for selection in selections {
            match selection {
                Selection::ScalarField(field) => {
                    let value = self.read_scalar(record, field);
                    insert_merged(out, field.response_key(), value);
                }
                Selection::LinkedField(field) => {
                    let value = self.read_linked(record, field);
                    insert_merged(out, field.response_key(), value);
                }
                Selection::Stream(stream) => {
                    let value = self.read_linked(record, &stream.field);
                    insert_merged(out, stream.field.response_key(), value);
                }
                Selection::Defer(defer) => self.read_selections(record, &defer.selections, out),
                Selection::InlineFragment(fragment) => {
                    if type_condition_applies(self.schema, record.typename(), &fragment.type_condition) {
                        self.read_selections(record, &fragment.selections, out);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let fragment = &spread.fragment;
                    if type_condition_applies(self.schema, record.typename(), &fragment.type_condition) {
                        self.read_selections(record, &fragment.selections, out);
                    }
                }
                Selection::Condition(condition) => {
                    if condition_passes(condition, self.variables) {
                        self.read_selections(record, &condition.selections, out);
                    }
                }
            }
        }
    }

    fn read_scalar(&mut self, record: &Record, field: &ScalarField) -> Data {
        let key = field.read_key(self.variables);
        match record.get(&key) {
            Some(FieldValue::Scalar(value)) => Data::Value(value.clone()),
            Some(_) => {
                warn!(id = %record.id(), key = %key, "reader.scalar.link_found");
                self.is_missing_data = true;
                Data::Undefined
            }
            None => {
                self.is_missing_data = true;
                Data::Undefined
            }
        }
    }

    fn read_linked(&mut self, record: &Record, field: &LinkedField) -> Data {
        let key = field.read_key(self.variables);
        match (record.get(&key), field.plural) {
            (None, _) => {
                self.is_missing_data = true;
                Data::Undefined
            }
            (Some(FieldValue::Scalar(Value::Null)), _) => Data::Value(Value::Null),
            (Some(FieldValue::Link(target)), false) => self.read_record(target, &field.selections),
            (Some(FieldValue::Links(items)), true) => {
                let list = items
                    .iter()
                    .map(|item| match item {
                        ListItem::Link(target) => self.read_record(target, &field.selections),
                        ListItem::Null => Data::Value(Value::Null),
                        ListItem::Hole => Data::Undefined,
                    })
                    .collect();
                Data::List(list)
            }
            (Some(_), plural) => {
                warn!(id = %record.id(), key = %key, plural, "reader.linked.kind_mismatch");
                self.is_missing_data = true;
                Data::Undefined
            }
        }
    }
}

/// Inserts a field value, merging object values selected more than once.
fn insert_merged(out: &mut BTreeMap<String, Data>, key: &str, value: Data) {
    match out.get_mut(key) {
        Some(existing) => merge_data(existing, value),
        None => {
            out.insert(key.to_owned(), value);
        }
    }
}

fn merge_data(existing: &mut Data, incoming: Data) {
    match (existing, incoming) {
        (Data::Object(current), Data::Object(fields)) => {
            for (key, value) in fields {
                insert_merged(current, &key, value);
            }
        }
        (Data::List(current), Data::List(items)) if current.len() == items.len() => {
            for (slot, item) in current.iter_mut().zip(items) {
                merge_data(slot, item);
            }
        }
        (slot, incoming) => {
            if slot.is_undefined() {
                *slot = incoming;
            }
        }
    }
}
