use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::types::DataId;

/// Per-record version stamp; bumped to the publishing revision on every write.
pub type Version = u64;

/// Storage key of the typename field every record carries when known.
pub const TYPENAME_KEY: &str = "__typename";

/// One slot of a plural link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListItem {
    /// Link to another record.
    Link(DataId),
    /// Confirmed `null` element.
    Null,
    /// Element not delivered yet (streamed lists only).
    Hole,
}

impl ListItem {
    /// Returns the linked id, if any.
    pub fn as_link(&self) -> Option<&DataId> {
        match self {
            ListItem::Link(id) => Some(id),
            _ => None,
        }
    }
}

/// Value stored under one storage key.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// Scalar value; `null` also stands for a null link.
    Scalar(Value),
    /// Singular link.
    Link(DataId),
    /// Plural link, order and length preserved.
    Links(Vec<ListItem>),
}

impl FieldValue {
    fn to_json(&self) -> Value {
        match self {
            FieldValue::Scalar(value) => value.clone(),
            FieldValue::Link(id) => serde_json::json!({ "__ref": id.as_str() }),
            FieldValue::Links(items) => {
                let refs: Vec<Value> = items
                    .iter()
                    .map(|item| match item {
                        ListItem::Link(id) => Value::String(id.as_str().to_owned()),
                        ListItem::Null => Value::Null,
                        ListItem::Hole => Value::String("<hole>".to_owned()),
                    })
                    .collect();
                serde_json::json!({ "__refs": refs })
            }
        }
    }
}

/// Field map stored for one entity.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    id: DataId,
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: DataId) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Creates a record with its `__typename` set.
    pub fn with_typename(id: DataId, typename: Option<&str>) -> Self {
        let mut record = Self::new(id);
        if let Some(typename) = typename {
            record.set(TYPENAME_KEY, FieldValue::Scalar(Value::String(typename.to_owned())));
        }
        record
    }

    pub fn id(&self) -> &DataId {
        &self.id
    }

    pub fn typename(&self) -> Option<&str> {
        match self.fields.get(TYPENAME_KEY) {
            Some(FieldValue::Scalar(Value::String(name))) => Some(name),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    /// Iterates over `(storage key, value)` pairs in key order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Overwrites this record's fields with every field of `other`.
    pub fn merge(&mut self, other: &Record) {
        for (key, value) in &other.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// Debug dump: links as `{"__ref": id}`, lists as `{"__refs": [...]}`.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("__id".to_owned(), Value::String(self.id.as_str().to_owned()));
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.to_json());
        }
        Value::Object(map)
    }
}

/// Result of looking a record up in a source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RecordLookup<'a> {
    Existent(&'a Record),
    /// Known to be deleted.
    Nonexistent,
    /// Never fetched.
    Unknown,
}

impl<'a> RecordLookup<'a> {
    pub fn record(self) -> Option<&'a Record> {
        match self {
            RecordLookup::Existent(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, RecordLookup::Unknown)
    }
}
