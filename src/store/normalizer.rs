use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use smallvec::SmallVec;
use tracing::trace;

use super::record::{FieldValue, ListItem, TYPENAME_KEY};
use super::source::MutationBatch;
use crate::error::{CacheError, Result};
use crate::schema::{type_condition_applies, Schema};
use crate::selection::{
    condition_passes, guard_enabled, handle_storage_key, Argument, FieldHandle, LinkedField,
    Selection,
};
use crate::types::{DataId, PathStep, Variables};

/// Identity override: `(response object, typename) -> id`.
pub type GetDataId = dyn Fn(&Map<String, Value>, Option<&str>) -> Option<DataId> + Send + Sync;

/// Knobs shared by every normalization of one environment.
#[derive(Clone)]
pub struct NormalizationOptions {
    pub get_data_id: Option<Arc<GetDataId>>,
    /// Response field carrying global identity.
    pub id_field: String,
    pub schema: Option<Arc<Schema>>,
    /// When `false`, defer and stream nodes are normalized inline.
    pub incremental_delivery: bool,
}

impl Default for NormalizationOptions {
    fn default() -> Self {
        Self {
            get_data_id: None,
            id_field: "id".to_owned(),
            schema: None,
            incremental_delivery: true,
        }
    }
}

impl NormalizationOptions {
    /// Identity of a response object: override, then the id field, then the
    /// path-derived client id.
    pub fn identify(
        &self,
        object: &Map<String, Value>,
        typename: Option<&str>,
        parent: &DataId,
        storage_key: &str,
        index: Option<usize>,
    ) -> DataId {
        self.identity(object, typename)
            .unwrap_or_else(|| DataId::client(parent, storage_key, index))
    }

    /// Stable identity only; `None` when the object has none.
    pub fn identity(&self, object: &Map<String, Value>, typename: Option<&str>) -> Option<DataId> {
        if let Some(get_data_id) = &self.get_data_id {
            if let Some(id) = get_data_id(object, typename) {
                return Some(id);
            }
        }
        match object.get(&self.id_field) {
            Some(Value::String(id)) => Some(DataId::new(id.clone())),
            Some(Value::Number(id)) => Some(DataId::new(id.to_string())),
            _ => None,
        }
    }
}

/// Typename of a response object, falling back to the field's concrete type.
pub(crate) fn response_typename<'v>(
    object: &'v Map<String, Value>,
    field: &'v LinkedField,
) -> Option<&'v str> {
    object
        .get(TYPENAME_KEY)
        .and_then(Value::as_str)
        .or(field.concrete_type.as_deref())
}

/// Input to a field handler, produced after normalizing a handle-bound field.
#[derive(Clone, Debug, PartialEq)]
pub struct HandleFieldPayload {
    /// Record owning the field.
    pub data_id: DataId,
    /// Storage key of the raw server value.
    pub field_key: String,
    /// Storage key the handler should write its derived value to.
    pub handle_key: String,
    pub handle: String,
    pub args: BTreeMap<String, Value>,
}

/// Builds the handler input for a handle-bound field of record `id`.
pub(crate) fn handle_payload(
    id: &DataId,
    field_key: String,
    handle: &FieldHandle,
    field_name: &str,
    args: &[Argument],
    variables: &Variables,
) -> HandleFieldPayload {
    HandleFieldPayload {
        data_id: id.clone(),
        field_key,
        handle_key: handle_storage_key(handle, field_name, args, variables),
        handle: handle.handle.clone(),
        args: args
            .iter()
            .map(|arg| (arg.name.clone(), arg.value.resolve(variables)))
            .collect(),
    }
}

/// Subtree left for a later incremental payload.
#[derive(Clone, Debug, PartialEq)]
pub enum IncrementalPlaceholder {
    Defer {
        label: String,
        /// Response path of the object owning the deferred selections.
        path: Vec<PathStep>,
        parent_id: DataId,
        typename: Option<String>,
        selections: Arc<[Selection]>,
        variables: Variables,
    },
    Stream {
        label: String,
        /// Response path of the object owning the streamed field.
        path: Vec<PathStep>,
        parent_id: DataId,
        field: Arc<LinkedField>,
        variables: Variables,
        /// List as written by this payload.
        items: Vec<ListItem>,
    },
}

impl IncrementalPlaceholder {
    pub fn label(&self) -> &str {
        match self {
            IncrementalPlaceholder::Defer { label, .. } | IncrementalPlaceholder::Stream { label, .. } => label,
        }
    }

    pub fn path(&self) -> &[PathStep] {
        match self {
            IncrementalPlaceholder::Defer { path, .. } | IncrementalPlaceholder::Stream { path, .. } => path,
        }
    }
}

/// Side outputs of one normalization pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NormalizedPayload {
    pub placeholders: Vec<IncrementalPlaceholder>,
    pub handles: Vec<HandleFieldPayload>,
}

impl NormalizedPayload {
    pub fn extend(&mut self, other: NormalizedPayload) {
        self.placeholders.extend(other.placeholders);
        self.handles.extend(other.handles);
    }
}

/// Writes `data` into `batch` as the record `data_id` read through `selections`.
///
/// `path` is the response path of `data` from the operation root, used to key
/// any placeholders registered underneath.
#[allow(clippy::too_many_arguments)]
pub fn normalize(
    batch: &mut MutationBatch,
    data_id: &DataId,
    typename: Option<&str>,
    data: &Map<String, Value>,
    selections: &[Selection],
    variables: &Variables,
    path: &[PathStep],
    options: &NormalizationOptions,
) -> Result<NormalizedPayload> {
    batch.ensure(data_id, typename);
    let mut normalizer = Normalizer {
        batch,
        options,
        variables,
        path: path.iter().cloned().collect(),
        out: NormalizedPayload::default(),
    };
    normalizer.traverse(data_id, typename, data, selections)?;
    trace!(
        id = %data_id,
        placeholders = normalizer.out.placeholders.len(),
        handles = normalizer.out.handles.len(),
        "normalizer.done"
    );
    Ok(normalizer.out)
}

struct Normalizer<'a> {
    batch: &'a mut MutationBatch,
    options: &'a NormalizationOptions,
    variables: &'a Variables,
    path: SmallVec<[PathStep; 8]>,
    out: NormalizedPayload,
}

impl<'a> Normalizer<'a> {
    fn traverse(
        &mut self,
        id: &DataId,
        typename: Option<&str>,
        data: &Map<String, Value>,
        selections: &[Selection],
    ) -> Result<()> {
        for selection in selections {
            match selection {
                Selection::ScalarField(field) => {
                    let Some(value) = data.get(field.response_key()) else {
                        continue;
                    };
                    let key = field.storage_key(self.variables);
                    self.batch.set_field(id, key.clone(), FieldValue::Scalar(value.clone()));
                    if let Some(handle) = &field.handle {
                        self.push_handle(id, key, handle, &field.name, &field.args);
                    }
                }
                Selection::LinkedField(field) => {
                    self.normalize_linked(id, field, data)?;
                }
                Selection::InlineFragment(fragment) => {
                    if self.applies(typename, &fragment.type_condition) {
                        self.traverse(id, typename, data, &fragment.selections)?;
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let fragment = &spread.fragment;
                    if self.applies(typename, &fragment.type_condition) {
                        self.traverse(id, typename, data, &fragment.selections)?;
                    }
                }
                Selection::Condition(condition) => {
                    if condition_passes(condition, self.variables) {
                        self.traverse(id, typename, data, &condition.selections)?;
                    }
                }
                Selection::Defer(defer) => {
                    let deferred = self.options.incremental_delivery
                        && guard_enabled(defer.if_condition.as_ref(), self.variables);
                    if !deferred {
                        self.traverse(id, typename, data, &defer.selections)?;
                        continue;
                    }
                    self.out.placeholders.push(IncrementalPlaceholder::Defer {
                        label: defer.label.clone(),
                        path: self.path.to_vec(),
                        parent_id: id.clone(),
                        typename: typename.map(str::to_owned),
                        selections: defer.selections.clone().into(),
                        variables: self.variables.clone(),
                    });
                }
                Selection::Stream(stream) => {
                    let items = self.normalize_linked(id, &stream.field, data)?;
                    let streamed = self.options.incremental_delivery
                        && guard_enabled(stream.if_condition.as_ref(), self.variables);
                    if let (true, Some(items)) = (streamed, items) {
                        self.out.placeholders.push(IncrementalPlaceholder::Stream {
                            label: stream.label.clone(),
                            path: self.path.to_vec(),
                            parent_id: id.clone(),
                            field: Arc::new(stream.field.clone()),
                            variables: self.variables.clone(),
                            items,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Normalizes one linked field; returns the written list for plural fields.
    fn normalize_linked(
        &mut self,
        parent: &DataId,
        field: &LinkedField,
        data: &Map<String, Value>,
    ) -> Result<Option<Vec<ListItem>>> {
        let response_key = field.response_key();
        let Some(value) = data.get(response_key) else {
            return Ok(None);
        };
        let key = field.storage_key(self.variables);
        let mut written = None;
        match value {
            Value::Null => {
                self.batch.set_field(parent, key.clone(), FieldValue::Scalar(Value::Null));
            }
            Value::Array(items) if field.plural => {
                let mut links = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let object = match item {
                        Value::Null => {
                            links.push(ListItem::Null);
                            continue;
                        }
                        Value::Object(object) => object,
                        _ => return Err(self.expected_object(response_key)),
                    };
                    let typename = response_typename(object, field);
                    let child = self.options.identify(object, typename, parent, &key, Some(index));
                    self.path.push(PathStep::field(response_key));
                    self.path.push(PathStep::Index(index));
                    self.batch.ensure(&child, typename);
                    let result = self.traverse(&child, typename, object, &field.selections);
                    self.path.truncate(self.path.len() - 2);
                    result?;
                    links.push(ListItem::Link(child));
                }
                self.batch.set_field(parent, key.clone(), FieldValue::Links(links.clone()));
                written = Some(links);
            }
            Value::Object(object) if !field.plural => {
                let typename = response_typename(object, field);
                let child = self.options.identify(object, typename, parent, &key, None);
                self.path.push(PathStep::field(response_key));
                self.batch.ensure(&child, typename);
                let result = self.traverse(&child, typename, object, &field.selections);
                self.path.pop();
                result?;
                self.batch.set_field(parent, key.clone(), FieldValue::Link(child));
            }
            _ => return Err(self.expected_object(response_key)),
        }
        if let Some(handle) = &field.handle {
            self.push_handle(parent, key, handle, &field.name, &field.args);
        }
        Ok(written)
    }

    fn push_handle(
        &mut self,
        id: &DataId,
        field_key: String,
        handle: &FieldHandle,
        field_name: &str,
        args: &[Argument],
    ) {
        let payload = handle_payload(id, field_key, handle, field_name, args, self.variables);
        self.out.handles.push(payload);
    }

    fn applies(&self, typename: Option<&str>, condition: &str) -> bool {
        type_condition_applies(self.options.schema.as_deref(), typename, condition)
    }

    fn expected_object(&self, response_key: &str) -> CacheError {
        let mut path = self.path.to_vec();
        path.push(PathStep::field(response_key));
        CacheError::invalid_payload(format!(
            "expected {} at `{}` to be an object or list of objects",
            response_key,
            crate::types::format_path(&path)
        ))
    }
}
