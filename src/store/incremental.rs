use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, trace};

use super::normalizer::{
    handle_payload, normalize, response_typename, IncrementalPlaceholder, NormalizationOptions, NormalizedPayload,
};
use super::record::ListItem;
use super::source::{ListItemUpdate, MutationBatch};
use crate::error::{CacheError, KnownPaths, Result};
use crate::selection::{LinkedField, Selection};
use crate::types::{format_path, DataId, PathStep, Variables};

/// Context retained for a subtree not yet delivered.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingKind {
    /// Deferred selections of one object; consumed by the first match.
    Defer {
        parent_id: DataId,
        typename: Option<String>,
        selections: Arc<[Selection]>,
        variables: Variables,
    },
    /// Streamed plural field; accepts every index until the operation ends.
    Stream {
        parent_id: DataId,
        field: Arc<LinkedField>,
        variables: Variables,
        /// List as last written by this operation.
        items: Vec<ListItem>,
    },
}

/// Placeholder waiting for an incremental payload.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingEntry {
    /// Response path of the owning object.
    pub path: Vec<PathStep>,
    pub kind: PendingKind,
}

/// Resolves incremental payloads against the placeholders of one operation.
#[derive(Debug, Default)]
pub struct IncrementalMatcher {
    entries: FxHashMap<String, Vec<PendingEntry>>,
}

impl IncrementalMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a placeholder, replacing an entry with the same label and path.
    pub fn register(&mut self, placeholder: IncrementalPlaceholder) {
        let (label, entry) = match placeholder {
            IncrementalPlaceholder::Defer {
                label,
                path,
                parent_id,
                typename,
                selections,
                variables,
            } => (
                label,
                PendingEntry {
                    path,
                    kind: PendingKind::Defer {
                        parent_id,
                        typename,
                        selections,
                        variables,
                    },
                },
            ),
            IncrementalPlaceholder::Stream {
                label,
                path,
                parent_id,
                field,
                variables,
                items,
            } => (
                label,
                PendingEntry {
                    path,
                    kind: PendingKind::Stream {
                        parent_id,
                        field,
                        variables,
                        items,
                    },
                },
            ),
        };
        trace!(label = %label, path = %format_path(&entry.path), "matcher.register");
        let queue = self.entries.entry(label).or_default();
        match queue.iter_mut().find(|existing| existing.path == entry.path) {
            Some(existing) => *existing = entry,
            None => queue.push(entry),
        }
    }

    /// Number of pending entries across all labels.
    pub fn pending(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Entries registered under `label`, in registration order.
    pub fn entries(&self, label: &str) -> &[PendingEntry] {
        self.entries.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drops every entry, returning how many were pending.
    pub fn clear(&mut self) -> usize {
        let pending = self.pending();
        self.entries.clear();
        pending
    }

    /// Matches an incremental payload and normalizes it into `batch`.
    ///
    /// Nothing is written and no entry changes when an error is returned.
    pub fn resolve(
        &mut self,
        label: &str,
        path: &[PathStep],
        data: &Value,
        batch: &mut MutationBatch,
        options: &NormalizationOptions,
    ) -> Result<NormalizedPayload> {
        let Some(queue) = self.entries.get(label) else {
            return Err(CacheError::UnknownLabel {
                label: label.to_owned(),
            });
        };
        let streamed = matches!(
            queue.first().map(|entry| &entry.kind),
            Some(PendingKind::Stream { .. })
        );
        let key = if streamed {
            stream_key(path)?
        } else {
            path
        };
        let position = queue.iter().position(|entry| match &entry.kind {
            PendingKind::Defer { .. } => entry.path == key,
            PendingKind::Stream { field, .. } => {
                streamed
                    && entry.path == key
                    && matches!(path.get(key.len()), Some(PathStep::Field(name)) if name == field.response_key())
            }
        });
        let Some(position) = position else {
            return Err(CacheError::UnknownPath {
                label: label.to_owned(),
                path: format_path(key),
                known_paths: KnownPaths(queue.iter().map(|entry| format_path(&entry.path)).collect()),
            });
        };

        let mut scratch = MutationBatch::new();
        let entry = &queue[position];
        let out = match &entry.kind {
            PendingKind::Defer {
                parent_id,
                typename,
                selections,
                variables,
            } => {
                let Value::Object(object) = data else {
                    return Err(CacheError::invalid_payload(format!(
                        "deferred payload for label `{label}` is not an object"
                    )));
                };
                let out = normalize(
                    &mut scratch,
                    parent_id,
                    typename.as_deref(),
                    object,
                    selections,
                    variables,
                    path,
                    options,
                )?;
                self.remove(label, position);
                out
            }
            PendingKind::Stream {
                parent_id,
                field,
                variables,
                items,
            } => {
                let index = path[path.len() - 1]
                    .as_index()
                    .ok_or_else(|| CacheError::invalid_payload("stream path must end in an index"))?;
                let storage_key = field.storage_key(variables);
                let (item, mut out) = match data {
                    Value::Null => (ListItem::Null, NormalizedPayload::default()),
                    Value::Object(object) => {
                        let typename = response_typename(object, field);
                        let item_id = options
                            .identity(object, typename)
                            .or_else(|| items.get(index).and_then(ListItem::as_link).cloned())
                            .unwrap_or_else(|| DataId::client(parent_id, &storage_key, Some(index)));
                        let out = normalize(
                            &mut scratch,
                            &item_id,
                            typename,
                            object,
                            &field.selections,
                            variables,
                            path,
                            options,
                        )?;
                        (ListItem::Link(item_id), out)
                    }
                    _ => {
                        return Err(CacheError::invalid_payload(format!(
                            "streamed item for label `{label}` is not an object"
                        )))
                    }
                };
                let mut next = items.clone();
                if next.len() <= index {
                    next.resize(index + 1, ListItem::Hole);
                }
                next[index] = item;
                let handle = field.handle.as_ref().map(|handle| {
                    handle_payload(
                        parent_id,
                        storage_key.clone(),
                        handle,
                        &field.name,
                        &field.args,
                        variables,
                    )
                });
                scratch.push_list_update(ListItemUpdate {
                    parent: parent_id.clone(),
                    storage_key,
                    expected: items.clone(),
                    next: next.clone(),
                    handle_key: handle.as_ref().map(|payload| payload.handle_key.clone()),
                    derived: None,
                });
                out.handles.extend(handle);
                self.set_stream_items(label, position, next);
                out
            }
        };
        debug!(label, path = %format_path(path), records = scratch.len(), "matcher.resolve");
        batch.merge(scratch);
        Ok(out)
    }

    fn remove(&mut self, label: &str, position: usize) {
        if let Some(queue) = self.entries.get_mut(label) {
            queue.remove(position);
            if queue.is_empty() {
                self.entries.remove(label);
            }
        }
    }

    fn set_stream_items(&mut self, label: &str, position: usize, next: Vec<ListItem>) {
        if let Some(PendingEntry {
            kind: PendingKind::Stream { items, .. },
            ..
        }) = self.entries.get_mut(label).and_then(|queue| queue.get_mut(position))
        {
            *items = next;
        }
    }
}

/// Owner path of a streamed item: the payload path without `field, index`.
fn stream_key(path: &[PathStep]) -> Result<&[PathStep]> {
    match path {
        [owner @ .., PathStep::Field(_), PathStep::Index(_)] => Ok(owner),
        _ => Err(CacheError::invalid_payload(format!(
            "stream payload path `{}` must end in a field and an index",
            format_path(path)
        ))),
    }
}
