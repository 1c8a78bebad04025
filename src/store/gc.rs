use rustc_hash::FxHashSet;
use tracing::{debug, info};

use super::record::{FieldValue, ListItem, Record, RecordLookup};
use super::source::{RecordSource, RecordSourceView};
use crate::schema::{type_condition_applies, Schema};
use crate::selection::{condition_passes, LinkedField, Selection, Selector};
use crate::types::{DataId, Variables};

/// Result of one collection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Records reachable from the root set.
    pub marked: usize,
    /// Entries removed from the canonical source.
    pub collected: usize,
    /// Set when the pass was postponed by a hold or an optimistic overlay.
    pub deferred: bool,
}

impl GcStats {
    pub(crate) fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }
}

/// Marks every record reachable from `roots` through their selections.
pub(crate) fn mark<'s>(
    source: &RecordSource,
    roots: impl IntoIterator<Item = &'s Selector>,
    schema: Option<&Schema>,
) -> FxHashSet<DataId> {
    let mut marker = Marker {
        source,
        schema,
        marked: FxHashSet::default(),
    };
    for selector in roots {
        marker.visit(&selector.data_id, &selector.selections, &selector.variables);
    }
    marker.marked
}

/// Removes every canonical entry not in `marked`.
pub(crate) fn sweep(source: &mut RecordSource, marked: &FxHashSet<DataId>) -> usize {
    let doomed: Vec<DataId> = source.ids().filter(|id| !marked.contains(*id)).cloned().collect();
    for id in &doomed {
        source.remove(id);
    }
    if !doomed.is_empty() {
        info!(collected = doomed.len(), retained = marked.len(), "store.gc.collect");
    } else {
        debug!(retained = marked.len(), "store.gc.noop");
    }
    doomed.len()
}

struct Marker<'a> {
    source: &'a RecordSource,
    schema: Option<&'a Schema>,
    marked: FxHashSet<DataId>,
}

impl<'a> Marker<'a> {
    fn visit(&mut self, id: &DataId, selections: &[Selection], variables: &Variables) {
        // Records are revisited per selection set; only the id set is deduplicated.
        self.marked.insert(id.clone());
        let source = self.source;
        if let RecordLookup::Existent(record) = source.get(id) {
            self.traverse(record, selections, variables);
        }
    }

    fn traverse(&mut self, record: &'a Record, selections: &[Selection], variables: &Variables) {
        for selection in selections {
            match selection {
                Selection::ScalarField(_) => {}
                Selection::LinkedField(field) => self.follow(record, field, variables),
                Selection::Stream(stream) => self.follow(record, &stream.field, variables),
                Selection::Defer(defer) => self.traverse(record, &defer.selections, variables),
                Selection::InlineFragment(fragment) => {
                    if type_condition_applies(self.schema, record.typename(), &fragment.type_condition) {
                        self.traverse(record, &fragment.selections, variables);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if type_condition_applies(self.schema, record.typename(), &spread.fragment.type_condition) {
                        self.traverse(record, &spread.fragment.selections, variables);
                    }
                }
                Selection::Condition(condition) => {
                    if condition_passes(condition, variables) {
                        self.traverse(record, &condition.selections, variables);
                    }
                }
            }
        }
    }

    fn follow(&mut self, record: &'a Record, field: &LinkedField, variables: &Variables) {
        let mut keys = vec![field.storage_key(variables)];
        if field.handle.is_some() {
            keys.push(field.read_key(variables));
        }
        for key in keys {
            match record.get(&key) {
                Some(FieldValue::Link(target)) => self.visit(target, &field.selections, variables),
                Some(FieldValue::Links(items)) => {
                    for target in items.iter().filter_map(ListItem::as_link) {
                        self.visit(target, &field.selections, variables);
                    }
                }
                _ => {}
            }
        }
    }
}
