use rustc_hash::{FxHashMap, FxHashSet};

use super::record::{RecordLookup, Version};
use super::source::{apply_patch, Entry, MutationBatch, RecordSource, RecordSourceView};
use crate::types::DataId;

/// Identifier of one optimistic overlay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayId(pub(crate) u64);

#[derive(Debug)]
struct Overlay {
    id: OverlayId,
    batch: MutationBatch,
}

/// Ordered stack of optimistic overlays plus the merged view of every id
/// they touch.
///
/// Overlays never write to the canonical source; the merged entries are
/// recomputed from canonical plus the remaining stack whenever either side
/// changes for an id.
#[derive(Debug, Default)]
pub(crate) struct OptimisticLayer {
    overlays: Vec<Overlay>,
    merged: FxHashMap<DataId, Entry>,
    next_id: u64,
}

impl OptimisticLayer {
    pub(crate) fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.overlays.len()
    }

    pub(crate) fn push(&mut self, batch: MutationBatch, canonical: &RecordSource, revision: Version) -> OverlayId {
        self.next_id += 1;
        let id = OverlayId(self.next_id);
        let touched: Vec<DataId> = batch.patches().map(|(id, _)| id.clone()).collect();
        self.overlays.push(Overlay { id, batch });
        self.refresh(touched.iter(), canonical, revision);
        id
    }

    /// Removes an overlay, returning its writes.
    pub(crate) fn remove(
        &mut self,
        id: OverlayId,
        canonical: &RecordSource,
        revision: Version,
    ) -> Option<MutationBatch> {
        let position = self.overlays.iter().position(|overlay| overlay.id == id)?;
        let overlay = self.overlays.remove(position);
        let touched: Vec<DataId> = overlay.batch.patches().map(|(id, _)| id.clone()).collect();
        self.refresh(touched.iter(), canonical, revision);
        Some(overlay.batch)
    }

    /// Recomputes merged entries for `ids` that any overlay touches.
    pub(crate) fn refresh<'i>(
        &mut self,
        ids: impl Iterator<Item = &'i DataId>,
        canonical: &RecordSource,
        revision: Version,
    ) {
        let unique: FxHashSet<&DataId> = ids.collect();
        for id in unique {
            let mut slot = None;
            let mut shadowed = false;
            for overlay in &self.overlays {
                if let Some(patch) = overlay.batch.patch(id) {
                    if !shadowed {
                        slot = canonical.slot(id).cloned();
                        shadowed = true;
                    }
                    slot = Some(apply_patch(slot, patch.clone()));
                }
            }
            match slot {
                Some(slot) if shadowed => {
                    self.merged.insert(
                        id.clone(),
                        Entry {
                            slot,
                            version: revision,
                        },
                    );
                }
                _ => {
                    self.merged.remove(id);
                }
            }
        }
    }

    pub(crate) fn contains(&self, id: &DataId) -> bool {
        self.merged.contains_key(id)
    }
}

/// Canonical source seen through the optimistic layer.
pub(crate) struct EffectiveSource<'a> {
    pub(crate) canonical: &'a RecordSource,
    pub(crate) optimistic: &'a OptimisticLayer,
}

impl RecordSourceView for EffectiveSource<'_> {
    fn get(&self, id: &DataId) -> RecordLookup<'_> {
        match self.optimistic.merged.get(id) {
            Some(entry) => entry.slot.lookup(),
            None => self.canonical.get(id),
        }
    }

    fn version(&self, id: &DataId) -> Option<Version> {
        match self.optimistic.merged.get(id) {
            Some(entry) => Some(entry.version),
            None => self.canonical.version(id),
        }
    }
}
