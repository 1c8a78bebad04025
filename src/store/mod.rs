//! Normalized record store.
//!
//! Owns the canonical record source and everything that reads or writes it:
//! normalization of responses, incremental payload matching, snapshot reads,
//! optimistic overlays, subscription notification and garbage collection.

/// Reachability marking and sweeping of the canonical source.
pub mod gc;

/// Matching of deferred and streamed payloads to pending entries.
pub mod incremental;

/// Scoped read-write views for handlers and optimistic updaters.
pub mod mutator;

/// Response normalization into mutation batches.
pub mod normalizer;

/// Selector evaluation into snapshots.
pub mod reader;

/// Records and field values.
pub mod record;

/// Canonical record source and mutation batches.
pub mod source;

mod core;
mod metrics;
mod optimistic;
mod options;
mod subscriptions;

pub use self::core::{GcHold, Store};
pub use gc::GcStats;
pub use incremental::{IncrementalMatcher, PendingEntry, PendingKind};
pub use metrics::{default_metrics, CounterMetrics, NoopMetrics, StoreMetrics};
pub use mutator::{RecordProxy, RecordSourceMutator};
pub use normalizer::{
    normalize, GetDataId, HandleFieldPayload, IncrementalPlaceholder, NormalizationOptions,
    NormalizedPayload,
};
pub use optimistic::OverlayId;
pub use options::StoreOptions;
pub use reader::{read, Data, Snapshot};
pub use record::{FieldValue, ListItem, Record, RecordLookup, Version};
pub use source::{ApplyOutcome, ListItemUpdate, MutationBatch, RecordPatch, RecordSource, RecordSourceView};
pub use subscriptions::SnapshotCallback;
