//! Graphcache: a normalized client-side cache for graph query responses.
//!
//! Responses are flattened into records keyed by identity, read back through
//! selectors into snapshots, and kept consistent for subscribers as later
//! payloads arrive. Deferred and streamed payloads are matched to the
//! placeholders left by earlier ones; optimistic updates layer over the
//! canonical records until they are reverted or committed.

pub mod environment;
pub mod error;
pub mod network;
pub mod primitives;
pub mod schema;
pub mod selection;
pub mod store;
pub mod types;

pub use environment::{
    Environment, EnvironmentConfig, ExecutionState, FieldHandler, HandlerProvider,
    HandlerRegistry, OptimisticUpdate,
};
pub use error::{CacheError, Result};
pub use network::{CacheConfig, Network, Response};
pub use primitives::disposable::Disposable;
pub use primitives::observable::{Callbacks, Observable, Observer, Sink, Subscription};
pub use primitives::scheduler::{ImmediateScheduler, QueueScheduler, TaskScheduler};
pub use schema::Schema;
pub use selection::{Operation, OperationDescriptor, Selection, Selector};
pub use store::{Snapshot, Store, StoreOptions};
pub use types::{DataId, PathStep, Variables};
