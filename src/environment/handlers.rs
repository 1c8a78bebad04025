use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::store::{HandleFieldPayload, RecordSourceMutator};

/// Post-normalization hook deriving a value for a handle-bound field.
pub trait FieldHandler: Send + Sync {
    fn update(&self, store: &mut RecordSourceMutator<'_>, payload: &HandleFieldPayload);
}

/// Looks handlers up by handle name.
pub trait HandlerProvider: Send + Sync {
    fn get(&self, handle: &str) -> Option<Arc<dyn FieldHandler>>;
}

struct FnHandler<F>(F);

impl<F> FieldHandler for FnHandler<F>
where
    F: Fn(&mut RecordSourceMutator<'_>, &HandleFieldPayload) + Send + Sync,
{
    fn update(&self, store: &mut RecordSourceMutator<'_>, payload: &HandleFieldPayload) {
        (self.0)(store, payload)
    }
}

/// Map-backed [`HandlerProvider`].
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: FxHashMap<String, Arc<dyn FieldHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handle: impl Into<String>, handler: Arc<dyn FieldHandler>) -> Self {
        self.handlers.insert(handle.into(), handler);
        self
    }

    /// Registers a closure as the handler for `handle`.
    pub fn register_fn<F>(self, handle: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut RecordSourceMutator<'_>, &HandleFieldPayload) + Send + Sync + 'static,
    {
        self.register(handle, Arc::new(FnHandler(handler)))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl HandlerProvider for HandlerRegistry {
    fn get(&self, handle: &str) -> Option<Arc<dyn FieldHandler>> {
        self.handlers.get(handle).cloned()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("HandlerRegistry").field("handles", &names).finish()
    }
}
