//! Transport seam: anything that turns a request into a stream of responses.

pub mod channel;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PayloadError;
use crate::primitives::observable::Observable;
use crate::selection::RequestParameters;
use crate::types::{PathStep, Variables};

/// One message of a response stream.
///
/// `label` and `path` are present only on incremental payloads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<PayloadError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl Response {
    /// Primary payload.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// Incremental payload attached at `path` for `label`.
    pub fn incremental(label: impl Into<String>, path: Vec<PathStep>, data: Value) -> Self {
        Self {
            data: Some(data),
            label: Some(label.into()),
            path: Some(path),
            ..Self::default()
        }
    }

    pub fn with_errors(mut self, errors: Vec<PayloadError>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn is_incremental(&self) -> bool {
        self.label.is_some()
    }
}

/// Per-request cache hints, forwarded to the network untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl CacheConfig {
    pub fn force() -> Self {
        Self {
            force: true,
            metadata: None,
        }
    }
}

/// Fetches an operation, producing its responses as a stream.
pub trait Network: Send + Sync {
    fn execute(
        &self,
        request: &RequestParameters,
        variables: &Variables,
        cache_config: &CacheConfig,
    ) -> Observable<Response>;
}

struct FnNetwork<F>(F);

impl<F> Network for FnNetwork<F>
where
    F: Fn(&RequestParameters, &Variables, &CacheConfig) -> Observable<Response> + Send + Sync,
{
    fn execute(
        &self,
        request: &RequestParameters,
        variables: &Variables,
        cache_config: &CacheConfig,
    ) -> Observable<Response> {
        (self.0)(request, variables, cache_config)
    }
}

impl<F> fmt::Debug for FnNetwork<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnNetwork")
    }
}

/// Wraps a fetch function as a [`Network`].
pub fn from_fn<F>(fetch: F) -> Arc<dyn Network>
where
    F: Fn(&RequestParameters, &Variables, &CacheConfig) -> Observable<Response>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnNetwork(fetch))
}
