//! Identifier and path types shared by every layer of the cache.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of the root record every operation reads from.
pub const ROOT_ID: &str = "client:root";

/// Typename stored on the root record.
pub const ROOT_TYPE: &str = "__Root";

/// Prefix carried by every synthesized (client-side) identifier.
pub const CLIENT_ID_PREFIX: &str = "client:";

/// Variable bindings keyed by name; ordered so storage keys stay canonical.
pub type Variables = BTreeMap<String, Value>;

/// Opaque, stable identifier of one normalized entity.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataId(String);

impl DataId {
    /// Wraps an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier of the root record.
    pub fn root() -> Self {
        Self(ROOT_ID.to_owned())
    }

    /// Synthesizes the identifier of an entity without stable identity,
    /// derived from its access path.
    pub fn client(parent: &DataId, storage_key: &str, index: Option<usize>) -> Self {
        match index {
            Some(index) => Self(format!("{CLIENT_ID_PREFIX}{parent}:{storage_key}:{index}")),
            None => Self(format!("{CLIENT_ID_PREFIX}{parent}:{storage_key}")),
        }
    }

    /// Returns `true` for identifiers synthesized on the client.
    pub fn is_client(&self) -> bool {
        self.0.starts_with(CLIENT_ID_PREFIX)
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DataId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for DataId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One step of a response path: an object field or a list index.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathStep {
    /// Position inside a list.
    Index(usize),
    /// Response key of an object field.
    Field(String),
}

impl PathStep {
    /// Builds a field step.
    pub fn field(name: impl Into<String>) -> Self {
        PathStep::Field(name.into())
    }

    /// Returns the list index, when this step is one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            PathStep::Index(index) => Some(*index),
            PathStep::Field(_) => None,
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Index(index) => write!(f, "{index}"),
            PathStep::Field(name) => f.write_str(name),
        }
    }
}

impl From<&str> for PathStep {
    fn from(value: &str) -> Self {
        PathStep::Field(value.to_owned())
    }
}

impl From<usize> for PathStep {
    fn from(value: usize) -> Self {
        PathStep::Index(value)
    }
}

/// Renders a path the way diagnostics print it: steps joined by `.`.
pub fn format_path(path: &[PathStep]) -> String {
    let mut out = String::new();
    for (i, step) in path.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(&step.to_string());
    }
    out
}
