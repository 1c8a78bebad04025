use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CacheError>;

/// One entry of a response's `errors` array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayloadError {
    /// Human readable description supplied by the server.
    pub message: String,
    /// Source locations, passed through untouched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Value>,
    /// Optional severity tag (`ERROR`, `WARNING`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

impl PayloadError {
    /// Builds an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            severity: None,
        }
    }
}

/// Comma-separated list of known incremental paths, used in diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KnownPaths(pub Vec<String>);

impl fmt::Display for KnownPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Message list rendered one per line under a header.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorMessages(pub Vec<PayloadError>);

impl fmt::Display for ErrorMessages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for err in &self.0 {
            write!(f, "\n  - {}", err.message)?;
        }
        Ok(())
    }
}

/// Runtime reconciliation errors surfaced through an operation's error channel.
///
/// A rejected payload never writes to the store; the error terminates only
/// the operation that received it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CacheError {
    /// An incremental payload named a label no pending entry was registered for.
    #[error("received response for unknown label '{label}'")]
    UnknownLabel { label: String },
    /// The label is known but none of its entries is keyed by the payload path.
    #[error("received response for unknown path `{path}` for label `{label}`. Known paths: {known_paths}.")]
    UnknownPath {
        label: String,
        path: String,
        known_paths: KnownPaths,
    },
    /// The response carried errors and no data.
    #[error("no data returned for operation `{operation}`, got error(s):{errors}")]
    NoData {
        operation: String,
        errors: ErrorMessages,
    },
    /// An incremental payload is structurally unusable.
    #[error("invalid payload: {reason}")]
    InvalidPayload { reason: String },
    /// A selection names a handle that no provider supplies.
    #[error("no handler registered for handle `{handle}`")]
    MissingHandler { handle: String },
    /// Transport-level failure, forwarded unchanged.
    #[error("network error: {message}")]
    Network { message: String },
}

impl CacheError {
    /// Builds a [`CacheError::Network`] from any displayable failure.
    pub fn network(message: impl fmt::Display) -> Self {
        CacheError::Network {
            message: message.to_string(),
        }
    }

    /// Builds a [`CacheError::InvalidPayload`].
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        CacheError::InvalidPayload {
            reason: reason.into(),
        }
    }

    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::UnknownLabel { .. } => "UnknownLabel",
            CacheError::UnknownPath { .. } => "UnknownPath",
            CacheError::NoData { .. } => "NoData",
            CacheError::InvalidPayload { .. } => "InvalidPayload",
            CacheError::MissingHandler { .. } => "MissingHandler",
            CacheError::Network { .. } => "Network",
        }
    }
}
