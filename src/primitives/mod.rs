//! Low-level primitives the cache is built from.
//!
//! Includes the push-based stream used for network responses and execute()
//! results, the cooperative task scheduler seam, and idempotent disposers.

/// Idempotent, explicitly-invoked cleanup handles.
pub mod disposable;

/// Single-subscriber cancelable push stream.
///
/// Exactly one terminal event (complete or error) is delivered, and cleanup
/// runs once regardless of how the stream ends.
pub mod observable;

/// Cooperative task scheduling.
///
/// Lets a host batch publish work, or drive it manually in tests.
pub mod scheduler;
