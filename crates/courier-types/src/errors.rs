//! # Shared Error Types
//!
//! Errors that cross crate boundaries. Per-subsystem errors (connect, query,
//! queue, ...) live in their own crates and wrap these where relevant.

use thiserror::Error;

/// An inbound payload failed schema validation.
///
/// Always handled locally: the message is logged and dropped, never surfaced
/// to the publisher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema validation failed: {reason}")]
pub struct ValidationError {
    /// Human-readable description of the mismatch.
    pub reason: String,
}

impl ValidationError {
    /// Create a validation error with the given reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A payload was not parseable JSON, or a value could not be serialized.
#[derive(Debug, Error)]
#[error("invalid JSON payload: {0}")]
pub struct SerializationError(#[from] pub serde_json::Error);
