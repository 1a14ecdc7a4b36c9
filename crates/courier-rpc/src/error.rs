//! # Query Errors

use std::time::Duration;

use courier_transport::TransportError;
use courier_types::{SerializationError, ValidationError};
use thiserror::Error;

/// Errors from the querying side. Each failure rejects only the pending
/// call it belongs to; the response subscription is cleaned up on every
/// path.
#[derive(Debug, Error)]
pub enum QueryError {
    /// No response arrived within the deadline.
    #[error("request timed out after {timeout:?}")]
    Timeout {
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The response arrived but its data failed the response schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The request could not be serialized, or the response was not
    /// parseable JSON.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// Publishing or subscribing failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
