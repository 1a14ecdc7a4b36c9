//! # Queue Errors

use courier_transport::TransportError;
use courier_types::SerializationError;
use thiserror::Error;

/// Errors from queue operations. Consumer-loop failures are not surfaced
/// here; they are reported as [`QueueEvent::Error`](crate::QueueEvent::Error)
/// observations and the loop keeps polling.
#[derive(Debug, Error)]
pub enum QueueError {
    /// A task could not be serialized for storage.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// A list or publish operation failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
