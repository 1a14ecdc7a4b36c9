//! # Stream Errors

use courier_transport::TransportError;
use courier_types::SerializationError;
use thiserror::Error;

/// Errors from emitting or subscribing to a stream. Malformed inbound
/// frames are not errors to the listening side; they are logged and
/// dropped so the run keeps flowing.
#[derive(Debug, Error)]
pub enum StreamError {
    /// An item could not be serialized into a packet.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// Publishing or subscribing failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
