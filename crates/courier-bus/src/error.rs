//! # Bus Errors

use courier_transport::TransportError;
use courier_types::{InvalidName, SerializationError};
use thiserror::Error;

/// Errors from emitting an event.
#[derive(Debug, Error)]
pub enum EmitError {
    /// The event payload could not be serialized.
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// Publishing failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors from registering a listening service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service name contains `:`.
    #[error(transparent)]
    InvalidName(#[from] InvalidName),

    /// The service name equals the connection's instance name; they share
    /// one namespace.
    #[error("service name {name:?} is reserved by the instance itself")]
    ReservedName {
        /// The rejected name.
        name: String,
    },

    /// A different service already owns this name.
    #[error("a service named {name:?} already exists")]
    DuplicateName {
        /// The contested name.
        name: String,
    },

    /// Subscribing to the service channel failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
