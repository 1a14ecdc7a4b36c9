//! # Transport Errors

use std::time::Duration;

use courier_types::InvalidName;
use thiserror::Error;

/// Errors from an open transport handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection context has been disconnected.
    #[error("transport is not connected")]
    NotConnected,

    /// A pub/sub channel was closed underneath a subscription.
    #[error("channel closed: {channel}")]
    ChannelClosed { channel: String },

    /// The backing store reported a failure.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Errors from establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The instance name contains `:`. Rejected before any I/O.
    #[error(transparent)]
    InvalidName(#[from] InvalidName),

    /// The discovery handshake did not resolve within the window. The
    /// transport handles are left open; the caller decides whether to retry
    /// or disconnect.
    #[error("discovery handshake timed out after {timeout:?}")]
    HandshakeTimeout { timeout: Duration },

    /// Opening a handle or publishing the announce failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
