//! # Transport Ports
//!
//! Trait definitions for the backing store. The sole infrastructure
//! requirement is publish/subscribe on named channels plus list operations
//! with string payloads; anything offering those can sit behind these ports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::lifecycle::LifecycleEvents;
use crate::subscription::RawSubscription;

/// The role a handle is opened for. A connection holds one handle per role
/// and replaces all three as a unit on reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportRole {
    /// Outbound publishing.
    Publisher,
    /// Inbound subscriptions.
    Subscriber,
    /// List (queue) operations.
    Queue,
}

/// One open handle to the backing store.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload on a named channel. Fire-and-forget: delivery to
    /// zero subscribers is not an error.
    async fn publish(&self, channel: &str, payload: String) -> Result<(), TransportError>;

    /// Subscribe to a named channel. The returned handle delivers payloads
    /// in arrival order and unsubscribes when dropped.
    async fn subscribe(&self, channel: &str) -> Result<RawSubscription, TransportError>;

    /// Append an item to the tail of a list.
    async fn push_back(&self, list: &str, item: String) -> Result<(), TransportError>;

    /// Pop the head of a list, waiting up to `timeout` for an item to
    /// arrive. A zero timeout makes a single non-blocking attempt.
    async fn pop_front(
        &self,
        list: &str,
        timeout: Duration,
    ) -> Result<Option<String>, TransportError>;

    /// Current length of a list.
    async fn list_len(&self, list: &str) -> Result<usize, TransportError>;

    /// Delete a list outright, discarding all pending items.
    async fn delete(&self, list: &str) -> Result<(), TransportError>;
}

/// Opens transport handles by role.
///
/// The backend receives the connection's lifecycle hub so it can report
/// its own transitions (connects, errors) for the publish and subscribe
/// sides.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open one handle for the given role.
    async fn open(
        &self,
        role: TransportRole,
        lifecycle: LifecycleEvents,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}
