//! # Raw Subscriptions
//!
//! A subscription is a cancellable handle delivering raw payload strings
//! onto a channel the owner drains on its own schedule. Because each
//! subscription is drained by a single consuming task, no two messages of
//! one subscription are ever handled concurrently, and delivery order is
//! the transport's arrival order.

use tokio::sync::mpsc;

/// Buffered messages per subscription before the backend applies
/// backpressure.
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// A live subscription to one channel.
///
/// Dropping the handle cancels the subscription; the backend stops
/// forwarding as soon as it observes the closed receiver.
#[derive(Debug)]
pub struct RawSubscription {
    channel: String,
    receiver: mpsc::Receiver<String>,
}

impl RawSubscription {
    /// Wrap a receiving channel as a subscription handle. Backends call
    /// this from their `subscribe` implementation.
    #[must_use]
    pub fn new(channel: impl Into<String>, receiver: mpsc::Receiver<String>) -> Self {
        Self {
            channel: channel.into(),
            receiver,
        }
    }

    /// Receive the next raw payload.
    ///
    /// Returns `None` once the subscription is closed on the backend side.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Receive without waiting. `Ok(None)` means no payload is currently
    /// buffered.
    pub fn try_recv(&mut self) -> Result<Option<String>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(payload) => Ok(Some(payload)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(e @ mpsc::error::TryRecvError::Disconnected) => Err(e),
        }
    }

    /// The channel this subscription is attached to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Cancel the subscription explicitly. Equivalent to dropping it.
    pub fn cancel(self) {
        drop(self);
    }
}
