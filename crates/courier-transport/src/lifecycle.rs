//! # Connection Lifecycle Events
//!
//! Connect, disconnect, reconnect, and error events for the publish and
//! subscribe sides of a connection, exposed through a process-wide observer.
//! Observers register with a filter and receive events in the order the
//! transport emits them, at most once per underlying event.

use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Buffered lifecycle events per observer.
const OBSERVER_CAPACITY: usize = 64;

/// Which side of the connection an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The publishing handle.
    Publisher,
    /// The subscribing handle.
    Subscriber,
}

/// The kind of lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    /// The handle connected.
    Connected,
    /// The handle disconnected.
    Disconnected,
    /// The handle was replaced during a reconnect.
    Reconnected,
    /// The handle reported a transport error.
    Error,
}

/// One lifecycle event as emitted by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A handle connected.
    Connected(Side),
    /// A handle disconnected.
    Disconnected(Side),
    /// A handle was replaced during a reconnect.
    Reconnected(Side),
    /// A handle reported an error.
    Error {
        /// The side the error occurred on.
        side: Side,
        /// Backend-provided description.
        message: String,
    },
}

impl LifecycleEvent {
    /// The side this event belongs to.
    #[must_use]
    pub fn side(&self) -> Side {
        match self {
            Self::Connected(side)
            | Self::Disconnected(side)
            | Self::Reconnected(side)
            | Self::Error { side, .. } => *side,
        }
    }

    /// The kind of transition.
    #[must_use]
    pub fn kind(&self) -> LifecycleKind {
        match self {
            Self::Connected(_) => LifecycleKind::Connected,
            Self::Disconnected(_) => LifecycleKind::Disconnected,
            Self::Reconnected(_) => LifecycleKind::Reconnected,
            Self::Error { .. } => LifecycleKind::Error,
        }
    }
}

/// Selects which lifecycle events an observer receives.
#[derive(Debug, Clone, Default)]
pub struct LifecycleFilter {
    kinds: Option<Vec<LifecycleKind>>,
    sides: Option<Vec<Side>>,
}

impl LifecycleFilter {
    /// Match every event.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to the given kinds.
    #[must_use]
    pub fn kinds(kinds: impl Into<Vec<LifecycleKind>>) -> Self {
        Self {
            kinds: Some(kinds.into()),
            sides: None,
        }
    }

    /// Restrict to one side.
    #[must_use]
    pub fn side(self, side: Side) -> Self {
        Self {
            sides: Some(vec![side]),
            ..self
        }
    }

    /// Whether an event passes this filter.
    #[must_use]
    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }
        if let Some(sides) = &self.sides {
            if !sides.contains(&event.side()) {
                return false;
            }
        }
        true
    }
}

/// The emitting side of the lifecycle observer. Owned by the connection
/// context; backends receive a clone so they can report their own
/// transitions.
#[derive(Debug, Clone)]
pub struct LifecycleEvents {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleEvents {
    /// Create a fresh lifecycle event hub.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(OBSERVER_CAPACITY);
        Self { sender }
    }

    /// Emit an event to every registered observer.
    ///
    /// Returns the number of observers that received it. An event with no
    /// observers is dropped, which is fine: lifecycle events are advisory.
    pub fn emit(&self, event: LifecycleEvent) -> usize {
        match self.sender.send(event.clone()) {
            Ok(receivers) => {
                debug!(?event, receivers, "lifecycle event emitted");
                receivers
            }
            Err(_) => {
                debug!(?event, "lifecycle event dropped (no observers)");
                0
            }
        }
    }

    /// Register an observer for events matching `filter`.
    #[must_use]
    pub fn observe(&self, filter: LifecycleFilter) -> LifecycleObserver {
        LifecycleObserver {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LifecycleEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered lifecycle observer. Dropping it unregisters.
pub struct LifecycleObserver {
    receiver: broadcast::Receiver<LifecycleEvent>,
    filter: LifecycleFilter,
}

impl LifecycleObserver {
    /// Receive the next matching event, in emission order.
    ///
    /// Returns `None` once the connection context is gone.
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(lagged = count, "lifecycle observer lagged, events dropped");
                    continue;
                }
            };
            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }
}
