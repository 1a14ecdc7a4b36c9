//! # Courier Channel Bus
//!
//! Low-level envelope send plus the typed listening-service layer on top of
//! it.
//!
//! An instance emits events on its own channel (`channel:<instanceName>`);
//! a [`ListeningService`] subscribes to the channel of the name it is
//! created with and dispatches schema-validated events to local listeners.
//! Service names are hard-unique per connection context and live in the
//! same namespace as the instance name.
//!
//! Inbound messages that fail to parse or validate are logged and dropped;
//! they never reach a listener and never halt the subscription.

pub mod error;
pub mod outbound;
pub mod registry;
pub mod service;

pub use error::{EmitError, ServiceError};
pub use outbound::{emit, send_envelope};
pub use registry::ServiceRegistry;
pub use service::{Delivery, EventFilter, ListeningService, Listener};
