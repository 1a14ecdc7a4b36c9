//! # Courier Transport
//!
//! The transport layer underneath every Courier feature: three independent
//! handles to a backing store offering publish/subscribe on named channels
//! plus list operations (push-tail, blocking pop-head, length, delete).
//!
//! ## Architecture
//!
//! The crate follows a ports-and-adapters split:
//!
//! - **Ports:** [`Transport`] (one open handle) and [`Backend`] (opens
//!   handles by role).
//! - **Adapters:** [`MemoryBroker`], an in-process broker suitable for
//!   single-node operation and multi-instance testing. Distributed
//!   deployments would plug in a different backend (e.g. Redis) behind the
//!   same ports.
//! - **Context:** [`Connection`] owns the three handles, the instance
//!   identity, the message-id counter, and the lifecycle observer. It is
//!   constructed once at startup and passed explicitly to every component
//!   that needs it; two independent connections can coexist in one process.
//!
//! ## Discovery
//!
//! `Connection::connect` runs a cooperative discovery handshake before
//! resolving: the instance announces itself on `discovery:i_am`, welcomes
//! peers on `discovery:welcome`, and flags (but never refuses) a probable
//! duplicate of its logical name.

pub mod connection;
pub mod discovery;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod ports;
pub mod subscription;

pub use connection::{ConnectConfig, Connection};
pub use discovery::DiscoveryOutcome;
pub use error::{ConnectError, TransportError};
pub use lifecycle::{
    LifecycleEvent, LifecycleEvents, LifecycleFilter, LifecycleKind, LifecycleObserver, Side,
};
pub use memory::MemoryBroker;
pub use ports::{Backend, Transport, TransportRole};
pub use subscription::RawSubscription;
