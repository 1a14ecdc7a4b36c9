//! # Courier Queue
//!
//! Durable polling work queue over list key `queue:<name>`. Unlike channel
//! messages, queued tasks persist until popped: producers keep appending
//! whether or not a consumer is alive, and a consumer started later drains
//! the backlog in FIFO order.
//!
//! One [`QueueService`] runs at most one consumer loop; the loop paces
//! itself through a [`Sleeper`] so tests can run it at full speed.

pub mod error;
pub mod service;
pub mod sleeper;

pub use error::QueueError;
pub use service::{QueueConfig, QueueEvent, QueueObserver, QueueService, QueueStop};
pub use sleeper::{NoopSleeper, Sleeper, TokioSleeper};
