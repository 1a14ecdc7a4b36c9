//! # Courier Stream
//!
//! Ordered packetized streaming over channel `stream:<name>`. An emitter
//! drains an async source into numbered packets sharing one run id, then
//! closes the run with an end marker; listeners receive frames in arrival
//! order, validated against a schema.
//!
//! Delivery is fire-and-forget like any channel publish: packets emitted
//! while nobody listens are gone. The sequence numbers let a consumer
//! detect a gap; this crate does not fill one.

pub mod emit;
pub mod error;
pub mod listen;

pub use emit::emit;
pub use error::StreamError;
pub use listen::{listen, StreamEvent, StreamListener};
