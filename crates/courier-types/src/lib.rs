//! # Courier Shared Types
//!
//! Wire envelopes, instance identity, and the schema traits shared by every
//! Courier crate.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every cross-crate wire type and channel name
//!   is defined here so the exact on-wire strings stay interoperable with
//!   peer processes.
//! - **Structural framing**: stream frames are distinguished by the presence
//!   of their fields, never by an added tag, because peers on the same
//!   channels do the same.
//! - **Typed event sets**: event dispatch is a closed enum per service, with
//!   unknown event names surfaced as a handled variant rather than a silent
//!   map miss.

pub mod channels;
pub mod envelope;
pub mod errors;
pub mod identity;
pub mod schema;

pub use envelope::{Envelope, QueryRequest, QueryResponse, StreamData, StreamEnd, StreamFrame};
pub use errors::{SerializationError, ValidationError};
pub use identity::{ClientId, InstanceName, InvalidName};
pub use schema::{DecodeOutcome, EventSet, Schema, SchemaFn, TypedSchema};
