//! # Courier RPC
//!
//! Correlated request/response over plain channels: a query publishes its
//! request on `query:<service>:<event>` together with a per-call response
//! channel (`response:<service>:<requestId>`), subscribes that channel
//! first, and races the first response against a timeout.
//!
//! Guarantees:
//!
//! - at most one response is accepted by the querying side (the first
//!   structurally valid one); the response subscription is torn down after
//!   the race resolves, whichever side wins;
//! - a listener publishes exactly one response per valid request; invalid
//!   requests and handler failures produce no response, so the caller times
//!   out instead of receiving a malformed reply.

pub mod error;
pub mod listen;
pub mod query;

pub use error::QueryError;
pub use listen::{listen, HandlerResult, QueryInbound, QueryListener};
pub use query::{query, query_with_timeout, DEFAULT_QUERY_TIMEOUT};
