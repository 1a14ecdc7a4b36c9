//! # Wire Envelopes
//!
//! The JSON wrappers carried as channel payloads. Field names are fixed by
//! the wire contract (`requestId`, `responseChannel`, ...) and `date` is an
//! ISO-8601 string on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::SerializationError;

/// Event bus envelope, the sole payload on `channel:<instanceName>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name, looked up against the receiving service's event set.
    pub event: String,
    /// Event payload, validated by the receiver before dispatch.
    pub data: Value,
    /// Emission time.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// Process-local message counter value. Advisory only; peers must not
    /// assume global uniqueness, and some emitters count from below zero.
    pub id: i64,
}

/// RPC request envelope, published on `query:<service>:<event>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Request payload, validated against the listener's request schema.
    pub data: Value,
    /// Fresh per-call correlation id.
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
    /// Channel the single response must be published on.
    #[serde(rename = "responseChannel")]
    pub response_channel: String,
    /// Emission time.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// Process-local message counter value.
    pub id: i64,
}

/// RPC response envelope, published on the request's response channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Response payload, validated against the caller's response schema.
    pub data: Value,
    /// Emission time.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// Process-local message counter value.
    pub id: i64,
}

/// Ordered data packet within one stream run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamData {
    /// Packet payload.
    pub data: Value,
    /// Emission time.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    /// Sequence number within the run, starting at 0 and incrementing by 1
    /// per emission.
    pub packet: u64,
    /// Stream run id, shared by every packet of the run and its end marker.
    pub id: i64,
}

/// End-of-stream marker. Distinguished from [`StreamData`] by the absence of
/// the `data` and `packet` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEnd {
    /// Stream run id.
    pub id: i64,
    /// Emission time.
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

/// A decoded frame from a stream channel.
#[derive(Debug, Clone)]
pub enum StreamFrame {
    /// A data packet.
    Data(StreamData),
    /// The end-of-run marker.
    End(StreamEnd),
}

impl StreamFrame {
    /// Decode a raw stream payload, branching structurally: a frame carrying
    /// both `data` and `packet` keys is a data packet, anything else is
    /// decoded as an end marker.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError`] if the payload is not JSON or is
    /// missing required fields for the branch it matched.
    pub fn decode(raw: &str) -> Result<Self, SerializationError> {
        let value: Value = serde_json::from_str(raw)?;
        if value.get("data").is_some() && value.get("packet").is_some() {
            Ok(Self::Data(serde_json::from_value(value)?))
        } else {
            Ok(Self::End(serde_json::from_value(value)?))
        }
    }
}
