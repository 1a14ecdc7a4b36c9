//! # Channel Naming
//!
//! Every channel and list key used on the wire, in one place. These strings
//! are an interoperability contract with peer processes and must be
//! reproduced exactly.

use crate::identity::InstanceName;
use uuid::Uuid;

/// Discovery announce channel: every instance publishes `<name>:<clientId>`
/// here when it connects.
pub const DISCOVERY_I_AM: &str = "discovery:i_am";

/// Discovery reply channel: instances answer an announce with
/// `<ourName>:<theirClientId>`.
pub const DISCOVERY_WELCOME: &str = "discovery:welcome";

/// Event bus channel for an instance: `channel:<name>`.
#[must_use]
pub fn event_channel(name: &InstanceName) -> String {
    format!("channel:{name}")
}

/// RPC request channel: `query:<service>:<event>`.
#[must_use]
pub fn query_channel(service: &str, event: &str) -> String {
    format!("query:{service}:{event}")
}

/// RPC response channel, derived per request: `response:<service>:<requestId>`.
#[must_use]
pub fn response_channel(service: &str, request_id: Uuid) -> String {
    format!("response:{service}:{request_id}")
}

/// Queue list key and pub/sub notify channel share the same name:
/// `queue:<queueName>`.
#[must_use]
pub fn queue_key(name: &str) -> String {
    format!("queue:{name}")
}

/// Stream channel carrying both data packets and end markers:
/// `stream:<streamName>`.
#[must_use]
pub fn stream_channel(name: &str) -> String {
    format!("stream:{name}")
}
