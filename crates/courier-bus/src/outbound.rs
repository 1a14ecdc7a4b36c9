//! # Outbound Events
//!
//! Fire-and-forget publishing of event envelopes on the instance's own
//! channel.

use time::OffsetDateTime;
use tracing::debug;

use courier_transport::Connection;
use courier_types::channels::event_channel;
use courier_types::{Envelope, EventSet, SerializationError};

use crate::error::EmitError;

/// Serialize and publish an envelope on `channel:<instanceName>`. No
/// acknowledgement is awaited; delivery to zero subscribers is not an
/// error.
///
/// # Errors
///
/// Returns [`EmitError`] if serialization or publishing fails locally.
pub async fn send_envelope(conn: &Connection, envelope: &Envelope) -> Result<(), EmitError> {
    let payload = serde_json::to_string(envelope).map_err(SerializationError::from)?;
    let channel = event_channel(conn.name());
    debug!(%channel, event = %envelope.event, id = envelope.id, "sending envelope");
    conn.publisher()?.publish(&channel, payload).await?;
    Ok(())
}

/// Emit a typed event: wrap it in an envelope stamped with the current
/// time and the next counter value, then publish it on this instance's
/// channel.
///
/// # Errors
///
/// Returns [`EmitError`] if the payload cannot be serialized or the
/// publish fails.
pub async fn emit<E: EventSet>(conn: &Connection, event: &E) -> Result<(), EmitError> {
    let (name, data) = event.encode()?;
    let envelope = Envelope {
        event: name.to_string(),
        data,
        date: OffsetDateTime::now_utc(),
        id: conn.next_message_id(),
    };
    send_envelope(conn, &envelope).await
}
