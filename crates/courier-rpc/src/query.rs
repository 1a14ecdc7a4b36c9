//! # Querying Side
//!
//! One request, one future response, one deadline.

use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use courier_transport::{Connection, TransportError};
use courier_types::channels::{query_channel, response_channel};
use courier_types::{QueryRequest, QueryResponse, Schema, SerializationError};

use crate::error::QueryError;

/// Default deadline for a query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Query a service with the default deadline.
///
/// # Errors
///
/// See [`query_with_timeout`].
pub async fn query<Req, S>(
    conn: &Connection,
    service: &str,
    event: &str,
    data: &Req,
    response_schema: &S,
) -> Result<S::Value, QueryError>
where
    Req: Serialize + Sync,
    S: Schema,
{
    query_with_timeout(conn, service, event, data, response_schema, DEFAULT_QUERY_TIMEOUT).await
}

/// Publish a request on `query:<service>:<event>` and await the single
/// response on a per-call channel.
///
/// The first message on the response channel decides the call: a parse or
/// schema failure rejects immediately (no further messages are awaited),
/// success resolves with the validated data. The response subscription is
/// dropped before returning on every path.
///
/// # Errors
///
/// - [`QueryError::Timeout`] if no response arrives within `timeout`.
/// - [`QueryError::Validation`] if the response data fails the schema.
/// - [`QueryError::Serialization`] on unparseable request or response.
/// - [`QueryError::Transport`] if publishing or subscribing fails.
pub async fn query_with_timeout<Req, S>(
    conn: &Connection,
    service: &str,
    event: &str,
    data: &Req,
    response_schema: &S,
    timeout: Duration,
) -> Result<S::Value, QueryError>
where
    Req: Serialize + Sync,
    S: Schema,
{
    let request_id = Uuid::new_v4();
    let reply_channel = response_channel(service, request_id);

    // Subscribe before publishing so a fast responder cannot race us.
    let mut subscription = conn.subscriber()?.subscribe(&reply_channel).await?;

    let request = QueryRequest {
        data: serde_json::to_value(data).map_err(SerializationError::from)?,
        request_id,
        response_channel: reply_channel.clone(),
        date: OffsetDateTime::now_utc(),
        id: conn.next_message_id(),
    };
    let payload = serde_json::to_string(&request).map_err(SerializationError::from)?;
    debug!(service, event, %request_id, "query sent");
    let publisher = conn.publisher()?;
    publisher
        .publish(&query_channel(service, event), payload)
        .await?;

    let deadline = sleep(timeout);
    tokio::pin!(deadline);

    tokio::select! {
        payload = subscription.recv() => {
            let payload = payload.ok_or(TransportError::ChannelClosed {
                channel: reply_channel,
            })?;
            let response: QueryResponse =
                serde_json::from_str(&payload).map_err(SerializationError::from)?;
            let value = response_schema.validate(&response.data)?;
            debug!(service, event, %request_id, "query resolved");
            Ok(value)
        }
        () = &mut deadline => {
            debug!(service, event, %request_id, "query timed out");
            Err(QueryError::Timeout { timeout })
        }
    }
}
