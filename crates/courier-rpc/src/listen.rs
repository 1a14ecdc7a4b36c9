//! # Responding Side
//!
//! A query listener subscribes to `query:<service>:<event>` and answers
//! valid requests through an async handler. Requests are handled
//! sequentially by one pump task, so a handler never runs concurrently
//! with itself for the same listener.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use courier_transport::Connection;
use courier_types::channels::query_channel;
use courier_types::{QueryRequest, QueryResponse, Schema};

use crate::error::QueryError;

/// What handlers return. A failure is logged and produces no response, so
/// the caller times out rather than receiving a malformed reply.
pub type HandlerResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// A validated inbound request plus its envelope metadata.
#[derive(Debug, Clone)]
pub struct QueryInbound<T> {
    /// The validated request payload.
    pub data: T,
    /// The caller's correlation id.
    pub request_id: Uuid,
    /// The channel the response will be published on.
    pub response_channel: String,
    /// The caller's timestamp.
    pub date: OffsetDateTime,
    /// The caller's message counter value.
    pub id: i64,
}

/// A live query listener. Dropping or cancelling it stops answering.
pub struct QueryListener {
    channel: String,
    pump: JoinHandle<()>,
}

impl QueryListener {
    /// The request channel this listener answers on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Stop answering. Equivalent to dropping the handle.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for QueryListener {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Subscribe to `query:<service>:<event>` and answer each valid request
/// with the handler's return value.
///
/// Per message: parse the request envelope, validate its data against
/// `request_schema` (failure: log and drop, no response), run `handler`,
/// and publish exactly one [`QueryResponse`] on the request's response
/// channel. Handler failures are caught and logged; the caller times out.
///
/// # Errors
///
/// Returns [`QueryError::Transport`] if the initial subscribe fails.
pub async fn listen<S, H, Fut, Resp>(
    conn: &Arc<Connection>,
    service: &str,
    event: &str,
    request_schema: S,
    handler: H,
) -> Result<QueryListener, QueryError>
where
    S: Schema,
    H: Fn(QueryInbound<S::Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Resp>> + Send,
    Resp: Serialize + Send,
{
    let channel = query_channel(service, event);
    let mut subscription = conn.subscriber()?.subscribe(&channel).await?;

    let conn = Arc::clone(conn);
    let pump_channel = channel.clone();
    let pump = tokio::spawn(async move {
        while let Some(payload) = subscription.recv().await {
            answer::<S, H, Fut, Resp>(&conn, &pump_channel, &request_schema, &handler, &payload)
                .await;
        }
        debug!(channel = %pump_channel, "query listener stopped");
    });

    Ok(QueryListener { channel, pump })
}

async fn answer<S, H, Fut, Resp>(
    conn: &Connection,
    channel: &str,
    request_schema: &S,
    handler: &H,
    payload: &str,
) where
    S: Schema,
    H: Fn(QueryInbound<S::Value>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<Resp>> + Send,
    Resp: Serialize + Send,
{
    let request: QueryRequest = match serde_json::from_str(payload) {
        Ok(request) => request,
        Err(e) => {
            warn!(channel, error = %e, "malformed query request dropped");
            return;
        }
    };
    let data = match request_schema.validate(&request.data) {
        Ok(data) => data,
        Err(e) => {
            // No response: the caller will time out.
            warn!(channel, request_id = %request.request_id, error = %e, "invalid query request dropped");
            return;
        }
    };

    let inbound = QueryInbound {
        data,
        request_id: request.request_id,
        response_channel: request.response_channel.clone(),
        date: request.date,
        id: request.id,
    };
    let response_data = match handler(inbound).await {
        Ok(value) => value,
        Err(e) => {
            error!(channel, request_id = %request.request_id, error = %e, "query handler failed, no response sent");
            return;
        }
    };
    let response_data = match serde_json::to_value(&response_data) {
        Ok(value) => value,
        Err(e) => {
            error!(channel, request_id = %request.request_id, error = %e, "response serialization failed, no response sent");
            return;
        }
    };

    let response = QueryResponse {
        data: response_data,
        date: OffsetDateTime::now_utc(),
        id: conn.next_message_id(),
    };
    let payload = match serde_json::to_string(&response) {
        Ok(payload) => payload,
        Err(e) => {
            error!(channel, error = %e, "response envelope serialization failed");
            return;
        }
    };
    let publisher = match conn.publisher() {
        Ok(publisher) => publisher,
        Err(e) => {
            warn!(channel, error = %e, "cannot publish response, connection closed");
            return;
        }
    };
    if let Err(e) = publisher.publish(&request.response_channel, payload).await {
        warn!(channel, error = %e, "response publish failed");
    } else {
        debug!(channel, request_id = %request.request_id, "response published");
    }
}
