//! # Emitting Side
//!
//! One call drains one source: each item becomes a numbered packet on
//! `stream:<name>`, then a single end marker closes the run.

use serde::Serialize;
use time::OffsetDateTime;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

use courier_transport::Connection;
use courier_types::channels::stream_channel;
use courier_types::{SerializationError, StreamData, StreamEnd};

use crate::error::StreamError;

/// Publish every item of `source` as an ordered packet run on
/// `stream:<name>`, then publish the end marker.
///
/// The whole run shares one id drawn from the connection's message counter;
/// packets are numbered 0, 1, 2, ... in emission order. Resolves with the
/// run id once the end marker has been published. An empty source publishes
/// only the end marker.
///
/// # Errors
///
/// Returns [`StreamError`] if an item cannot be serialized or a publish
/// fails; the run is abandoned without an end marker in that case.
pub async fn emit<T, St>(
    conn: &Connection,
    stream_name: &str,
    source: St,
) -> Result<i64, StreamError>
where
    T: Serialize,
    St: Stream<Item = T> + Send,
{
    let channel = stream_channel(stream_name);
    let publisher = conn.publisher()?;
    let run_id = conn.next_message_id();

    tokio::pin!(source);
    let mut packet: u64 = 0;
    while let Some(item) = source.next().await {
        let frame = StreamData {
            data: serde_json::to_value(&item).map_err(SerializationError::from)?,
            date: OffsetDateTime::now_utc(),
            packet,
            id: run_id,
        };
        let payload = serde_json::to_string(&frame).map_err(SerializationError::from)?;
        publisher.publish(&channel, payload).await?;
        packet += 1;
    }

    let end = StreamEnd {
        id: run_id,
        date: OffsetDateTime::now_utc(),
    };
    let payload = serde_json::to_string(&end).map_err(SerializationError::from)?;
    publisher.publish(&channel, payload).await?;
    debug!(stream = %stream_name, run_id, packets = packet, "stream run complete");
    Ok(run_id)
}
