//! # Listening Side
//!
//! A stream listener subscribes to `stream:<name>` and delivers frames in
//! arrival order, validated against a schema. No reordering or buffering
//! beyond the delivery channel: a packet is handed over as it arrives,
//! whatever its sequence number says.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use courier_transport::Connection;
use courier_types::channels::stream_channel;
use courier_types::{Schema, StreamFrame};

use crate::error::StreamError;

/// Delivery buffer size per listener.
const LISTENER_BUFFER: usize = 256;

/// A frame delivered to a stream listener.
#[derive(Debug, Clone)]
pub enum StreamEvent<T> {
    /// A validated data packet.
    Data {
        /// The validated payload.
        data: T,
        /// The emitter's timestamp.
        date: OffsetDateTime,
        /// Sequence number within the run.
        packet: u64,
        /// Run id shared with the end marker.
        id: i64,
    },
    /// The run's end marker.
    End {
        /// Run id.
        id: i64,
        /// The emitter's timestamp.
        date: OffsetDateTime,
    },
}

/// A live stream subscription. Dropping or cancelling it stops delivery.
pub struct StreamListener<T> {
    channel: String,
    receiver: mpsc::Receiver<StreamEvent<T>>,
    pump: JoinHandle<()>,
}

impl<T> StreamListener<T> {
    /// The channel this listener is subscribed to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next frame. Returns `None` after cancellation or when
    /// the transport side closes.
    pub async fn recv(&mut self) -> Option<StreamEvent<T>> {
        self.receiver.recv().await
    }

    /// Stop delivery. Equivalent to dropping the handle.
    pub fn cancel(self) {
        drop(self);
    }
}

impl<T> Drop for StreamListener<T> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Subscribe to `stream:<name>` and deliver each frame as a
/// [`StreamEvent`].
///
/// Frames carrying `data` and `packet` are validated against `schema` and
/// delivered as [`StreamEvent::Data`]; end markers become
/// [`StreamEvent::End`]. Malformed frames and packets failing validation
/// are logged and dropped.
///
/// # Errors
///
/// Returns [`StreamError::Transport`] if the subscribe fails.
pub async fn listen<S>(
    conn: &Connection,
    stream_name: &str,
    schema: S,
) -> Result<StreamListener<S::Value>, StreamError>
where
    S: Schema,
{
    let channel = stream_channel(stream_name);
    let mut subscription = conn.subscriber()?.subscribe(&channel).await?;
    let (sender, receiver) = mpsc::channel(LISTENER_BUFFER);

    let schema = Arc::new(schema);
    let pump_channel = channel.clone();
    let pump = tokio::spawn(async move {
        while let Some(payload) = subscription.recv().await {
            let Some(event) = decode(&pump_channel, schema.as_ref(), &payload) else {
                continue;
            };
            if sender.send(event).await.is_err() {
                break;
            }
        }
        debug!(channel = %pump_channel, "stream listener stopped");
    });

    Ok(StreamListener {
        channel,
        receiver,
        pump,
    })
}

fn decode<S: Schema>(channel: &str, schema: &S, payload: &str) -> Option<StreamEvent<S::Value>> {
    let frame = match StreamFrame::decode(payload) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(channel, error = %e, "malformed stream frame dropped");
            return None;
        }
    };
    match frame {
        StreamFrame::Data(frame) => match schema.validate(&frame.data) {
            Ok(data) => Some(StreamEvent::Data {
                data,
                date: frame.date,
                packet: frame.packet,
                id: frame.id,
            }),
            Err(e) => {
                warn!(channel, packet = frame.packet, error = %e, "stream packet failed validation, dropped");
                None
            }
        },
        StreamFrame::End(end) => Some(StreamEvent::End {
            id: end.id,
            date: end.date,
        }),
    }
}
