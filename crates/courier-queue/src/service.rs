//! # Queue Service
//!
//! A durable work queue over list key `queue:<name>`. Producers append
//! serialized tasks with [`QueueService::put`]; one consumer loop polls the
//! head, validates each item against the queue's schema, and reports what
//! it finds as [`QueueEvent`] observations. Items survive while no consumer
//! runs: the list is the buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use courier_transport::Connection;
use courier_types::channels::queue_key;
use courier_types::{Schema, SerializationError};

use crate::error::QueueError;
use crate::sleeper::Sleeper;

/// Observer buffer size. A lagging observer loses the oldest events and is
/// told so.
const EVENT_CAPACITY: usize = 64;

/// Pacing of the consumer loop.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long one blocking pop waits for an item.
    pub pop_timeout: Duration,
    /// Extra delay after an empty poll.
    pub idle_delay: Duration,
    /// Delay at the end of every iteration.
    pub loop_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            pop_timeout: Duration::from_millis(1000),
            idle_delay: Duration::from_millis(100),
            loop_delay: Duration::from_millis(100),
        }
    }
}

/// What the consumer loop observed.
#[derive(Debug, Clone)]
pub enum QueueEvent<T> {
    /// The consumer loop has started polling.
    Started,
    /// A task was popped and validated.
    Data(T),
    /// A task was popped but could not be parsed or validated, or a poll
    /// failed. The loop keeps going.
    Error(String),
    /// The consumer loop has exited.
    Stopped,
}

/// Cooperative stop switch for a running consumer loop.
///
/// Stopping takes effect at the next loop-top check, so a poll already in
/// flight finishes first.
#[derive(Debug, Clone)]
pub struct QueueStop {
    running: Arc<AtomicBool>,
}

impl QueueStop {
    /// Ask the consumer loop to exit.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Receives [`QueueEvent`]s from the consumer loop.
pub struct QueueObserver<T> {
    receiver: broadcast::Receiver<QueueEvent<T>>,
}

impl<T: Clone> QueueObserver<T> {
    /// Wait for the next event. Returns `None` once the service is gone.
    pub async fn recv(&mut self) -> Option<QueueEvent<T>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(count, "queue observer lagged, events dropped");
                }
            }
        }
    }
}

/// A named work queue bound to one connection and one task schema.
pub struct QueueService<S: Schema> {
    name: String,
    key: String,
    conn: Arc<Connection>,
    schema: Arc<S>,
    config: QueueConfig,
    sleeper: Arc<dyn Sleeper>,
    running: Arc<AtomicBool>,
    events: broadcast::Sender<QueueEvent<S::Value>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S> QueueService<S>
where
    S: Schema,
    S::Value: Clone,
{
    /// Create a queue with default pacing and the tokio sleeper.
    pub fn new(conn: Arc<Connection>, name: &str, schema: S) -> Self {
        Self::with_config(
            conn,
            name,
            schema,
            QueueConfig::default(),
            Arc::new(crate::sleeper::TokioSleeper),
        )
    }

    /// Create a queue with explicit pacing and sleeper.
    pub fn with_config(
        conn: Arc<Connection>,
        name: &str,
        schema: S,
        config: QueueConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            name: name.to_owned(),
            key: queue_key(name),
            conn,
            schema: Arc::new(schema),
            config,
            sleeper,
            running: Arc::new(AtomicBool::new(false)),
            events,
            worker: Mutex::new(None),
        }
    }

    /// The queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The backing list key, `queue:<name>`.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether a consumer loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Observe the consumer loop's events.
    #[must_use]
    pub fn observe(&self) -> QueueObserver<S::Value> {
        QueueObserver {
            receiver: self.events.subscribe(),
        }
    }

    /// Start the consumer loop.
    ///
    /// Starting an already-running queue is a no-op that returns another
    /// handle to the same stop switch.
    pub fn start(&self) -> QueueStop {
        let stop = QueueStop {
            running: Arc::clone(&self.running),
        };
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(queue = %self.name, "queue already running, start ignored");
            return stop;
        }

        let worker = tokio::spawn(consume(
            Arc::clone(&self.conn),
            self.key.clone(),
            Arc::clone(&self.schema),
            self.config.clone(),
            Arc::clone(&self.sleeper),
            Arc::clone(&self.running),
            self.events.clone(),
        ));
        if let Ok(mut slot) = self.worker.lock() {
            *slot = Some(worker);
        }
        debug!(queue = %self.name, "queue started");
        stop
    }

    /// Ask the consumer loop to exit at its next loop-top check.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Append a task to the tail of the queue.
    ///
    /// With `notify`, the serialized task is also published on the
    /// `queue:<name>` channel as a best-effort hint to anyone watching; the
    /// durable copy is the list item either way.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError`] if serialization or the list append fails.
    pub async fn put(&self, task: &S::Value, notify: bool) -> Result<(), QueueError>
    where
        S::Value: Serialize,
    {
        let payload = serde_json::to_string(task).map_err(SerializationError::from)?;
        self.conn
            .queue()?
            .push_back(&self.key, payload.clone())
            .await?;
        if notify {
            self.conn.publisher()?.publish(&self.key, payload).await?;
        }
        Ok(())
    }

    /// Number of tasks currently waiting.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transport`] if the length lookup fails.
    pub async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.conn.queue()?.list_len(&self.key).await?)
    }

    /// Whether the queue has no waiting tasks.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transport`] if the length lookup fails.
    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Drop the backing list and every task in it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Transport`] if the delete fails.
    pub async fn clear(&self) -> Result<(), QueueError> {
        Ok(self.conn.queue()?.delete(&self.key).await?)
    }
}

impl<S: Schema> Drop for QueueService<S> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.worker.lock() {
            if let Some(worker) = slot.take() {
                worker.abort();
            }
        }
    }
}

/// The consumer loop. One iteration: blocking pop, report the item (or the
/// failure), pace, repeat until the running flag clears.
async fn consume<S>(
    conn: Arc<Connection>,
    key: String,
    schema: Arc<S>,
    config: QueueConfig,
    sleeper: Arc<dyn Sleeper>,
    running: Arc<AtomicBool>,
    events: broadcast::Sender<QueueEvent<S::Value>>,
) where
    S: Schema,
    S::Value: Clone,
{
    let _ = events.send(QueueEvent::Started);
    while running.load(Ordering::SeqCst) {
        match poll_once(&conn, &key, schema.as_ref(), config.pop_timeout).await {
            Ok(Some(event)) => {
                let _ = events.send(event);
            }
            Ok(None) => {
                sleeper.sleep(config.idle_delay).await;
            }
            Err(e) => {
                // The unconditional loop delay below is the pacing; a failed
                // poll does not also count as an idle one.
                let _ = events.send(QueueEvent::Error(e.to_string()));
            }
        }
        sleeper.sleep(config.loop_delay).await;
    }
    let _ = events.send(QueueEvent::Stopped);
    debug!(%key, "queue consumer stopped");
}

/// One blocking pop. `Ok(None)` means the queue stayed empty for the whole
/// timeout; a popped item always yields an event, valid or not.
async fn poll_once<S>(
    conn: &Connection,
    key: &str,
    schema: &S,
    pop_timeout: Duration,
) -> Result<Option<QueueEvent<S::Value>>, QueueError>
where
    S: Schema,
{
    let Some(item) = conn.queue()?.pop_front(key, pop_timeout).await? else {
        return Ok(None);
    };
    let raw: serde_json::Value = match serde_json::from_str(&item) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(%key, error = %e, "queue item is not valid JSON");
            return Ok(Some(QueueEvent::Error(e.to_string())));
        }
    };
    match schema.validate(&raw) {
        Ok(task) => Ok(Some(QueueEvent::Data(task))),
        Err(e) => {
            warn!(%key, error = %e, "queue item failed validation");
            Ok(Some(QueueEvent::Error(e.to_string())))
        }
    }
}
