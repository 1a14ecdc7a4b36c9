//! # In-Memory Broker
//!
//! An in-process backing store implementing the transport ports with
//! `tokio::sync::broadcast` channels for pub/sub and notified `VecDeque`s
//! for lists. Suitable for single-node operation and for tests that run
//! several connection contexts against one broker; distributed deployments
//! would use a different backend behind the same ports.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::TransportError;
use crate::lifecycle::{LifecycleEvent, LifecycleEvents, Side};
use crate::ports::{Backend, Transport, TransportRole};
use crate::subscription::{RawSubscription, SUBSCRIPTION_BUFFER};

/// Buffered payloads per channel before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 1024;

/// A cheap, cloneable handle to one in-process broker. Every clone shares
/// the same channels and lists.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

#[derive(Debug, Default)]
struct BrokerInner {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
    lists: Mutex<HashMap<String, ListState>>,
}

#[derive(Debug, Default)]
struct ListState {
    items: VecDeque<String>,
    notify: Arc<Notify>,
}

impl MemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .lock()
            .ok()
            .and_then(|channels| channels.get(channel).map(broadcast::Sender::receiver_count))
            .unwrap_or(0)
    }

    fn channels(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, broadcast::Sender<String>>>, TransportError> {
        self.inner
            .channels
            .lock()
            .map_err(|_| TransportError::Backend("channel table lock poisoned".to_string()))
    }

    fn lists(&self) -> Result<MutexGuard<'_, HashMap<String, ListState>>, TransportError> {
        self.inner
            .lists
            .lock()
            .map_err(|_| TransportError::Backend("list table lock poisoned".to_string()))
    }

    fn sender(&self, channel: &str) -> Result<broadcast::Sender<String>, TransportError> {
        let mut channels = self.channels()?;
        let sender = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(sender.clone())
    }

    fn publish_raw(&self, channel: &str, payload: String) -> Result<(), TransportError> {
        let sender = self.sender(channel)?;
        match sender.send(payload) {
            Ok(receivers) => debug!(channel, receivers, "payload published"),
            Err(_) => debug!(channel, "payload dropped (no subscribers)"),
        }
        Ok(())
    }

    fn subscribe_raw(&self, channel: &str) -> Result<RawSubscription, TransportError> {
        let mut source = self.sender(channel)?.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let name = channel.to_string();
        tokio::spawn(async move {
            loop {
                let payload = match source.recv().await {
                    Ok(payload) => payload,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        debug!(channel = %name, lagged = count, "subscriber lagged, payloads dropped");
                        continue;
                    }
                };
                // The handle was dropped: unsubscribe.
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });
        Ok(RawSubscription::new(channel, rx))
    }

    fn push_raw(&self, list: &str, item: String) -> Result<(), TransportError> {
        let mut lists = self.lists()?;
        let state = lists.entry(list.to_string()).or_default();
        state.items.push_back(item);
        state.notify.notify_one();
        Ok(())
    }

    async fn pop_raw(
        &self,
        list: &str,
        timeout: Duration,
    ) -> Result<Option<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notify = {
                let mut lists = self.lists()?;
                let state = lists.entry(list.to_string()).or_default();
                if let Some(item) = state.items.pop_front() {
                    return Ok(Some(item));
                }
                Arc::clone(&state.notify)
            };

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            // notify_one stores a permit when no task is waiting, so a push
            // between the check above and this await is not lost.
            tokio::select! {
                () = notify.notified() => {}
                () = sleep(remaining) => return Ok(None),
            }
        }
    }
}

/// One opened handle onto a [`MemoryBroker`].
#[derive(Debug)]
struct MemoryTransport {
    broker: MemoryBroker,
    role: TransportRole,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), TransportError> {
        debug!(role = ?self.role, channel, "publish");
        self.broker.publish_raw(channel, payload)
    }

    async fn subscribe(&self, channel: &str) -> Result<RawSubscription, TransportError> {
        debug!(role = ?self.role, channel, "subscribe");
        self.broker.subscribe_raw(channel)
    }

    async fn push_back(&self, list: &str, item: String) -> Result<(), TransportError> {
        self.broker.push_raw(list, item)
    }

    async fn pop_front(
        &self,
        list: &str,
        timeout: Duration,
    ) -> Result<Option<String>, TransportError> {
        self.broker.pop_raw(list, timeout).await
    }

    async fn list_len(&self, list: &str) -> Result<usize, TransportError> {
        let lists = self.broker.lists()?;
        Ok(lists.get(list).map_or(0, |state| state.items.len()))
    }

    async fn delete(&self, list: &str) -> Result<(), TransportError> {
        let mut lists = self.broker.lists()?;
        lists.remove(list);
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBroker {
    async fn open(
        &self,
        role: TransportRole,
        lifecycle: LifecycleEvents,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        match role {
            TransportRole::Publisher => {
                lifecycle.emit(LifecycleEvent::Connected(Side::Publisher));
            }
            TransportRole::Subscriber => {
                lifecycle.emit(LifecycleEvent::Connected(Side::Subscriber));
            }
            TransportRole::Queue => {}
        }
        Ok(Arc::new(MemoryTransport {
            broker: self.clone(),
            role,
        }))
    }
}
