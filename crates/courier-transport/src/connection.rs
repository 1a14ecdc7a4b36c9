//! # Connection Context
//!
//! The single owning context for everything process-wide: instance
//! identity, the three transport handles, the message-id counter, and the
//! lifecycle observer. A [`Connection`] is constructed once at startup and
//! passed explicitly to every component that needs it, so two independent
//! contexts can coexist in one test process.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use courier_types::{ClientId, InstanceName};

use crate::discovery::{self, DiscoveryAgent, DiscoveryOutcome};
use crate::error::{ConnectError, TransportError};
use crate::lifecycle::{LifecycleEvent, LifecycleEvents, Side};
use crate::ports::{Backend, Transport, TransportRole};

/// Connection tuning. All values default to the wire-compatible defaults.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Window for the discovery handshake to resolve.
    pub handshake_timeout: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(1000),
        }
    }
}

#[derive(Default)]
struct ConnState {
    publisher: Option<Arc<dyn Transport>>,
    subscriber: Option<Arc<dyn Transport>>,
    queue: Option<Arc<dyn Transport>>,
    /// Discovery completed for the current handles.
    ready: bool,
    outcome: Option<DiscoveryOutcome>,
    discovery_task: Option<JoinHandle<()>>,
}

impl ConnState {
    fn is_open(&self) -> bool {
        self.publisher.is_some() && self.subscriber.is_some() && self.queue.is_some()
    }
}

/// A connected instance: three transport handles plus identity, counter,
/// and lifecycle events.
pub struct Connection {
    name: InstanceName,
    client_id: ClientId,
    backend: Arc<dyn Backend>,
    config: ConnectConfig,
    lifecycle: LifecycleEvents,
    message_id: AtomicI64,
    duplicate_flagged: Arc<AtomicBool>,
    state: Mutex<ConnState>,
}

impl Connection {
    /// Build a context without touching the backend. The name is validated
    /// before any I/O.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::InvalidName`] if `name` contains `:`.
    pub fn new(
        backend: Arc<dyn Backend>,
        name: &str,
        config: ConnectConfig,
    ) -> Result<Arc<Self>, ConnectError> {
        let name = InstanceName::new(name)?;
        Ok(Arc::new(Self {
            name,
            client_id: ClientId::generate(),
            backend,
            config,
            lifecycle: LifecycleEvents::new(),
            message_id: AtomicI64::new(0),
            duplicate_flagged: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(ConnState::default()),
        }))
    }

    /// Build a context and open it: the common one-call entry point.
    ///
    /// # Errors
    ///
    /// Propagates name validation, transport, and handshake errors. Callers
    /// that want to retry a handshake timeout against still-open handles
    /// should use [`Connection::new`] + [`Connection::open`] instead, since
    /// an error here drops the context.
    pub async fn connect(
        backend: Arc<dyn Backend>,
        name: &str,
        config: ConnectConfig,
    ) -> Result<Arc<Self>, ConnectError> {
        let conn = Self::new(backend, name, config)?;
        conn.open().await?;
        Ok(conn)
    }

    /// Open the three transport handles (if not already open) and run the
    /// discovery handshake (if not already resolved).
    ///
    /// Idempotent: a call on an open, ready connection is a no-op. The
    /// guard is the already-open check itself, not a lock; concurrent
    /// callers in the single-threaded cooperative model interleave at the
    /// awaits and observe each other's installed handles.
    ///
    /// # Errors
    ///
    /// On [`ConnectError::HandshakeTimeout`] the handles stay open; the
    /// caller decides whether to retry or [`Connection::disconnect`].
    pub async fn open(&self) -> Result<DiscoveryOutcome, ConnectError> {
        if let Some(outcome) = self.ready_outcome() {
            debug!(name = %self.name, "already connected and ready");
            return Ok(outcome);
        }

        if !self.is_open() {
            let publisher = self
                .backend
                .open(TransportRole::Publisher, self.lifecycle.clone())
                .await?;
            let subscriber = self
                .backend
                .open(TransportRole::Subscriber, self.lifecycle.clone())
                .await?;
            let queue = self
                .backend
                .open(TransportRole::Queue, self.lifecycle.clone())
                .await?;
            self.install(publisher, subscriber, queue);
        }

        self.run_discovery().await
    }

    /// Replace all three handles as a unit and redo the handshake. From the
    /// caller's point of view there is no partial-reconnect state: the swap
    /// happens in one step once the new handles are open.
    ///
    /// # Errors
    ///
    /// Propagates transport and handshake errors.
    pub async fn reconnect(&self) -> Result<DiscoveryOutcome, ConnectError> {
        let publisher = self
            .backend
            .open(TransportRole::Publisher, self.lifecycle.clone())
            .await?;
        let subscriber = self
            .backend
            .open(TransportRole::Subscriber, self.lifecycle.clone())
            .await?;
        let queue = self
            .backend
            .open(TransportRole::Queue, self.lifecycle.clone())
            .await?;

        self.install(publisher, subscriber, queue);
        self.lifecycle
            .emit(LifecycleEvent::Reconnected(Side::Publisher));
        self.lifecycle
            .emit(LifecycleEvent::Reconnected(Side::Subscriber));

        self.run_discovery().await
    }

    /// Tear down the publish and subscribe handles. Idempotent; never
    /// fails on repeated calls. The queue handle stays usable.
    pub async fn disconnect(&self) {
        let (had_pub, had_sub, task) = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            let had_pub = state.publisher.take().is_some();
            let had_sub = state.subscriber.take().is_some();
            state.ready = false;
            state.outcome = None;
            (had_pub, had_sub, state.discovery_task.take())
        };
        if let Some(task) = task {
            task.abort();
        }
        if had_pub {
            self.lifecycle
                .emit(LifecycleEvent::Disconnected(Side::Publisher));
        }
        if had_sub {
            self.lifecycle
                .emit(LifecycleEvent::Disconnected(Side::Subscriber));
        }
        debug!(name = %self.name, "disconnected");
    }

    /// The logical instance name, set exactly once at construction.
    #[must_use]
    pub fn name(&self) -> &InstanceName {
        &self.name
    }

    /// This process's unique client id.
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Next value of the process-local message counter. Advisory only;
    /// counts up from 0 here, but peers may count from below zero.
    #[must_use]
    pub fn next_message_id(&self) -> i64 {
        self.message_id.fetch_add(1, Ordering::Relaxed)
    }

    /// The lifecycle event hub for this connection.
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleEvents {
        &self.lifecycle
    }

    /// How discovery resolved for the current handles, if it has.
    #[must_use]
    pub fn discovery(&self) -> Option<DiscoveryOutcome> {
        self.state.lock().ok().and_then(|state| state.outcome)
    }

    /// Whether a probable duplicate of this logical name has been observed,
    /// during the handshake or since.
    #[must_use]
    pub fn duplicate_name_flagged(&self) -> bool {
        self.duplicate_flagged.load(Ordering::Relaxed)
    }

    /// Whether all three handles are open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().is_ok_and(|state| state.is_open())
    }

    /// The publishing handle.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] after a disconnect.
    pub fn publisher(&self) -> Result<Arc<dyn Transport>, TransportError> {
        self.handle(|state| state.publisher.clone())
    }

    /// The subscribing handle.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] after a disconnect.
    pub fn subscriber(&self) -> Result<Arc<dyn Transport>, TransportError> {
        self.handle(|state| state.subscriber.clone())
    }

    /// The queue (list operations) handle.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] if the handle was never
    /// opened.
    pub fn queue(&self) -> Result<Arc<dyn Transport>, TransportError> {
        self.handle(|state| state.queue.clone())
    }

    fn handle(
        &self,
        pick: impl FnOnce(&ConnState) -> Option<Arc<dyn Transport>>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        self.state
            .lock()
            .ok()
            .and_then(|state| pick(&state))
            .ok_or(TransportError::NotConnected)
    }

    fn ready_outcome(&self) -> Option<DiscoveryOutcome> {
        self.state
            .lock()
            .ok()
            .filter(|state| state.ready && state.is_open())
            .and_then(|state| state.outcome)
    }

    fn install(
        &self,
        publisher: Arc<dyn Transport>,
        subscriber: Arc<dyn Transport>,
        queue: Arc<dyn Transport>,
    ) {
        let Ok(mut state) = self.state.lock() else {
            warn!("connection state lock poisoned, handles not installed");
            return;
        };
        if let Some(task) = state.discovery_task.take() {
            task.abort();
        }
        state.publisher = Some(publisher);
        state.subscriber = Some(subscriber);
        state.queue = Some(queue);
        state.ready = false;
        state.outcome = None;
    }

    async fn run_discovery(&self) -> Result<DiscoveryOutcome, ConnectError> {
        let publisher = self.publisher()?;
        let subscriber = self.subscriber()?;

        let agent = DiscoveryAgent::new(
            self.name.clone(),
            self.client_id,
            publisher,
            Arc::clone(&self.duplicate_flagged),
        );
        let (outcome, i_am, welcome) =
            discovery::handshake(&agent, &subscriber, self.config.handshake_timeout).await?;
        let task = discovery::spawn_listener(agent, i_am, welcome);

        if let Ok(mut state) = self.state.lock() {
            if let Some(previous) = state.discovery_task.replace(task) {
                previous.abort();
            }
            state.ready = true;
            state.outcome = Some(outcome);
        }
        debug!(name = %self.name, client_id = %self.client_id, ?outcome, "connected");
        Ok(outcome)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(task) = state.discovery_task.take() {
                task.abort();
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
