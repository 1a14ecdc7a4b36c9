//! # Listening Services
//!
//! A listening service subscribes to `channel:<name>` and dispatches
//! schema-validated events to local listeners. One pump task per service
//! parses, decodes, and fans out deliveries, so handlers for one service
//! never run concurrently with the pump and see events in arrival order.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use courier_transport::{Connection, RawSubscription};
use courier_types::channels::event_channel;
use courier_types::{DecodeOutcome, Envelope, EventSet, InstanceName};

use crate::error::ServiceError;
use crate::registry::ServiceRegistry;

/// Buffered deliveries per listener before it starts lagging.
const SERVICE_CAPACITY: usize = 256;

/// One validated event as dispatched to listeners.
#[derive(Debug, Clone)]
pub struct Delivery<E> {
    /// The decoded event.
    pub event: E,
    /// The emitter's timestamp.
    pub date: OffsetDateTime,
    /// The emitter's message counter value.
    pub id: i64,
}

/// Selects which events a listener receives, by event name.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    names: Option<Vec<&'static str>>,
}

impl EventFilter {
    /// Match every event of the service's set.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to the given event names.
    #[must_use]
    pub fn events(names: impl Into<Vec<&'static str>>) -> Self {
        Self {
            names: Some(names.into()),
        }
    }

    /// Whether an event name passes this filter.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.names
            .as_ref()
            .is_none_or(|names| names.contains(&name))
    }
}

/// A named, schema-typed subscriber dispatching validated events to local
/// listeners.
pub struct ListeningService<E: EventSet> {
    name: InstanceName,
    sender: broadcast::Sender<Delivery<E>>,
    pump: JoinHandle<()>,
}

impl<E: EventSet> ListeningService<E> {
    /// Register a new service. Hard uniqueness: an occupied name is an
    /// error. Name validation happens before any subscription is created.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::InvalidName`] if `name` contains `:`.
    /// - [`ServiceError::ReservedName`] if `name` equals the instance name.
    /// - [`ServiceError::DuplicateName`] if the name is taken.
    /// - [`ServiceError::Transport`] if subscribing fails.
    pub async fn new(
        conn: &Connection,
        registry: &ServiceRegistry,
        name: &str,
    ) -> Result<Arc<Self>, ServiceError> {
        let name = InstanceName::new(name)?;
        if name == *conn.name() {
            return Err(ServiceError::ReservedName {
                name: name.as_str().to_string(),
            });
        }
        if registry.contains(name.as_str()) {
            return Err(ServiceError::DuplicateName {
                name: name.as_str().to_string(),
            });
        }

        let subscription = conn
            .subscriber()?
            .subscribe(&event_channel(&name))
            .await?;
        let (sender, _) = broadcast::channel(SERVICE_CAPACITY);
        let pump = spawn_pump::<E>(name.clone(), subscription, sender.clone());

        let service = Arc::new(Self { name, sender, pump });
        registry.insert_new(
            service.name.as_str(),
            Arc::clone(&service) as Arc<dyn std::any::Any + Send + Sync>,
        )?;
        debug!(service = %service.name, "listening service registered");
        Ok(service)
    }

    /// Fetch-or-create: an existing service of the same name (and event
    /// set) is returned with a warning instead of creating a duplicate
    /// subscription. Invalid and reserved names fail regardless.
    ///
    /// # Errors
    ///
    /// As [`ListeningService::new`]; additionally, a name registered under
    /// a different event-set type is reported as a duplicate.
    pub async fn create(
        conn: &Connection,
        registry: &ServiceRegistry,
        name: &str,
    ) -> Result<Arc<Self>, ServiceError> {
        let validated = InstanceName::new(name)?;
        if validated == *conn.name() {
            return Err(ServiceError::ReservedName {
                name: name.to_string(),
            });
        }
        if let Some(existing) = registry.get(name) {
            return match existing.downcast::<Self>() {
                Ok(service) => {
                    warn!(service = name, "service already exists, returning it");
                    Ok(service)
                }
                Err(_) => Err(ServiceError::DuplicateName {
                    name: name.to_string(),
                }),
            };
        }
        Self::new(conn, registry, name).await
    }

    /// The service name.
    #[must_use]
    pub fn name(&self) -> &InstanceName {
        &self.name
    }

    /// Register a persistent listener for events matching `filter`.
    #[must_use]
    pub fn listen(&self, filter: EventFilter) -> Listener<E> {
        Listener {
            receiver: Some(self.sender.subscribe()),
            filter,
        }
    }

    /// Wait for a single matching event, then unregister: the
    /// listen-once pattern.
    pub async fn next(&self, filter: EventFilter) -> Option<Delivery<E>> {
        self.listen(filter).recv().await
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: EventSet> Drop for ListeningService<E> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

impl<E: EventSet> std::fmt::Debug for ListeningService<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListeningService")
            .field("name", &self.name)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// A registered listener. Cancel (or drop) to unregister.
pub struct Listener<E: EventSet> {
    receiver: Option<broadcast::Receiver<Delivery<E>>>,
    filter: EventFilter,
}

impl<E: EventSet> Listener<E> {
    /// Receive the next matching delivery, in arrival order.
    ///
    /// Returns `None` after cancellation or once the service is gone.
    pub async fn recv(&mut self) -> Option<Delivery<E>> {
        let receiver = self.receiver.as_mut()?;
        loop {
            let delivery = match receiver.recv().await {
                Ok(delivery) => delivery,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(lagged = count, "listener lagged, deliveries dropped");
                    continue;
                }
            };
            if self.filter.matches(delivery.event.event_name()) {
                return Some(delivery);
            }
        }
    }

    /// Unregister. Idempotent: returns whether a registration was actually
    /// removed.
    pub fn cancel(&mut self) -> bool {
        self.receiver.take().is_some()
    }
}

fn spawn_pump<E: EventSet>(
    name: InstanceName,
    mut subscription: RawSubscription,
    sender: broadcast::Sender<Delivery<E>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(payload) = subscription.recv().await {
            dispatch::<E>(&name, &payload, &sender);
        }
        debug!(service = %name, "service pump stopped");
    })
}

/// Decode one raw payload and fan it out. Parse and validation failures
/// are logged and dropped; they never escape the pump.
fn dispatch<E: EventSet>(
    name: &InstanceName,
    payload: &str,
    sender: &broadcast::Sender<Delivery<E>>,
) {
    let envelope: Envelope = match serde_json::from_str(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(service = %name, error = %e, "malformed envelope dropped");
            return;
        }
    };
    match E::decode(&envelope.event, &envelope.data) {
        DecodeOutcome::Event(event) => {
            let delivery = Delivery {
                event,
                date: envelope.date,
                id: envelope.id,
            };
            if sender.send(delivery).is_err() {
                debug!(service = %name, event = %envelope.event, "delivery dropped (no listeners)");
            }
        }
        DecodeOutcome::UnknownEvent => {
            debug!(service = %name, event = %envelope.event, "unknown event dropped");
        }
        DecodeOutcome::Invalid(e) => {
            warn!(service = %name, event = %envelope.event, error = %e, "invalid payload dropped");
        }
    }
}
