//! # Instance Discovery
//!
//! The cooperative handshake that gates connection readiness. On connect an
//! instance announces `<name>:<clientId>` on `discovery:i_am`; peers answer
//! on `discovery:welcome` with `<theirName>:<announcedClientId>`.
//!
//! The handshake resolves on the first of two paths:
//!
//! - hearing our own announce echoed back (proves the transport
//!   round-trips), or
//! - observing a probable duplicate of our logical name. Collisions are
//!   warned about, never fatal: discovery is detection, not consensus.
//!
//! Duplicate detection is precise about direction: an incumbent flags when a
//! peer *announces* the incumbent's name, and a newcomer flags when a
//! same-named instance *welcomes* it. An instance's own welcome replies echo
//! back carrying its name next to a foreign id; those are its own messages
//! and never count as evidence.
//!
//! After the handshake the same subscriptions stay alive in a background
//! listener so this instance keeps welcoming later joiners and keeps
//! flagging duplicates for its own name.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use courier_types::channels::{DISCOVERY_I_AM, DISCOVERY_WELCOME};
use courier_types::{ClientId, InstanceName};

use crate::error::{ConnectError, TransportError};
use crate::ports::Transport;
use crate::subscription::RawSubscription;

/// How the discovery handshake resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// Our own announce was echoed back: the transport round-trips and no
    /// peer claimed our name within the window.
    SelfEcho,
    /// Another instance appears to be running under our logical name.
    /// Connect still succeeds.
    DuplicateName {
        /// The other instance's client id, when it announced itself to us.
        /// A duplicate detected through its welcome reply stays anonymous.
        peer: Option<ClientId>,
    },
}

/// Shared discovery state: handles both control channels, during the
/// handshake and in the background listener afterwards.
pub(crate) struct DiscoveryAgent {
    name: InstanceName,
    client_id: ClientId,
    publisher: Arc<dyn Transport>,
    duplicate_flagged: Arc<AtomicBool>,
}

impl DiscoveryAgent {
    pub(crate) fn new(
        name: InstanceName,
        client_id: ClientId,
        publisher: Arc<dyn Transport>,
        duplicate_flagged: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name,
            client_id,
            publisher,
            duplicate_flagged,
        }
    }

    /// Handle one `discovery:i_am` payload.
    async fn on_i_am(&self, payload: &str) -> Result<Option<DiscoveryOutcome>, TransportError> {
        let Some((peer_name, raw_id)) = payload.split_once(':') else {
            debug!(payload, "malformed i_am payload, ignored");
            return Ok(None);
        };
        if ClientId::parse(raw_id) == Some(self.client_id) {
            return Ok(Some(DiscoveryOutcome::SelfEcho));
        }
        debug!(peer = peer_name, id = raw_id, "instance discovered");
        self.publisher
            .publish(DISCOVERY_WELCOME, format!("{}:{raw_id}", self.name))
            .await?;
        if peer_name == self.name.as_str() {
            // A peer announced under our logical name.
            warn!(
                name = %self.name,
                peer = raw_id,
                "another instance with this logical name appears to be running"
            );
            self.duplicate_flagged.store(true, Ordering::Relaxed);
            return Ok(Some(DiscoveryOutcome::DuplicateName {
                peer: ClientId::parse(raw_id),
            }));
        }
        Ok(None)
    }

    /// Handle one `discovery:welcome` payload.
    ///
    /// A welcome embeds the id of the instance it is addressed to, so any
    /// payload whose id is not ours is someone else's business; that includes
    /// the echoes of our own welcome replies, which carry our name next to a
    /// foreign id.
    fn on_welcome(&self, payload: &str) -> Option<DiscoveryOutcome> {
        let Some((peer_name, raw_id)) = payload.split_once(':') else {
            debug!(payload, "malformed welcome payload, ignored");
            return None;
        };
        if ClientId::parse(raw_id)? != self.client_id {
            return None;
        }
        if peer_name == self.name.as_str() {
            // We never welcome our own announce (the self-echo short-circuits
            // first), so a welcome addressed to us under our own name can
            // only come from another live instance sharing it.
            warn!(
                name = %self.name,
                "another instance with this logical name appears to be running"
            );
            self.duplicate_flagged.store(true, Ordering::Relaxed);
            return Some(DiscoveryOutcome::DuplicateName { peer: None });
        }
        debug!(peer = peer_name, "welcomed by peer");
        None
    }
}

/// Run the discovery handshake: subscribe both control channels, announce,
/// and wait for a resolution path or the timeout.
///
/// On success the still-open control subscriptions are returned so the
/// caller can hand them to [`spawn_listener`].
pub(crate) async fn handshake(
    agent: &DiscoveryAgent,
    subscriber: &Arc<dyn Transport>,
    timeout: Duration,
) -> Result<(DiscoveryOutcome, RawSubscription, RawSubscription), ConnectError> {
    let mut i_am = subscriber.subscribe(DISCOVERY_I_AM).await?;
    let mut welcome = subscriber.subscribe(DISCOVERY_WELCOME).await?;

    agent
        .publisher
        .publish(
            DISCOVERY_I_AM,
            format!("{}:{}", agent.name, agent.client_id),
        )
        .await?;

    let deadline = sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            payload = i_am.recv() => {
                let payload = payload.ok_or(TransportError::ChannelClosed {
                    channel: DISCOVERY_I_AM.to_string(),
                })?;
                if let Some(outcome) = agent.on_i_am(&payload).await? {
                    return Ok((outcome, i_am, welcome));
                }
            }
            payload = welcome.recv() => {
                let payload = payload.ok_or(TransportError::ChannelClosed {
                    channel: DISCOVERY_WELCOME.to_string(),
                })?;
                if let Some(outcome) = agent.on_welcome(&payload) {
                    return Ok((outcome, i_am, welcome));
                }
            }
            () = &mut deadline => {
                return Err(ConnectError::HandshakeTimeout { timeout });
            }
        }
    }
}

/// Keep the discovery subscriptions alive after connect: welcome later
/// joiners and flag duplicates of our own name for the lifetime of the
/// connection.
pub(crate) fn spawn_listener(
    agent: DiscoveryAgent,
    mut i_am: RawSubscription,
    mut welcome: RawSubscription,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                payload = i_am.recv() => {
                    let Some(payload) = payload else { break };
                    if let Err(e) = agent.on_i_am(&payload).await {
                        warn!(error = %e, "discovery welcome reply failed");
                    }
                }
                payload = welcome.recv() => {
                    let Some(payload) = payload else { break };
                    agent.on_welcome(&payload);
                }
            }
        }
        debug!(name = %agent.name, "discovery listener stopped");
    })
}
