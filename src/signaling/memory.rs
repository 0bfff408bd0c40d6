use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::{LocalIdentity, SignalMessage};
use super::relay::{Relay, RelayChannel, RelayEvent, RelayLink};
use crate::error::{SessionError, SessionResult};

struct Hub {
    next_id: u64,
    online: bool,
    clients: HashMap<LocalIdentity, mpsc::UnboundedSender<RelayEvent>>,
}

/// In-process relay hub
///
/// Assigns sequential `peer-<n>` identities and routes messages between the
/// channels it opened, preserving per-sender order.
#[derive(Clone)]
pub struct MemoryRelay {
    hub: Arc<Mutex<Hub>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// First assigned identity will be `peer-<first>`
    pub fn starting_at(first: u64) -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub {
                next_id: first,
                online: true,
                clients: HashMap::new(),
            })),
        }
    }

    /// Take the relay down (every open channel is lost) or bring it back
    pub fn set_online(&self, online: bool) {
        let mut hub = self.hub.lock();
        hub.online = online;

        if !online {
            for (identity, tx) in hub.clients.drain() {
                debug!("Memory relay dropping {}", identity);
                let _ = tx.send(RelayEvent::Lost);
            }
        }
    }

    /// Drop a single client's channel, as if its connection died
    pub fn drop_client(&self, identity: &LocalIdentity) -> bool {
        match self.hub.lock().clients.remove(identity) {
            Some(tx) => {
                let _ = tx.send(RelayEvent::Lost);
                true
            }
            None => false,
        }
    }

    /// Identities with an open channel
    pub fn connected(&self) -> Vec<LocalIdentity> {
        self.hub.lock().clients.keys().cloned().collect()
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn connect(&self) -> SessionResult<RelayChannel> {
        let (tx, rx) = mpsc::unbounded_channel();

        let identity = {
            let mut hub = self.hub.lock();
            if !hub.online {
                return Err(SessionError::RelayUnreachable(
                    "memory relay is offline".to_string(),
                ));
            }

            let identity = LocalIdentity::new(format!("peer-{}", hub.next_id));
            hub.next_id += 1;

            let _ = tx.send(RelayEvent::Message(SignalMessage::IdentityAssigned {
                identity: identity.clone(),
            }));
            hub.clients.insert(identity.clone(), tx);
            identity
        };

        info!("Memory relay opened channel for {}", identity);

        Ok(RelayChannel {
            link: Box::new(MemoryLink {
                hub: Arc::clone(&self.hub),
                identity,
            }),
            events: rx,
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemoryLink {
    hub: Arc<Mutex<Hub>>,
    identity: LocalIdentity,
}

#[async_trait]
impl RelayLink for MemoryLink {
    async fn send(&self, to: &LocalIdentity, message: &SignalMessage) -> SessionResult<()> {
        let mut hub = self.hub.lock();

        if !hub.online || !hub.clients.contains_key(&self.identity) {
            return Err(SessionError::RelayUnreachable(format!(
                "{} has no open relay channel",
                self.identity
            )));
        }

        let delivered = hub
            .clients
            .get(to)
            .map(|tx| tx.send(RelayEvent::Message(message.clone())).is_ok());

        match delivered {
            Some(true) => {}
            Some(false) => {
                hub.clients.remove(to);
                debug!("Memory relay: {} went away, message dropped", to);
            }
            // Unknown recipients are dropped silently, like a real relay
            None => debug!("Memory relay: no client {}, message dropped", to),
        }

        Ok(())
    }

    async fn close(&self) {
        self.hub.lock().clients.remove(&self.identity);
    }
}
