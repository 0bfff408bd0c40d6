use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::messages::{DescriptorKind, LocalIdentity, SignalDescriptor, SignalMessage};
use super::relay::{Relay, RelayChannel, RelayEvent, RelayLink};
use crate::error::{SessionError, SessionResult};

/// Inbound signaling event for the connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalEvent {
    IncomingInvite {
        from: LocalIdentity,
        descriptor: SignalDescriptor,
    },
    InviteAccepted {
        from: LocalIdentity,
        descriptor: SignalDescriptor,
    },
    PeerHungUp {
        from: LocalIdentity,
    },
    /// The relay channel dropped; the client is offline now
    RelayLost,
}

enum ConnectionState {
    Offline,
    Online {
        identity: LocalIdentity,
        link: Box<dyn RelayLink>,
        events: mpsc::UnboundedReceiver<RelayEvent>,
    },
}

/// Long-lived logical channel to the signaling relay
pub struct SignalingClient {
    relay: Arc<dyn Relay>,
    identity_timeout: Duration,
    state: ConnectionState,
}

impl SignalingClient {
    pub fn new(relay: Arc<dyn Relay>, identity_timeout: Duration) -> Self {
        Self {
            relay,
            identity_timeout,
            state: ConnectionState::Offline,
        }
    }

    /// Open the relay channel and wait for the relay to assign our identity
    ///
    /// Already-online clients keep their identity.
    pub async fn connect(&mut self) -> SessionResult<LocalIdentity> {
        if let ConnectionState::Online { identity, .. } = &self.state {
            return Ok(identity.clone());
        }

        info!("Connecting to signaling relay ({})", self.relay.name());

        let RelayChannel { link, mut events } = match self.relay.connect().await {
            Ok(channel) => channel,
            Err(e) => {
                warn!("Signaling relay unreachable: {}", e);
                return Err(e);
            }
        };

        let identity = match timeout(self.identity_timeout, events.recv()).await {
            Ok(Some(RelayEvent::Message(SignalMessage::IdentityAssigned { identity }))) => identity,
            Ok(other) => {
                link.close().await;
                return Err(SessionError::RelayUnreachable(format!(
                    "relay sent {:?} before assigning an identity",
                    other
                )));
            }
            Err(_) => {
                link.close().await;
                return Err(SessionError::RelayUnreachable(format!(
                    "no identity assigned within {:?}",
                    self.identity_timeout
                )));
            }
        };

        info!("Signaling online as {}", identity);

        self.state = ConnectionState::Online {
            identity: identity.clone(),
            link,
            events,
        };

        Ok(identity)
    }

    pub fn identity(&self) -> Option<&LocalIdentity> {
        match &self.state {
            ConnectionState::Online { identity, .. } => Some(identity),
            ConnectionState::Offline => None,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self.state, ConnectionState::Online { .. })
    }

    /// Forward an offer to `target`; acceptance arrives later as an event
    pub async fn send_invite(&self, target: &LocalIdentity, descriptor: SignalDescriptor) -> SessionResult<()> {
        descriptor
            .validate(DescriptorKind::Offer)
            .map_err(SessionError::NegotiationFailure)?;

        self.send(target, |from| SignalMessage::Invite {
            from,
            to: target.clone(),
            descriptor,
        })
        .await
    }

    /// Send our answer back to the inviter
    pub async fn send_answer(&self, target: &LocalIdentity, descriptor: SignalDescriptor) -> SessionResult<()> {
        descriptor
            .validate(DescriptorKind::Answer)
            .map_err(SessionError::NegotiationFailure)?;

        self.send(target, |from| SignalMessage::InviteAccepted {
            from,
            to: target.clone(),
            descriptor,
        })
        .await
    }

    /// Tell `target` the call is over (hang-up, reject or busy)
    pub async fn send_hangup(&self, target: &LocalIdentity) -> SessionResult<()> {
        self.send(target, |from| SignalMessage::CallEnded {
            from,
            to: target.clone(),
        })
        .await
    }

    async fn send(
        &self,
        target: &LocalIdentity,
        build: impl FnOnce(LocalIdentity) -> SignalMessage,
    ) -> SessionResult<()> {
        let ConnectionState::Online { identity, link, .. } = &self.state else {
            return Err(SessionError::RelayUnreachable(
                "signaling is offline".to_string(),
            ));
        };

        let message = build(identity.clone());
        link.send(target, &message).await
    }

    /// Wait for the next inbound event
    ///
    /// Cancel-safe. Never resolves while offline.
    pub async fn recv(&mut self) -> SignalEvent {
        loop {
            let event = match &mut self.state {
                ConnectionState::Online { events, .. } => events.recv().await,
                ConnectionState::Offline => std::future::pending().await,
            };

            match event {
                Some(RelayEvent::Message(message)) => {
                    if let Some(event) = self.translate(message) {
                        return event;
                    }
                }
                Some(RelayEvent::Lost) | None => {
                    warn!("Signaling relay channel lost");
                    self.drop_channel();
                    return SignalEvent::RelayLost;
                }
            }
        }
    }

    fn translate(&self, message: SignalMessage) -> Option<SignalEvent> {
        let me = self.identity()?;

        if let Some(to) = message.recipient() {
            if to != me {
                debug!("Dropping signaling message addressed to {}", to);
                return None;
            }
        }

        match message {
            SignalMessage::IdentityAssigned { identity } => {
                warn!("Ignoring identity re-assignment to {} (keeping {})", identity, me);
                None
            }
            SignalMessage::Invite { from, descriptor, .. } => {
                Some(SignalEvent::IncomingInvite { from, descriptor })
            }
            SignalMessage::InviteAccepted { from, descriptor, .. } => {
                Some(SignalEvent::InviteAccepted { from, descriptor })
            }
            SignalMessage::CallEnded { from, .. } => Some(SignalEvent::PeerHungUp { from }),
        }
    }

    fn drop_channel(&mut self) {
        if let ConnectionState::Online { link, .. } =
            std::mem::replace(&mut self.state, ConnectionState::Offline)
        {
            tokio::spawn(async move { link.close().await });
        }
    }

    /// Release the channel and forget the identity. Idempotent.
    pub async fn disconnect(&mut self) {
        if let ConnectionState::Online { identity, link, .. } =
            std::mem::replace(&mut self.state, ConnectionState::Offline)
        {
            link.close().await;
            info!("Signaling disconnected ({})", identity);
        }
    }
}
