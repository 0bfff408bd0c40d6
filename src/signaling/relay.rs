use async_trait::async_trait;
use tokio::sync::mpsc;

use super::messages::{LocalIdentity, SignalMessage};
use crate::error::SessionResult;

/// Something that happened on the relay channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Message(SignalMessage),
    /// The channel dropped; the identity is no longer routable
    Lost,
}

/// Outbound half of an open relay channel
#[async_trait]
pub trait RelayLink: Send + Sync {
    /// Route a message to `to` through the relay
    async fn send(&self, to: &LocalIdentity, message: &SignalMessage) -> SessionResult<()>;

    /// Tear the channel down
    async fn close(&self);
}

/// An open relay channel
///
/// The first event on `events` is expected to be `identity-assigned`.
pub struct RelayChannel {
    pub link: Box<dyn RelayLink>,
    pub events: mpsc::UnboundedReceiver<RelayEvent>,
}

/// Relay backend trait
///
/// Implementations:
/// - `NatsRelay`: NATS server, one subject per identity
/// - `MemoryRelay`: in-process hub (tests, local demos)
#[async_trait]
pub trait Relay: Send + Sync {
    /// Open a channel; fails with `RelayUnreachable`
    async fn connect(&self) -> SessionResult<RelayChannel>;

    /// Get backend name for logging
    fn name(&self) -> &str;
}
