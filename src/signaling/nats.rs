use async_nats::{Client, ConnectOptions, Event};
use async_trait::async_trait;
use futures::stream::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::messages::{LocalIdentity, SignalMessage};
use super::relay::{Relay, RelayChannel, RelayEvent, RelayLink};
use crate::config::RelayConfig;
use crate::error::{SessionError, SessionResult};

/// Relay backed by a NATS server
///
/// The server-assigned client id becomes the local identity; every client
/// listens on `<prefix>.<identity>`.
pub struct NatsRelay {
    config: RelayConfig,
}

impl NatsRelay {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }
}

fn subject_for(prefix: &str, identity: &LocalIdentity) -> String {
    format!("{}.{}", prefix, identity)
}

#[async_trait]
impl Relay for NatsRelay {
    async fn connect(&self) -> SessionResult<RelayChannel> {
        info!("Connecting to NATS relay at {}", self.config.url);

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let lost_tx = events_tx.clone();
        let options = ConnectOptions::new()
            .connection_timeout(self.config.connect_timeout())
            .event_callback(move |event| {
                let lost_tx = lost_tx.clone();
                async move {
                    match event {
                        Event::Disconnected => {
                            warn!("NATS relay connection lost");
                            let _ = lost_tx.send(RelayEvent::Lost);
                        }
                        other => info!("NATS relay event: {:?}", other),
                    }
                }
            });

        let client = options
            .connect(self.config.url.as_str())
            .await
            .map_err(|e| SessionError::RelayUnreachable(e.to_string()))?;

        let identity = LocalIdentity::new(format!("peer-{}", client.server_info().client_id));
        let subject = subject_for(&self.config.subject_prefix, &identity);

        let mut subscriber = client
            .subscribe(subject.clone())
            .await
            .map_err(|e| SessionError::RelayUnreachable(e.to_string()))?;

        info!("Subscribed to {} as {}", subject, identity);

        // The server assigned the id in its INFO frame; deliver it first
        let _ = events_tx.send(RelayEvent::Message(SignalMessage::IdentityAssigned {
            identity,
        }));

        let forward_task = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<SignalMessage>(&msg.payload) {
                    Ok(message) => {
                        if events_tx.send(RelayEvent::Message(message)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to parse signaling message: {}", e);
                    }
                }
            }

            let _ = events_tx.send(RelayEvent::Lost);
        });

        Ok(RelayChannel {
            link: Box::new(NatsLink {
                client,
                subject_prefix: self.config.subject_prefix.clone(),
                forward_task: Mutex::new(Some(forward_task)),
            }),
            events: events_rx,
        })
    }

    fn name(&self) -> &str {
        "nats"
    }
}

struct NatsLink {
    client: Client,
    subject_prefix: String,
    forward_task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl RelayLink for NatsLink {
    async fn send(&self, to: &LocalIdentity, message: &SignalMessage) -> SessionResult<()> {
        let subject = subject_for(&self.subject_prefix, to);
        let payload = serde_json::to_vec(message)
            .map_err(|e| SessionError::NegotiationFailure(e.to_string()))?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| SessionError::RelayUnreachable(e.to_string()))?;

        info!("Published signaling message to {}", subject);
        Ok(())
    }

    async fn close(&self) {
        let task = self.forward_task.lock().take();
        if let Some(task) = task {
            task.abort();
        }
        if let Err(e) = self.client.flush().await {
            warn!("Failed to flush NATS relay on close: {}", e);
        }
        info!("Closed NATS relay channel");
    }
}
