use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::peer::{PeerLink, PeerLinkFactory};
use crate::config::IceConfig;
use crate::error::{SessionError, SessionResult};
use crate::media::{MediaFeed, MediaTrackState, TrackKind};
use crate::signaling::SignalDescriptor;

fn negotiation(e: impl std::fmt::Display) -> SessionError {
    SessionError::NegotiationFailure(e.to_string())
}

/// Add the `stun:` scheme to bare `host:port` entries
pub fn normalize_ice_url(url: &str) -> String {
    const SCHEMES: [&str; 4] = ["stun:", "stuns:", "turn:", "turns:"];

    if SCHEMES.iter().any(|s| url.starts_with(s)) {
        url.to_string()
    } else {
        format!("stun:{}", url)
    }
}

/// WebRTC peer links
pub struct RtcPeerFactory {
    ice: IceConfig,
}

impl RtcPeerFactory {
    pub fn new(ice: IceConfig) -> Self {
        Self { ice }
    }

    fn rtc_config(&self) -> RTCConfiguration {
        let urls: Vec<String> = self.ice.servers.iter().map(|u| normalize_ice_url(u)).collect();

        RTCConfiguration {
            ice_servers: if urls.is_empty() {
                Vec::new()
            } else {
                vec![RTCIceServer {
                    urls,
                    ..Default::default()
                }]
            },
            ..Default::default()
        }
    }
}

#[async_trait]
impl PeerLinkFactory for RtcPeerFactory {
    async fn create(
        &self,
        tracks: &[MediaTrackState],
        feed: Option<MediaFeed>,
    ) -> SessionResult<Box<dyn PeerLink>> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(negotiation)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(negotiation)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(
            api.new_peer_connection(self.rtc_config())
                .await
                .map_err(negotiation)?,
        );

        // One outgoing track per acquired kind, whether or not it is enabled,
        // so toggling later never needs a new negotiation
        let mut outgoing: HashMap<TrackKind, Arc<TrackLocalStaticSample>> = HashMap::new();
        for track in tracks {
            let mime_type = match track.kind {
                TrackKind::Audio => MIME_TYPE_OPUS,
                TrackKind::Video => MIME_TYPE_VP8,
            };

            let local = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: mime_type.to_owned(),
                    ..Default::default()
                },
                track.kind.as_str().to_owned(),
                "mirror-session".to_owned(),
            ));

            pc.add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(negotiation)?;
            outgoing.insert(track.kind, local);
        }

        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            info!("Peer connection state changed to: {}", state);
            Box::pin(async {})
        }));

        let writer = feed.map(|feed| spawn_sample_writer(feed, outgoing));

        Ok(Box::new(RtcPeerLink {
            pc,
            gather_timeout: self.ice.gather_timeout(),
            writer,
        }))
    }
}

/// Write gated local frames onto the outgoing tracks
fn spawn_sample_writer(
    feed: MediaFeed,
    outgoing: HashMap<TrackKind, Arc<TrackLocalStaticSample>>,
) -> JoinHandle<()> {
    let mut rx = feed.into_receiver();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(frame) => {
                    let Some(track) = outgoing.get(&frame.kind) else {
                        continue;
                    };
                    let sample = Sample {
                        data: frame.data,
                        duration: Duration::from_millis(frame.duration_ms),
                        ..Default::default()
                    };
                    if let Err(e) = track.write_sample(&sample).await {
                        debug!("Failed to write {} sample: {}", frame.kind.as_str(), e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Peer sample writer lagged, skipped {} frames", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

struct RtcPeerLink {
    pc: Arc<RTCPeerConnection>,
    gather_timeout: Duration,
    writer: Option<JoinHandle<()>>,
}

impl RtcPeerLink {
    /// Wait for candidate gathering so the descriptor is complete
    async fn wait_for_gathering(&self, mut gathered: mpsc::Receiver<()>) {
        if timeout(self.gather_timeout, gathered.recv()).await.is_err() {
            warn!(
                "ICE gathering incomplete after {:?}, sending the candidates found so far",
                self.gather_timeout
            );
        }
    }

    async fn complete_local_description(&self) -> SessionResult<String> {
        self.pc
            .local_description()
            .await
            .map(|d| d.sdp)
            .ok_or_else(|| negotiation("no local description after gathering"))
    }
}

#[async_trait]
impl PeerLink for RtcPeerLink {
    async fn create_offer(&mut self) -> SessionResult<SignalDescriptor> {
        let offer = self.pc.create_offer(None).await.map_err(negotiation)?;
        let gathered = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(offer).await.map_err(negotiation)?;
        self.wait_for_gathering(gathered).await;

        let sdp = self.complete_local_description().await?;
        info!("Created offer ({} bytes)", sdp.len());
        Ok(SignalDescriptor::offer(sdp))
    }

    async fn accept_offer(&mut self, offer: &SignalDescriptor) -> SessionResult<SignalDescriptor> {
        let remote = RTCSessionDescription::offer(offer.sdp.clone()).map_err(negotiation)?;
        self.pc.set_remote_description(remote).await.map_err(negotiation)?;

        let answer = self.pc.create_answer(None).await.map_err(negotiation)?;
        let gathered = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(answer).await.map_err(negotiation)?;
        self.wait_for_gathering(gathered).await;

        let sdp = self.complete_local_description().await?;
        info!("Created answer ({} bytes)", sdp.len());
        Ok(SignalDescriptor::answer(sdp))
    }

    async fn apply_answer(&mut self, answer: &SignalDescriptor) -> SessionResult<()> {
        let remote = RTCSessionDescription::answer(answer.sdp.clone()).map_err(negotiation)?;
        self.pc.set_remote_description(remote).await.map_err(negotiation)?;
        info!("Applied remote answer");
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Err(e) = self.pc.close().await {
            warn!("Failed to close peer connection: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ice_url() {
        assert_eq!(normalize_ice_url("stun.l.google.com:19302"), "stun:stun.l.google.com:19302");
        assert_eq!(normalize_ice_url("stun:stun.example.org"), "stun:stun.example.org");
        assert_eq!(normalize_ice_url("turn:relay.example.org"), "turn:relay.example.org");
    }
}
