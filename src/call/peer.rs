use async_trait::async_trait;

use crate::error::SessionResult;
use crate::media::{MediaFeed, MediaTrackState};
use crate::signaling::SignalDescriptor;

/// Transport of one call
///
/// Descriptors are complete and single-shot: an offer or answer carries every
/// connectivity candidate gathered so far, nothing is trickled afterwards.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Caller side: build the local offer
    async fn create_offer(&mut self) -> SessionResult<SignalDescriptor>;

    /// Callee side: apply the remote offer and build the answer
    async fn accept_offer(&mut self, offer: &SignalDescriptor) -> SessionResult<SignalDescriptor>;

    /// Caller side: apply the remote answer
    async fn apply_answer(&mut self, answer: &SignalDescriptor) -> SessionResult<()>;

    /// Tear the transport down. Must be idempotent.
    async fn close(&mut self);
}

/// Creates a fresh `PeerLink` per call
#[async_trait]
pub trait PeerLinkFactory: Send + Sync {
    /// `tracks` decides which media sections are negotiated; `feed`
    /// supplies the frames to transmit.
    async fn create(
        &self,
        tracks: &[MediaTrackState],
        feed: Option<MediaFeed>,
    ) -> SessionResult<Box<dyn PeerLink>>;
}
