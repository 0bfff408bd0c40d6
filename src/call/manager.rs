use std::sync::Arc;
use tracing::{debug, info, warn};

use super::peer::{PeerLink, PeerLinkFactory};
use super::state::{CallNotice, CallRole, CallSession, CallState, EndReason};
use crate::error::{SessionError, SessionResult};
use crate::media::MediaController;
use crate::signaling::{DescriptorKind, LocalIdentity, SignalDescriptor, SignalEvent, SignalingClient};

/// Owns the single call session and its peer link
pub struct ConnectionManager {
    signaling: SignalingClient,
    peers: Arc<dyn PeerLinkFactory>,
    session: Option<CallSession>,
    link: Option<Box<dyn PeerLink>>,
    /// Remote offer held while ringing
    pending_offer: Option<SignalDescriptor>,
}

impl ConnectionManager {
    pub fn new(signaling: SignalingClient, peers: Arc<dyn PeerLinkFactory>) -> Self {
        Self {
            signaling,
            peers,
            session: None,
            link: None,
            pending_offer: None,
        }
    }

    pub fn signaling(&self) -> &SignalingClient {
        &self.signaling
    }

    pub fn signaling_mut(&mut self) -> &mut SignalingClient {
        &mut self.signaling
    }

    /// Current call, including one that already ended
    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    /// State of the current call, `Idle` when there is none
    pub fn state(&self) -> CallState {
        self.session.as_ref().map(|s| s.state).unwrap_or_default()
    }

    pub fn has_active_call(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_active())
    }

    /// Place a call to `target`
    ///
    /// Returns once the invite is on the wire; the call connects when the
    /// answer arrives through `handle_event`.
    pub async fn dial(&mut self, target: LocalIdentity, media: &MediaController) -> SessionResult<CallSession> {
        if self.has_active_call() {
            return Err(SessionError::AlreadyInCall);
        }

        let Some(me) = self.signaling.identity().cloned() else {
            return Err(SessionError::RelayUnreachable(
                "signaling is offline".to_string(),
            ));
        };

        if target == me {
            return Err(SessionError::NegotiationFailure(format!(
                "cannot dial own identity {}",
                me
            )));
        }

        info!("Dialing {}", target);
        self.session = Some(CallSession::new(CallRole::Caller, target.clone()));
        self.advance(CallState::Dialing)?;

        if let Err(e) = self.send_offer(&target, media).await {
            self.abort(&e).await;
            return Err(e);
        }

        self.current()
    }

    async fn send_offer(&mut self, target: &LocalIdentity, media: &MediaController) -> SessionResult<()> {
        let link = self.peers.create(&media.track_states(), media.feed()).await?;
        let link = self.link.insert(link);
        let offer = link.create_offer().await?;
        self.signaling.send_invite(target, offer).await
    }

    /// Answer the ringing call
    pub async fn accept(&mut self, media: &MediaController) -> SessionResult<CallNotice> {
        let state = self.state();
        if state != CallState::Ringing {
            return Err(SessionError::invalid_state("accept", state));
        }

        let offer = self
            .pending_offer
            .take()
            .ok_or_else(|| SessionError::invalid_state("accept", state))?;
        let peer = self.current()?.peer;

        info!("Accepting call from {}", peer);
        self.advance(CallState::Negotiating)?;

        if let Err(e) = self.send_answer(&peer, &offer, media).await {
            self.abort(&e).await;
            return Err(e);
        }

        self.advance(CallState::Connected)?;
        info!("Call with {} connected", peer);
        Ok(CallNotice::Connected { peer })
    }

    async fn send_answer(
        &mut self,
        peer: &LocalIdentity,
        offer: &SignalDescriptor,
        media: &MediaController,
    ) -> SessionResult<()> {
        let link = self.peers.create(&media.track_states(), media.feed()).await?;
        let link = self.link.insert(link);
        let answer = link.accept_offer(offer).await?;
        self.signaling.send_answer(peer, answer).await
    }

    /// Decline the ringing call
    pub async fn reject(&mut self) -> SessionResult<CallNotice> {
        let state = self.state();
        if state != CallState::Ringing {
            return Err(SessionError::invalid_state("reject", state));
        }

        let peer = self.current()?.peer;
        info!("Rejecting call from {}", peer);

        self.pending_offer = None;
        self.advance(CallState::Ended)?;
        self.hangup_best_effort(&peer).await;

        Ok(CallNotice::Ended {
            peer,
            reason: EndReason::Rejected,
        })
    }

    /// Hang up whatever call is active. Idempotent: `None` when there was
    /// nothing to end.
    pub async fn end(&mut self) -> Option<CallNotice> {
        if !self.has_active_call() {
            return None;
        }

        let peer = self.session.as_ref()?.peer.clone();
        info!("Ending call with {}", peer);

        self.close_link().await;
        self.pending_offer = None;
        if let Some(session) = self.session.as_mut() {
            session.state = CallState::Ended;
        }
        self.hangup_best_effort(&peer).await;

        Some(CallNotice::Ended {
            peer,
            reason: EndReason::LocalHangup,
        })
    }

    /// Wait for the next inbound signaling event. Cancel-safe.
    pub async fn next_event(&mut self) -> SignalEvent {
        self.signaling.recv().await
    }

    /// Apply one inbound signaling event to the call state
    pub async fn handle_event(&mut self, event: SignalEvent) -> Option<CallNotice> {
        match event {
            SignalEvent::IncomingInvite { from, descriptor } => self.on_invite(from, descriptor).await,
            SignalEvent::InviteAccepted { from, descriptor } => self.on_accepted(from, descriptor).await,
            SignalEvent::PeerHungUp { from } => self.on_hangup(from).await,
            SignalEvent::RelayLost => match self.session.as_ref().filter(|s| s.is_active()) {
                Some(session) => {
                    warn!("Signaling lost during call with {}", session.peer);
                    Some(CallNotice::PeerUnreachable {
                        peer: session.peer.clone(),
                    })
                }
                None => Some(CallNotice::SignalingLost),
            },
        }
    }

    /// Pump inbound events until one produces a notice
    pub async fn next_notice(&mut self) -> CallNotice {
        loop {
            let event = self.next_event().await;
            if let Some(notice) = self.handle_event(event).await {
                return notice;
            }
        }
    }

    async fn on_invite(&mut self, from: LocalIdentity, descriptor: SignalDescriptor) -> Option<CallNotice> {
        if self.has_active_call() {
            info!("Busy, declining invite from {}", from);
            self.hangup_best_effort(&from).await;
            return None;
        }

        if let Err(e) = descriptor.validate(DescriptorKind::Offer) {
            warn!("Declining invite from {} with bad offer: {}", from, e);
            self.hangup_best_effort(&from).await;
            return None;
        }

        info!("Incoming call from {}", from);
        self.session = Some(CallSession::new(CallRole::Callee, from.clone()));
        self.pending_offer = Some(descriptor.clone());
        self.advance(CallState::Ringing).ok()?;

        Some(CallNotice::IncomingCall { from, descriptor })
    }

    async fn on_accepted(&mut self, from: LocalIdentity, descriptor: SignalDescriptor) -> Option<CallNotice> {
        let dialing = self
            .session
            .as_ref()
            .is_some_and(|s| s.state == CallState::Dialing && s.peer == from);
        if !dialing {
            debug!("Ignoring unexpected invite-accepted from {}", from);
            return None;
        }

        self.advance(CallState::Negotiating).ok()?;

        if let Err(e) = self.apply_answer(&descriptor).await {
            self.abort(&e).await;
            return Some(CallNotice::Ended {
                peer: from,
                reason: EndReason::NegotiationFailed(e.to_string()),
            });
        }

        self.advance(CallState::Connected).ok()?;
        info!("Call with {} connected", from);
        Some(CallNotice::Connected { peer: from })
    }

    async fn apply_answer(&mut self, descriptor: &SignalDescriptor) -> SessionResult<()> {
        descriptor
            .validate(DescriptorKind::Answer)
            .map_err(SessionError::NegotiationFailure)?;

        let link = self
            .link
            .as_mut()
            .ok_or_else(|| SessionError::NegotiationFailure("no peer link for answer".to_string()))?;
        link.apply_answer(descriptor).await
    }

    async fn on_hangup(&mut self, from: LocalIdentity) -> Option<CallNotice> {
        let session = self.session.as_ref().filter(|s| s.is_active() && s.peer == from)?;
        let reason = if session.state == CallState::Dialing {
            EndReason::Rejected
        } else {
            EndReason::RemoteHangup
        };

        info!("{} ended the call", from);
        self.close_link().await;
        self.pending_offer = None;
        if let Some(session) = self.session.as_mut() {
            session.state = CallState::Ended;
        }

        Some(CallNotice::Ended { peer: from, reason })
    }

    fn current(&self) -> SessionResult<CallSession> {
        self.session
            .clone()
            .ok_or_else(|| SessionError::invalid_state("call", CallState::Idle))
    }

    fn advance(&mut self, next: CallState) -> SessionResult<()> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| SessionError::invalid_state("advance", CallState::Idle))?;

        if !session.state.can_advance_to(next) {
            return Err(SessionError::invalid_state("advance", session.state));
        }

        debug!("Call {}: {:?} -> {:?}", session.id, session.state, next);
        session.state = next;
        Ok(())
    }

    /// Failure path: `Error` then `Ended`, no retry
    async fn abort(&mut self, error: &SessionError) {
        warn!("Call failed: {}", error);
        self.close_link().await;
        self.pending_offer = None;

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state.can_advance_to(CallState::Error) {
            session.state = CallState::Error;
        }
        session.state = CallState::Ended;

        // The other side may be waiting on us
        let peer = session.peer.clone();
        self.hangup_best_effort(&peer).await;
    }

    async fn close_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
    }

    async fn hangup_best_effort(&self, peer: &LocalIdentity) {
        if let Err(e) = self.signaling.send_hangup(peer).await {
            debug!("Could not deliver call-ended to {}: {}", peer, e);
        }
    }
}
