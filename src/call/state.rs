use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::signaling::{LocalIdentity, SignalDescriptor};

/// Per-call state machine
///
/// `Idle → Dialing | Ringing → Negotiating → Connected → Ended`, with `Error`
/// reachable from any non-terminal state and always followed by `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    Idle,
    Dialing,
    Ringing,
    Negotiating,
    Connected,
    Error,
    Ended,
}

impl Default for CallState {
    fn default() -> Self {
        Self::Idle
    }
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended)
    }

    /// Whether `next` is a legal step from this state
    pub fn can_advance_to(&self, next: CallState) -> bool {
        use CallState::*;

        match (*self, next) {
            (Idle, Dialing) | (Idle, Ringing) => true,
            (Dialing, Negotiating) | (Ringing, Negotiating) => true,
            (Negotiating, Connected) => true,
            (Error, Ended) => true,
            (Ended, _) | (Error, _) => false,
            (_, Error) | (_, Ended) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallRole {
    Caller,
    Callee,
}

/// The one call this process may have at a time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub id: Uuid,
    pub role: CallRole,
    pub peer: LocalIdentity,
    pub state: CallState,
    pub started_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(role: CallRole, peer: LocalIdentity) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            peer,
            state: CallState::Idle,
            started_at: Utc::now(),
        }
    }

    /// Active sessions block new dials and invites
    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// Why a call reached `Ended`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum EndReason {
    LocalHangup,
    RemoteHangup,
    Rejected,
    NegotiationFailed(String),
}

/// Call notification for the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallNotice {
    /// Someone is calling; accept or reject
    IncomingCall {
        from: LocalIdentity,
        descriptor: SignalDescriptor,
    },
    Connected {
        peer: LocalIdentity,
    },
    Ended {
        peer: LocalIdentity,
        reason: EndReason,
    },
    /// Signaling dropped; local media and recording keep running
    PeerUnreachable {
        peer: LocalIdentity,
    },
    /// Signaling went offline while no call was in progress
    SignalingLost,
}
