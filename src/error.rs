//! Session error kinds
//!
//! Only device, relay and negotiation failures are meant to reach the user;
//! the rest are absorbed by the component that raises them.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Capture device access denied: {0}")]
    DeviceAccessDenied(String),

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Signaling relay unreachable: {0}")]
    RelayUnreachable(String),

    #[error("A call is already in progress")]
    AlreadyInCall,

    #[error("Negotiation failed: {0}")]
    NegotiationFailure(String),

    #[error("Peer {0} is unreachable")]
    PeerUnreachable(String),

    #[error("Recording unsupported: {0}")]
    RecordingUnsupported(String),

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Session worker is no longer running")]
    WorkerGone,
}

impl SessionError {
    pub fn invalid_state(operation: &'static str, state: impl std::fmt::Debug) -> Self {
        Self::InvalidState {
            operation,
            state: format!("{:?}", state),
        }
    }

    /// Whether this failure should be surfaced to the user rather than absorbed
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::DeviceAccessDenied(_)
                | Self::DeviceUnavailable(_)
                | Self::RelayUnreachable(_)
                | Self::NegotiationFailure(_)
        )
    }

    /// Stable machine-readable name for API responses
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DeviceAccessDenied(_) => "device_access_denied",
            Self::DeviceUnavailable(_) => "device_unavailable",
            Self::RelayUnreachable(_) => "relay_unreachable",
            Self::AlreadyInCall => "already_in_call",
            Self::NegotiationFailure(_) => "negotiation_failure",
            Self::PeerUnreachable(_) => "peer_unreachable",
            Self::RecordingUnsupported(_) => "recording_unsupported",
            Self::InvalidState { .. } => "invalid_state",
            Self::WorkerGone => "worker_gone",
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
