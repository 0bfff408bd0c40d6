use serde::{Deserialize, Serialize};
use std::fmt;

/// Relay-assigned address of this participant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalIdentity(String);

impl LocalIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocalIdentity {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for LocalIdentity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorKind {
    Offer,
    Answer,
}

/// Complete connection description exchanged during negotiation
///
/// Serialized like a browser session description: `{"type": "offer", "sdp": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDescriptor {
    #[serde(rename = "type")]
    pub kind: DescriptorKind,
    pub sdp: String,
}

impl SignalDescriptor {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptorKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptorKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// Check kind and that the description is not blank
    pub fn validate(&self, expected: DescriptorKind) -> Result<(), String> {
        if self.kind != expected {
            return Err(format!(
                "expected {:?} descriptor, got {:?}",
                expected, self.kind
            ));
        }
        if self.sdp.trim().is_empty() {
            return Err(format!("{:?} descriptor has an empty description", self.kind));
        }
        Ok(())
    }
}

/// Message carried by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// relay → client, once per connection
    IdentityAssigned { identity: LocalIdentity },

    /// caller → relay → callee
    Invite {
        from: LocalIdentity,
        to: LocalIdentity,
        descriptor: SignalDescriptor,
    },

    /// callee → relay → caller
    InviteAccepted {
        from: LocalIdentity,
        to: LocalIdentity,
        descriptor: SignalDescriptor,
    },

    /// Either side hangs up, rejects or reports busy
    CallEnded {
        from: LocalIdentity,
        to: LocalIdentity,
    },
}

impl SignalMessage {
    /// Recipient of a routed message; `None` for relay-originated messages
    pub fn recipient(&self) -> Option<&LocalIdentity> {
        match self {
            SignalMessage::IdentityAssigned { .. } => None,
            SignalMessage::Invite { to, .. }
            | SignalMessage::InviteAccepted { to, .. }
            | SignalMessage::CallEnded { to, .. } => Some(to),
        }
    }
}
