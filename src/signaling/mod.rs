//! Call signaling through a relay
//!
//! The relay assigns each participant an identity and forwards call-setup
//! messages addressed by identity:
//! - `identity-assigned` relay → client
//! - `invite` caller → callee (offer)
//! - `invite-accepted` callee → caller (answer)
//! - `call-ended` either way (hang-up, reject, busy)

pub mod client;
pub mod memory;
pub mod messages;
pub mod nats;
pub mod relay;

pub use client::{SignalEvent, SignalingClient};
pub use memory::MemoryRelay;
pub use messages::{DescriptorKind, LocalIdentity, SignalDescriptor, SignalMessage};
pub use nats::NatsRelay;
pub use relay::{Relay, RelayChannel, RelayEvent, RelayLink};
