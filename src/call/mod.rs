//! One-to-one call management
//!
//! `ConnectionManager` drives the per-call state machine from two inputs:
//! local operations (`dial`, `accept`, `reject`, `end`) and the inbound
//! signaling queue (`handle_event`).

pub mod manager;
pub mod peer;
pub mod rtc;
pub mod state;

pub use manager::ConnectionManager;
pub use peer::{PeerLink, PeerLinkFactory};
pub use rtc::RtcPeerFactory;
pub use state::{CallNotice, CallRole, CallSession, CallState, EndReason};
