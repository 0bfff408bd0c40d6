pub mod analysis;
pub mod call;
pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod recording;
pub mod session;
pub mod signaling;

pub use analysis::{AnalysisClient, AnalysisResult};
pub use call::{CallNotice, CallState, ConnectionManager, RtcPeerFactory};
pub use config::Config;
pub use error::{SessionError, SessionResult};
pub use http::{create_router, AppState};
pub use media::{MediaController, SyntheticCapture, TrackKind};
pub use recording::{RecordingArtifact, RecordingController};
pub use session::{spawn_session, SessionHandle, SessionOutcome, SessionStatus};
pub use signaling::{LocalIdentity, MemoryRelay, NatsRelay, SignalingClient};
