//! HTTP API for the session UI
//!
//! - GET /health, GET /session/status
//! - POST /session/start, /session/leave
//! - POST /media/tracks
//! - POST /calls/dial, /calls/accept, /calls/reject, /calls/end
//! - POST /recording/start, /recording/stop

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
