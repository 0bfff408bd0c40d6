use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/session/status", get(handlers::session_status))
        .route("/session/start", post(handlers::start_session))
        .route("/session/leave", post(handlers::leave_session))
        .route("/media/tracks", post(handlers::set_track))
        // Call control
        .route("/calls/dial", post(handlers::dial))
        .route("/calls/accept", post(handlers::accept_call))
        .route("/calls/reject", post(handlers::reject_call))
        .route("/calls/end", post(handlers::end_call))
        // Recording
        .route("/recording/start", post(handlers::start_recording))
        .route("/recording/stop", post(handlers::stop_recording))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // The UI is served from another origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
