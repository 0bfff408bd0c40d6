use super::state::AppState;
use crate::error::SessionError;
use crate::media::TrackKind;
use crate::signaling::LocalIdentity;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetTrackRequest {
    pub kind: TrackKind,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct DialRequest {
    /// Identity of the participant to call
    pub target: LocalIdentity,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: String,
    pub message: String,
}

fn status_for(error: &SessionError) -> StatusCode {
    match error {
        SessionError::AlreadyInCall | SessionError::InvalidState { .. } => StatusCode::CONFLICT,
        SessionError::DeviceAccessDenied(_) => StatusCode::FORBIDDEN,
        SessionError::DeviceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::RelayUnreachable(_) => StatusCode::BAD_GATEWAY,
        SessionError::NegotiationFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::RecordingUnsupported(_) => StatusCode::NOT_IMPLEMENTED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: SessionError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        error!("Request failed: {}", error);
    } else {
        warn!("Request rejected: {}", error);
    }

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            kind: error.kind().to_string(),
        }),
    )
        .into_response()
}

fn ok_json<T: Serialize>(value: T) -> Response {
    (StatusCode::OK, Json(value)).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /session/status
pub async fn session_status(State(state): State<AppState>) -> Response {
    match state.session.status().await {
        Ok(status) => ok_json(status),
        Err(e) => error_response(e),
    }
}

/// POST /session/start
/// Acquire devices and connect signaling
pub async fn start_session(State(state): State<AppState>) -> Response {
    info!("Starting session");

    match state.session.start().await {
        Ok(report) => ok_json(report),
        Err(e) => error_response(e),
    }
}

/// POST /session/leave
/// Tear the session down; returns the analysed recording if one was running
pub async fn leave_session(State(state): State<AppState>) -> Response {
    info!("Leaving session");

    match state.session.leave().await {
        Ok(Some(outcome)) => ok_json(outcome),
        Ok(None) => ok_json(MessageResponse {
            status: "left".to_string(),
            message: "Session left, nothing was recording".to_string(),
        }),
        Err(e) => error_response(e),
    }
}

/// POST /media/tracks
pub async fn set_track(State(state): State<AppState>, Json(req): Json<SetTrackRequest>) -> Response {
    match state.session.set_track_enabled(req.kind, req.enabled).await {
        Ok(track) => ok_json(track),
        Err(e) => error_response(e),
    }
}

/// POST /calls/dial
pub async fn dial(State(state): State<AppState>, Json(req): Json<DialRequest>) -> Response {
    info!("Dial requested: {}", req.target);

    match state.session.dial(req.target).await {
        Ok(call) => ok_json(call),
        Err(e) => error_response(e),
    }
}

/// POST /calls/accept
pub async fn accept_call(State(state): State<AppState>) -> Response {
    match state.session.accept().await {
        Ok(notice) => ok_json(notice),
        Err(e) => error_response(e),
    }
}

/// POST /calls/reject
pub async fn reject_call(State(state): State<AppState>) -> Response {
    match state.session.reject().await {
        Ok(notice) => ok_json(notice),
        Err(e) => error_response(e),
    }
}

/// POST /calls/end
pub async fn end_call(State(state): State<AppState>) -> Response {
    match state.session.end_call().await {
        Ok(Some(notice)) => ok_json(notice),
        Ok(None) => ok_json(MessageResponse {
            status: "idle".to_string(),
            message: "No active call".to_string(),
        }),
        Err(e) => error_response(e),
    }
}

/// POST /recording/start
pub async fn start_recording(State(state): State<AppState>) -> Response {
    match state.session.start_recording().await {
        Ok(()) => ok_json(MessageResponse {
            status: "recording".to_string(),
            message: "Recording started".to_string(),
        }),
        Err(e) => error_response(e),
    }
}

/// POST /recording/stop
/// Stop recording, analyse and return the outcome
pub async fn stop_recording(State(state): State<AppState>) -> Response {
    match state.session.finish_recording().await {
        Ok(outcome) => {
            info!("Recording finished: {}", outcome.artifact.file_name);
            ok_json(outcome)
        }
        Err(e) => error_response(e),
    }
}
