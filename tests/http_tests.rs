// Integration tests for the HTTP control API
//
// Requests go straight into the router with tower's oneshot.

mod common;

use anyhow::Result;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{settle, FakePeers, ManualCapture};
use mirror_session::analysis::AnalysisClient;
use mirror_session::config::Config;
use mirror_session::http::{create_router, AppState};
use mirror_session::media::TrackKind;
use mirror_session::session::spawn_session;
use mirror_session::signaling::MemoryRelay;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    capture: ManualCapture,
    relay: MemoryRelay,
}

fn app() -> Result<TestApp> {
    let mut config = Config::default();
    config.relay.identity_timeout_secs = 1;
    // Nothing listens on port 9; analysis falls back
    config.analysis.endpoint = "http://127.0.0.1:9".to_string();
    config.analysis.timeout_secs = 2;

    let relay = MemoryRelay::new();
    let capture = ManualCapture::new();
    let session = spawn_session(
        &config,
        Arc::new(relay.clone()),
        Arc::new(FakePeers::new()),
        Box::new(capture.clone()),
        AnalysisClient::new(&config.analysis)?,
    );

    Ok(TestApp {
        router: create_router(AppState::new(session)),
        capture,
        relay,
    })
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string()))?,
        None => request.body(Body::empty())?,
    };

    let response = router.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    Ok((status, value))
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let app = app()?;
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_start_and_status() -> Result<()> {
    let app = app()?;

    let (status, body) = call(&app.router, "POST", "/session/start", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identity"], "peer-1");
    assert_eq!(body["tracks"].as_array().map(|t| t.len()), Some(2));

    let (status, body) = call(&app.router, "GET", "/session/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["signaling_online"], true);
    assert_eq!(body["media_acquired"], true);
    assert_eq!(body["recording"], "idle");

    // Devices are already held
    let (status, body) = call(&app.router, "POST", "/session/start", None).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "device_unavailable");

    Ok(())
}

#[tokio::test]
async fn test_toggle_track() -> Result<()> {
    let app = app()?;
    call(&app.router, "POST", "/session/start", None).await?;

    let (status, body) = call(
        &app.router,
        "POST",
        "/media/tracks",
        Some(json!({ "kind": "audio", "enabled": false })),
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "kind": "audio", "enabled": false }));

    Ok(())
}

#[tokio::test]
async fn test_call_errors_map_to_status_codes() -> Result<()> {
    let app = app()?;

    // Offline dial
    let (status, body) = call(&app.router, "POST", "/calls/dial", Some(json!({ "target": "peer-2" }))).await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "relay_unreachable");

    // Nothing is ringing
    let (status, body) = call(&app.router, "POST", "/calls/accept", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "invalid_state");

    // Ending with no call is fine
    let (status, body) = call(&app.router, "POST", "/calls/end", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");

    Ok(())
}

#[tokio::test]
async fn test_dial_and_end_call() -> Result<()> {
    let app = app()?;
    call(&app.router, "POST", "/session/start", None).await?;

    // Nobody holds peer-9; the invite goes out and is never answered
    let (status, body) = call(&app.router, "POST", "/calls/dial", Some(json!({ "target": "peer-9" }))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "dialing");
    assert_eq!(body["role"], "caller");

    let (status, body) = call(&app.router, "POST", "/calls/dial", Some(json!({ "target": "peer-9" }))).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "already_in_call");

    let (status, body) = call(&app.router, "POST", "/calls/end", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "ended");
    assert_eq!(body["reason"]["reason"], "local_hangup");

    Ok(())
}

#[tokio::test]
async fn test_recording_round_trip() -> Result<()> {
    let app = app()?;

    // Not started: nothing to record
    let (status, body) = call(&app.router, "POST", "/recording/start", None).await?;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["kind"], "recording_unsupported");

    call(&app.router, "POST", "/session/start", None).await?;
    let (status, _) = call(&app.router, "POST", "/recording/start", None).await?;
    assert_eq!(status, StatusCode::OK);

    app.capture.push(TrackKind::Audio, b"abc").await;
    settle().await;

    let (status, body) = call(&app.router, "POST", "/recording/stop", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["artifact"]["chunk_count"], 1);
    assert_eq!(body["artifact"]["mime_type"], "video/webm");
    assert_eq!(body["analysis"]["overall_sentiment"], "Positive");

    let (status, _) = call(&app.router, "POST", "/recording/stop", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn test_leave_releases_everything() -> Result<()> {
    let app = app()?;
    call(&app.router, "POST", "/session/start", None).await?;
    assert!(app.capture.is_held());

    let (status, body) = call(&app.router, "POST", "/session/leave", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "left");
    assert!(!app.capture.is_held());
    assert!(app.relay.connected().is_empty());

    Ok(())
}
