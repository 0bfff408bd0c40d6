// Integration tests for session recording
//
// These tests push frames through a MediaController into a RecordingController
// and check the finalized artifact.

mod common;

use anyhow::Result;
use common::{find, settle, ManualCapture, EBML_MAGIC};
use mirror_session::config::{CaptureConfig, RecordingConfig};
use mirror_session::error::SessionError;
use mirror_session::media::{MediaController, TrackKind};
use mirror_session::recording::{RecordingController, RecordingState};
use tempfile::TempDir;

async fn acquired() -> Result<(MediaController, ManualCapture)> {
    let capture = ManualCapture::new();
    let mut media = MediaController::new(Box::new(capture.clone()));
    media.acquire(&CaptureConfig::default()).await?;
    Ok((media, capture))
}

#[tokio::test]
async fn test_artifact_preserves_chunk_order() -> Result<()> {
    // Setup: acquired devices and a recorder subscribed to them
    let (media, capture) = acquired().await?;
    let mut recorder = RecordingController::new(&RecordingConfig::default());
    recorder.start(media.feed())?;
    assert_eq!(recorder.state(), RecordingState::Recording);

    capture.push(TrackKind::Audio, b"one-").await;
    capture.push(TrackKind::Video, b"two-").await;
    capture.push(TrackKind::Audio, b"three").await;
    settle().await;

    let artifact = recorder.stop().await?;
    let bytes = artifact.bytes();

    // Verify: a WebM file with both tracks and the frames in arrival order
    assert_eq!(&bytes[..4], &EBML_MAGIC);
    assert!(find(bytes, b"A_OPUS").is_some());
    assert!(find(bytes, b"V_VP8").is_some());
    let one = find(bytes, b"one-").expect("first frame");
    let two = find(bytes, b"two-").expect("second frame");
    let three = find(bytes, b"three").expect("third frame");
    assert!(one < two && two < three);
    assert_eq!(artifact.chunk_count(), 3);
    assert_eq!(artifact.mime_type(), "video/webm");
    assert_eq!(recorder.state(), RecordingState::Finalized);

    Ok(())
}

#[tokio::test]
async fn test_queued_frames_are_flushed_on_stop() -> Result<()> {
    let (media, capture) = acquired().await?;
    let mut recorder = RecordingController::new(&RecordingConfig::default());
    recorder.start(media.feed())?;

    for _ in 0..20 {
        capture.push(TrackKind::Audio, b"x").await;
    }
    // Let the forwarder publish everything, then stop without waiting on the collector
    settle().await;

    let artifact = recorder.stop().await?;
    assert_eq!(artifact.chunk_count(), 20);

    Ok(())
}

#[tokio::test]
async fn test_disabled_track_is_not_recorded() -> Result<()> {
    let (media, capture) = acquired().await?;
    let mut recorder = RecordingController::new(&RecordingConfig::default());
    recorder.start(media.feed())?;

    media.set_track_enabled(TrackKind::Video, false)?;
    capture.push(TrackKind::Video, b"hidden").await;
    capture.push(TrackKind::Audio, b"heard").await;
    settle().await;

    let artifact = recorder.stop().await?;
    assert_eq!(artifact.chunk_count(), 1);
    assert!(find(artifact.bytes(), b"heard").is_some());
    assert!(find(artifact.bytes(), b"hidden").is_none());
    // No video frame made it in, so no video track is declared
    assert!(find(artifact.bytes(), b"V_VP8").is_none());

    Ok(())
}

#[tokio::test]
async fn test_second_stop_is_invalid() -> Result<()> {
    let (media, _capture) = acquired().await?;
    let mut recorder = RecordingController::new(&RecordingConfig::default());
    recorder.start(media.feed())?;
    recorder.stop().await?;

    let err = recorder.stop().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { .. }));

    // A finalized recorder does not restart either
    let err = recorder.start(media.feed()).unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { .. }));

    Ok(())
}

#[tokio::test]
async fn test_stop_before_start_is_invalid() -> Result<()> {
    let mut recorder = RecordingController::new(&RecordingConfig::default());

    let err = recorder.stop().await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidState { .. }));
    assert_eq!(recorder.state(), RecordingState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_unsupported_container_stays_idle() -> Result<()> {
    let (media, _capture) = acquired().await?;
    let config = RecordingConfig {
        mime_type: "video/x-matroska".to_string(),
        ..RecordingConfig::default()
    };
    let mut recorder = RecordingController::new(&config);

    let err = recorder.start(media.feed()).unwrap_err();

    assert!(matches!(err, SessionError::RecordingUnsupported(_)));
    assert_eq!(recorder.state(), RecordingState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_recording_without_media_is_unsupported() -> Result<()> {
    let mut recorder = RecordingController::new(&RecordingConfig::default());

    let err = recorder.start(None).unwrap_err();

    assert!(matches!(err, SessionError::RecordingUnsupported(_)));
    assert_eq!(recorder.state(), RecordingState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_recording_survives_device_release() -> Result<()> {
    let (mut media, capture) = acquired().await?;
    let mut recorder = RecordingController::new(&RecordingConfig::default());
    recorder.start(media.feed())?;

    capture.push(TrackKind::Audio, b"before").await;
    settle().await;
    media.release();

    let artifact = recorder.stop().await?;
    assert_eq!(artifact.chunk_count(), 1);
    assert!(find(artifact.bytes(), b"before").is_some());

    Ok(())
}

#[tokio::test]
async fn test_artifact_save_to_directory() -> Result<()> {
    // Setup: Create temporary directory for test outputs
    let temp_dir = TempDir::new()?;
    let output_dir = temp_dir.path().join("recordings");

    let (media, capture) = acquired().await?;
    let config = RecordingConfig {
        mime_type: "audio/ogg".to_string(),
        ..RecordingConfig::default()
    };
    let mut recorder = RecordingController::new(&config);
    recorder.start(media.feed())?;
    capture.push(TrackKind::Audio, b"ogg-bytes").await;
    capture.push(TrackKind::Video, b"not-in-ogg").await;
    settle().await;
    let artifact = recorder.stop().await?;
    assert_eq!(artifact.chunk_count(), 1);

    let path = artifact.save_to(&output_dir)?;

    assert!(path.starts_with(&output_dir));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("ogg"));
    let saved = std::fs::read(&path)?;
    assert_eq!(&saved[..4], b"OggS");
    assert!(find(&saved, b"OpusHead").is_some());
    assert!(find(&saved, b"ogg-bytes").is_some());
    assert!(find(&saved, b"not-in-ogg").is_none());

    Ok(())
}

#[tokio::test]
async fn test_audio_webm_drops_video_frames() -> Result<()> {
    let (media, capture) = acquired().await?;
    let config = RecordingConfig {
        mime_type: "audio/webm;codecs=opus".to_string(),
        ..RecordingConfig::default()
    };
    let mut recorder = RecordingController::new(&config);
    recorder.start(media.feed())?;

    capture.push(TrackKind::Video, b"picture").await;
    capture.push(TrackKind::Audio, b"voice").await;
    settle().await;
    let artifact = recorder.stop().await?;

    assert_eq!(&artifact.bytes()[..4], &EBML_MAGIC);
    assert_eq!(artifact.chunk_count(), 1);
    assert!(find(artifact.bytes(), b"voice").is_some());
    assert!(find(artifact.bytes(), b"picture").is_none());
    assert!(artifact.file_name().ends_with(".webm"));

    Ok(())
}

#[tokio::test]
async fn test_uppercase_mime_type_keeps_its_extension() -> Result<()> {
    let (media, capture) = acquired().await?;
    let config = RecordingConfig {
        mime_type: "AUDIO/OGG".to_string(),
        ..RecordingConfig::default()
    };
    let mut recorder = RecordingController::new(&config);
    recorder.start(media.feed())?;
    capture.push(TrackKind::Audio, b"loud").await;
    settle().await;

    let artifact = recorder.stop().await?;

    assert!(artifact.file_name().ends_with(".ogg"));
    assert_eq!(&artifact.bytes()[..4], b"OggS");

    Ok(())
}
