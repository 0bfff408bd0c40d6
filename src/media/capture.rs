use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::CaptureConfig;
use crate::error::{SessionError, SessionResult};

/// Media track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

/// One encoded media sample
///
/// `data` holds exactly one codec frame: an Opus packet for audio, a VP8
/// frame for video. It is never a container fragment. The peer link sends it
/// unchanged as an RTP sample and the recorder muxes it into the recording
/// container when the recording is finalized.
#[derive(Debug, Clone)]
pub struct MediaFrame {
    /// Track the frame belongs to
    pub kind: TrackKind,
    /// One Opus packet or one VP8 frame
    pub data: Bytes,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
    /// Playback duration of the payload
    pub duration_ms: u64,
}

/// Capture device backend trait
///
/// Implementations own the platform handle for the camera and microphone.
/// `open` must fail with `DeviceAccessDenied` when permission is refused and
/// with `DeviceUnavailable` when the hardware is missing or busy.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Open the requested tracks and start producing frames
    async fn open(&mut self, config: &CaptureConfig) -> SessionResult<mpsc::Receiver<MediaFrame>>;

    /// Stop capturing and give the device back. Must be idempotent.
    fn close(&mut self);

    /// Check if the device is currently held
    fn is_open(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Size of the VP8 key frame header: frame tag, start code, picture size
const VP8_KEY_HEADER_BYTES: usize = 10;

/// Test-pattern capture device
///
/// Audio frames are Opus silence packets. Video frames carry a VP8 key frame
/// header for the configured picture size followed by a filler pattern, so
/// they travel the whole pipeline but do not decode to a picture. Used where
/// no platform camera/microphone backend is wired in.
pub struct SyntheticCapture {
    width: u16,
    height: u16,
    video_frame_bytes: usize,
    task: Option<JoinHandle<()>>,
}

impl SyntheticCapture {
    pub fn new() -> Self {
        Self {
            width: 640,
            height: 480,
            video_frame_bytes: 1200,
            task: None,
        }
    }

    /// Override the size of generated video frames, header included
    pub fn with_video_frame_bytes(mut self, bytes: usize) -> Self {
        self.video_frame_bytes = bytes.max(VP8_KEY_HEADER_BYTES);
        self
    }

    /// Opus packet of silence spanning `interval_ms` (CELT fullband, mono)
    fn audio_payload(interval_ms: u64) -> Bytes {
        let config: u8 = match interval_ms {
            0..=2 => 28,
            3..=5 => 29,
            6..=10 => 30,
            _ => 31,
        };
        Bytes::from(vec![config << 3, 0xFF, 0xFE])
    }

    fn video_payload(width: u16, height: u16, size: usize, fill: u8) -> Bytes {
        let mut data = Vec::with_capacity(size);
        // Key frame tag (show_frame set), then start code and 14-bit sizes
        data.extend_from_slice(&[0x10, 0x02, 0x00, 0x9D, 0x01, 0x2A]);
        data.extend_from_slice(&(width & 0x3FFF).to_le_bytes());
        data.extend_from_slice(&(height & 0x3FFF).to_le_bytes());
        data.resize(size.max(VP8_KEY_HEADER_BYTES), fill);
        Bytes::from(data)
    }
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureDevice for SyntheticCapture {
    async fn open(&mut self, config: &CaptureConfig) -> SessionResult<mpsc::Receiver<MediaFrame>> {
        if self.task.is_some() {
            return Err(SessionError::DeviceUnavailable(
                "synthetic device is busy".to_string(),
            ));
        }

        let mut kinds = Vec::new();
        if config.audio {
            kinds.push(TrackKind::Audio);
        }
        if config.video {
            kinds.push(TrackKind::Video);
        }

        let (width, height, video_bytes) = (self.width, self.height, self.video_frame_bytes);
        let interval_ms = config.frame_interval_ms.max(1);
        let (tx, rx) = mpsc::channel(config.feed_capacity.max(1));

        info!(
            "Synthetic capture started ({} tracks, {}ms frames)",
            kinds.len(),
            interval_ms
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            let mut elapsed_ms = 0u64;

            loop {
                ticker.tick().await;

                for kind in &kinds {
                    let data = match kind {
                        TrackKind::Audio => Self::audio_payload(interval_ms),
                        // Filler varies per frame so payloads are distinguishable
                        TrackKind::Video => {
                            Self::video_payload(width, height, video_bytes, (elapsed_ms / interval_ms) as u8)
                        }
                    };
                    let frame = MediaFrame {
                        kind: *kind,
                        data,
                        timestamp_ms: elapsed_ms,
                        duration_ms: interval_ms,
                    };

                    if tx.send(frame).await.is_err() {
                        debug!("Synthetic capture receiver dropped");
                        return;
                    }
                }

                elapsed_ms += interval_ms;
            }
        });

        self.task = Some(task);
        Ok(rx)
    }

    fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Synthetic capture stopped");
        }
    }

    fn is_open(&self) -> bool {
        self.task.is_some()
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

impl Drop for SyntheticCapture {
    fn drop(&mut self) {
        self.close();
    }
}
