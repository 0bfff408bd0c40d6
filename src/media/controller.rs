use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::capture::{CaptureDevice, MediaFrame, TrackKind};
use crate::config::CaptureConfig;
use crate::error::{SessionError, SessionResult};

/// Enabled flag of one local track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaTrackState {
    pub kind: TrackKind,
    pub enabled: bool,
}

/// Subscription to the gated frames of the local tracks
///
/// Frames of disabled tracks never reach a feed.
pub struct MediaFeed {
    rx: broadcast::Receiver<MediaFrame>,
}

impl MediaFeed {
    pub fn new(rx: broadcast::Receiver<MediaFrame>) -> Self {
        Self { rx }
    }

    pub fn into_receiver(self) -> broadcast::Receiver<MediaFrame> {
        self.rx
    }
}

/// Per-track enabled flags shared with the forwarding task
#[derive(Debug, Default)]
struct TrackGates {
    audio: Option<AtomicBool>,
    video: Option<AtomicBool>,
}

impl TrackGates {
    fn gate(&self, kind: TrackKind) -> Option<&AtomicBool> {
        match kind {
            TrackKind::Audio => self.audio.as_ref(),
            TrackKind::Video => self.video.as_ref(),
        }
    }

    fn is_open(&self, kind: TrackKind) -> bool {
        self.gate(kind)
            .map(|g| g.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

/// Everything that only exists while the devices are held
struct Acquired {
    gates: Arc<TrackGates>,
    frames: broadcast::Sender<MediaFrame>,
    forward_task: JoinHandle<()>,
}

/// Sole owner of the local capture devices
pub struct MediaController {
    device: Box<dyn CaptureDevice>,
    acquired: Option<Acquired>,
}

impl MediaController {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            device,
            acquired: None,
        }
    }

    /// Acquire audio/video capture; both tracks start enabled
    pub async fn acquire(&mut self, config: &CaptureConfig) -> SessionResult<Vec<MediaTrackState>> {
        if self.acquired.is_some() {
            return Err(SessionError::DeviceUnavailable(
                "capture devices are already acquired".to_string(),
            ));
        }

        if !config.audio && !config.video {
            return Err(SessionError::DeviceUnavailable(
                "no capture track requested".to_string(),
            ));
        }

        info!("Acquiring capture devices via {}", self.device.name());

        let mut device_rx = self.device.open(config).await?;

        let gates = Arc::new(TrackGates {
            audio: config.audio.then(|| AtomicBool::new(true)),
            video: config.video.then(|| AtomicBool::new(true)),
        });
        let (frames, _) = broadcast::channel(config.feed_capacity.max(1));

        // Forward device frames, dropping the ones of disabled tracks
        let forward_gates = Arc::clone(&gates);
        let forward_tx = frames.clone();
        let forward_task = tokio::spawn(async move {
            while let Some(frame) = device_rx.recv().await {
                if !forward_gates.is_open(frame.kind) {
                    continue;
                }
                // No subscribers is fine; frames are simply not consumed
                let _ = forward_tx.send(frame);
            }
            debug!("Capture device stream ended");
        });

        self.acquired = Some(Acquired {
            gates,
            frames,
            forward_task,
        });

        let tracks = self.track_states();
        info!("Capture devices acquired: {:?}", tracks);
        Ok(tracks)
    }

    /// Gate a track without touching the device or any negotiation
    pub fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> SessionResult<MediaTrackState> {
        let acquired = self
            .acquired
            .as_ref()
            .ok_or_else(|| SessionError::invalid_state("toggle a track", "devices released"))?;

        let gate = acquired.gates.gate(kind).ok_or_else(|| {
            SessionError::DeviceUnavailable(format!("no {} track was acquired", kind.as_str()))
        })?;

        gate.store(enabled, Ordering::SeqCst);
        info!("Track {} {}", kind.as_str(), if enabled { "enabled" } else { "disabled" });

        Ok(MediaTrackState { kind, enabled })
    }

    /// Current track states (empty when released)
    pub fn track_states(&self) -> Vec<MediaTrackState> {
        let Some(acquired) = &self.acquired else {
            return Vec::new();
        };

        [TrackKind::Audio, TrackKind::Video]
            .into_iter()
            .filter_map(|kind| {
                acquired.gates.gate(kind).map(|g| MediaTrackState {
                    kind,
                    enabled: g.load(Ordering::SeqCst),
                })
            })
            .collect()
    }

    /// Subscribe to the gated local frames
    pub fn feed(&self) -> Option<MediaFeed> {
        self.acquired
            .as_ref()
            .map(|a| MediaFeed::new(a.frames.subscribe()))
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired.is_some()
    }

    /// Release the devices. Safe to call any number of times.
    pub fn release(&mut self) {
        let Some(acquired) = self.acquired.take() else {
            return;
        };

        acquired.forward_task.abort();
        self.device.close();

        if self.device.is_open() {
            warn!("Capture device {} still reports open after close", self.device.name());
        }

        info!("Capture devices released");
    }
}

impl Drop for MediaController {
    fn drop(&mut self) {
        self.release();
    }
}
