use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::artifact::RecordingArtifact;
use super::container::ContainerFormat;
use crate::config::RecordingConfig;
use crate::error::{SessionError, SessionResult};
use crate::media::{MediaFeed, MediaFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Recording,
    Stopping,
    Finalized,
}

/// Background task keeping recorded frames in arrival order
struct Collector {
    format: ContainerFormat,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
    frames: Arc<Mutex<Vec<MediaFrame>>>,
    lagged: Arc<AtomicU64>,
    started: Instant,
}

/// One recording of the local media, independent of the call state
pub struct RecordingController {
    mime_type: String,
    state: RecordingState,
    collector: Option<Collector>,
}

impl RecordingController {
    pub fn new(config: &RecordingConfig) -> Self {
        Self {
            mime_type: config.mime_type.clone(),
            state: RecordingState::Idle,
            collector: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Frames captured so far
    pub fn buffered_chunks(&self) -> usize {
        self.collector
            .as_ref()
            .map(|c| c.frames.lock().len())
            .unwrap_or(0)
    }

    /// Begin collecting frames from `feed`
    ///
    /// Without a feed (no devices acquired) or with a container we cannot
    /// produce, the controller stays `Idle`.
    pub fn start(&mut self, feed: Option<MediaFeed>) -> SessionResult<()> {
        if self.state != RecordingState::Idle {
            return Err(SessionError::invalid_state("start recording", self.state));
        }

        let Some(format) = ContainerFormat::from_mime_type(&self.mime_type) else {
            return Err(SessionError::RecordingUnsupported(format!(
                "container {} is not supported",
                self.mime_type
            )));
        };

        let Some(feed) = feed else {
            return Err(SessionError::RecordingUnsupported(
                "no local media to record".to_string(),
            ));
        };

        let frames = Arc::new(Mutex::new(Vec::new()));
        let lagged = Arc::new(AtomicU64::new(0));
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(collect_frames(
            feed.into_receiver(),
            stop_rx,
            format,
            Arc::clone(&frames),
            Arc::clone(&lagged),
        ));

        self.collector = Some(Collector {
            format,
            stop_tx,
            task,
            frames,
            lagged,
            started: Instant::now(),
        });
        self.state = RecordingState::Recording;

        info!("Recording started ({})", self.mime_type);
        Ok(())
    }

    /// Stop collecting, flush what is still queued and finalize the artifact
    pub async fn stop(&mut self) -> SessionResult<RecordingArtifact> {
        if self.state != RecordingState::Recording {
            return Err(SessionError::invalid_state("stop recording", self.state));
        }

        let collector = self
            .collector
            .take()
            .ok_or_else(|| SessionError::invalid_state("stop recording", self.state))?;
        self.state = RecordingState::Stopping;

        let _ = collector.stop_tx.send(());
        if let Err(e) = collector.task.await {
            warn!("Recording collector ended abnormally: {}", e);
        }

        let duration = collector.started.elapsed();
        let frames = std::mem::take(&mut *collector.frames.lock());

        let lagged = collector.lagged.load(Ordering::Relaxed);
        if lagged > 0 {
            warn!("Recording skipped {} frames the collector could not keep up with", lagged);
        }

        let bytes = match collector.format.mux(&frames, duration) {
            Ok(bytes) => bytes,
            Err(e) => {
                // Nothing left to retry with; the frames are gone
                self.state = RecordingState::Finalized;
                return Err(e);
            }
        };

        let artifact = RecordingArtifact::new(self.mime_type.clone(), bytes, duration, frames.len());
        self.state = RecordingState::Finalized;

        info!(
            "Recording finalized: {} frames, {} bytes, {:.1}s",
            artifact.chunk_count(),
            artifact.len(),
            artifact.duration().as_secs_f64()
        );

        Ok(artifact)
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        if let Some(collector) = self.collector.take() {
            collector.task.abort();
        }
    }
}

async fn collect_frames(
    mut rx: broadcast::Receiver<MediaFrame>,
    mut stop_rx: oneshot::Receiver<()>,
    format: ContainerFormat,
    frames: Arc<Mutex<Vec<MediaFrame>>>,
    lagged: Arc<AtomicU64>,
) {
    let keep = |frame: MediaFrame| {
        if format.records(frame.kind) {
            frames.lock().push(frame);
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            frame = rx.recv() => match frame {
                Ok(frame) => keep(frame),
                Err(RecvError::Lagged(skipped)) => {
                    lagged.fetch_add(skipped, Ordering::Relaxed);
                }
                Err(RecvError::Closed) => {
                    debug!("Media feed closed while recording");
                    return;
                }
            },
        }
    }

    // Final flush of frames already queued when stop arrived
    loop {
        match rx.try_recv() {
            Ok(frame) => keep(frame),
            Err(TryRecvError::Lagged(skipped)) => {
                lagged.fetch_add(skipped, Ordering::Relaxed);
            }
            Err(_) => break,
        }
    }
}
