use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{error, info, warn};

use super::status::{ArtifactSummary, SessionOutcome, SessionStatus, StartReport};
use super::worker::{Command, SessionWorker};
use crate::analysis::AnalysisClient;
use crate::call::{CallNotice, CallSession, ConnectionManager, PeerLinkFactory};
use crate::config::Config;
use crate::error::{SessionError, SessionResult};
use crate::media::{CaptureDevice, MediaController, MediaTrackState, TrackKind};
use crate::recording::RecordingArtifact;
use crate::signaling::{LocalIdentity, Relay, SignalingClient};

const COMMAND_CAPACITY: usize = 32;
const NOTICE_CAPACITY: usize = 64;

/// Cloneable front end of a running `SessionWorker`
///
/// Analysis uploads run on the caller's task, never on the worker.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    notices: broadcast::Sender<CallNotice>,
    analysis: Arc<AnalysisClient>,
    output_dir: Option<PathBuf>,
}

/// Wire the session components together and start the worker
///
/// The worker runs until every handle is dropped, then releases all devices.
pub fn spawn_session(
    config: &Config,
    relay: Arc<dyn Relay>,
    peers: Arc<dyn PeerLinkFactory>,
    device: Box<dyn CaptureDevice>,
    analysis: AnalysisClient,
) -> SessionHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
    let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);

    let signaling = SignalingClient::new(relay, config.relay.identity_timeout());
    let worker = SessionWorker::new(
        config.capture.clone(),
        config.recording.clone(),
        MediaController::new(device),
        ConnectionManager::new(signaling, peers),
        command_rx,
        notice_tx.clone(),
    );
    tokio::spawn(worker.run());

    SessionHandle {
        commands: command_tx,
        notices: notice_tx,
        analysis: Arc::new(analysis),
        output_dir: config
            .recording
            .output_dir
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).as_ref())),
    }
}

impl SessionHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> SessionResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SessionError::WorkerGone)?;
        response.await.map_err(|_| SessionError::WorkerGone)
    }

    /// Acquire devices, then try to come online
    ///
    /// Device errors fail the start. An unreachable relay does not: local
    /// media keeps running and the reason is reported.
    pub async fn start(&self) -> SessionResult<StartReport> {
        let tracks = self.acquire_media().await?;

        let (identity, relay_error) = match self.connect().await {
            Ok(identity) => (Some(identity), None),
            Err(SessionError::RelayUnreachable(reason)) => {
                warn!("Session started offline: {}", reason);
                (None, Some(reason))
            }
            Err(e) => return Err(e),
        };

        Ok(StartReport {
            tracks,
            identity,
            relay_error,
        })
    }

    pub async fn acquire_media(&self) -> SessionResult<Vec<MediaTrackState>> {
        self.request(|reply| Command::AcquireMedia { reply }).await?
    }

    pub async fn connect(&self) -> SessionResult<LocalIdentity> {
        self.request(|reply| Command::Connect { reply }).await?
    }

    pub async fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> SessionResult<MediaTrackState> {
        self.request(|reply| Command::SetTrack { kind, enabled, reply })
            .await?
    }

    pub async fn dial(&self, target: LocalIdentity) -> SessionResult<CallSession> {
        self.request(|reply| Command::Dial { target, reply }).await?
    }

    pub async fn accept(&self) -> SessionResult<CallNotice> {
        self.request(|reply| Command::Accept { reply }).await?
    }

    pub async fn reject(&self) -> SessionResult<CallNotice> {
        self.request(|reply| Command::Reject { reply }).await?
    }

    /// Hang up; `None` when no call was active
    pub async fn end_call(&self) -> SessionResult<Option<CallNotice>> {
        self.request(|reply| Command::EndCall { reply }).await
    }

    pub async fn start_recording(&self) -> SessionResult<()> {
        self.request(|reply| Command::StartRecording { reply })
            .await?
    }

    pub async fn stop_recording(&self) -> SessionResult<RecordingArtifact> {
        self.request(|reply| Command::StopRecording { reply })
            .await?
    }

    /// Stop the recording and run it through analysis
    pub async fn finish_recording(&self) -> SessionResult<SessionOutcome> {
        let artifact = self.stop_recording().await?;
        Ok(self.analyse(artifact).await)
    }

    /// Leave the session; analyses the recording if one was running
    pub async fn leave(&self) -> SessionResult<Option<SessionOutcome>> {
        let artifact = self.request(|reply| Command::Leave { reply }).await?;

        match artifact {
            Some(artifact) => Ok(Some(self.analyse(artifact).await)),
            None => Ok(None),
        }
    }

    pub async fn status(&self) -> SessionResult<SessionStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Subscribe to call notices from now on
    pub fn notices(&self) -> broadcast::Receiver<CallNotice> {
        self.notices.subscribe()
    }

    async fn analyse(&self, artifact: RecordingArtifact) -> SessionOutcome {
        let saved_to = self.output_dir.as_ref().and_then(|dir| match artifact.save_to(dir) {
            Ok(path) => {
                info!("Recording saved to {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("Failed to save recording: {:#}", e);
                None
            }
        });

        let analysis = self.analysis.submit(&artifact).await;

        SessionOutcome {
            artifact: ArtifactSummary::new(&artifact, saved_to),
            analysis,
        }
    }
}
