use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::status::SessionStatus;
use crate::call::{CallNotice, CallSession, ConnectionManager};
use crate::config::{CaptureConfig, RecordingConfig};
use crate::error::{SessionError, SessionResult};
use crate::media::{MediaController, MediaTrackState, TrackKind};
use crate::recording::{RecordingArtifact, RecordingController, RecordingState};
use crate::signaling::LocalIdentity;

type Reply<T> = oneshot::Sender<T>;

/// Requests from `SessionHandle` to the worker
pub(crate) enum Command {
    AcquireMedia {
        reply: Reply<SessionResult<Vec<MediaTrackState>>>,
    },
    Connect {
        reply: Reply<SessionResult<LocalIdentity>>,
    },
    SetTrack {
        kind: TrackKind,
        enabled: bool,
        reply: Reply<SessionResult<MediaTrackState>>,
    },
    Dial {
        target: LocalIdentity,
        reply: Reply<SessionResult<CallSession>>,
    },
    Accept {
        reply: Reply<SessionResult<CallNotice>>,
    },
    Reject {
        reply: Reply<SessionResult<CallNotice>>,
    },
    EndCall {
        reply: Reply<Option<CallNotice>>,
    },
    StartRecording {
        reply: Reply<SessionResult<()>>,
    },
    StopRecording {
        reply: Reply<SessionResult<RecordingArtifact>>,
    },
    Leave {
        reply: Reply<Option<RecordingArtifact>>,
    },
    Status {
        reply: Reply<SessionStatus>,
    },
}

/// Single owner of media, call and recording state
///
/// Commands and inbound signaling are consumed from one loop, so every state
/// transition happens on this task.
pub struct SessionWorker {
    capture: CaptureConfig,
    recording_config: RecordingConfig,
    media: MediaController,
    calls: ConnectionManager,
    recording: Option<RecordingController>,
    commands: mpsc::Receiver<Command>,
    notices: broadcast::Sender<CallNotice>,
}

impl SessionWorker {
    pub(crate) fn new(
        capture: CaptureConfig,
        recording_config: RecordingConfig,
        media: MediaController,
        calls: ConnectionManager,
        commands: mpsc::Receiver<Command>,
        notices: broadcast::Sender<CallNotice>,
    ) -> Self {
        Self {
            capture,
            recording_config,
            media,
            calls,
            recording: None,
            commands,
            notices,
        }
    }

    pub async fn run(mut self) {
        info!("Session worker started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = self.calls.next_event() => {
                    if let Some(notice) = self.calls.handle_event(event).await {
                        self.publish(notice);
                    }
                }
            }
        }

        self.leave().await;
        info!("Session worker stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::AcquireMedia { reply } => {
                let result = self.media.acquire(&self.capture).await;
                let _ = reply.send(result);
            }
            Command::Connect { reply } => {
                let result = self.calls.signaling_mut().connect().await;
                let _ = reply.send(result);
            }
            Command::SetTrack { kind, enabled, reply } => {
                let _ = reply.send(self.media.set_track_enabled(kind, enabled));
            }
            Command::Dial { target, reply } => {
                let result = self.calls.dial(target, &self.media).await;
                let _ = reply.send(result);
            }
            Command::Accept { reply } => {
                let result = self.calls.accept(&self.media).await;
                if let Ok(notice) = &result {
                    self.publish(notice.clone());
                }
                let _ = reply.send(result);
            }
            Command::Reject { reply } => {
                let result = self.calls.reject().await;
                if let Ok(notice) = &result {
                    self.publish(notice.clone());
                }
                let _ = reply.send(result);
            }
            Command::EndCall { reply } => {
                let notice = self.calls.end().await;
                if let Some(notice) = &notice {
                    self.publish(notice.clone());
                }
                let _ = reply.send(notice);
            }
            Command::StartRecording { reply } => {
                let _ = reply.send(self.start_recording());
            }
            Command::StopRecording { reply } => {
                let result = self.stop_recording().await;
                let _ = reply.send(result);
            }
            Command::Leave { reply } => {
                let artifact = self.leave().await;
                let _ = reply.send(artifact);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn start_recording(&mut self) -> SessionResult<()> {
        if let Some(recording) = &self.recording {
            if recording.state() != RecordingState::Finalized {
                return Err(SessionError::invalid_state("start recording", recording.state()));
            }
        }

        // Each recording gets a fresh controller; a failed start leaves none
        let mut recording = RecordingController::new(&self.recording_config);
        recording.start(self.media.feed())?;
        self.recording = Some(recording);
        Ok(())
    }

    async fn stop_recording(&mut self) -> SessionResult<RecordingArtifact> {
        match self.recording.as_mut() {
            Some(recording) => recording.stop().await,
            None => Err(SessionError::invalid_state("stop recording", RecordingState::Idle)),
        }
    }

    /// End the call, stop recording, release devices and go offline
    async fn leave(&mut self) -> Option<RecordingArtifact> {
        if let Some(notice) = self.calls.end().await {
            self.publish(notice);
        }

        let artifact = match self.recording.as_ref().map(|r| r.state()) {
            Some(RecordingState::Recording) => match self.stop_recording().await {
                Ok(artifact) => Some(artifact),
                Err(e) => {
                    warn!("Failed to finalize recording on leave: {}", e);
                    None
                }
            },
            _ => None,
        };
        self.recording = None;

        self.media.release();
        self.calls.signaling_mut().disconnect().await;

        info!("Left session");
        artifact
    }

    fn status(&self) -> SessionStatus {
        let signaling = self.calls.signaling();

        SessionStatus {
            identity: signaling.identity().cloned(),
            signaling_online: signaling.is_online(),
            media_acquired: self.media.is_acquired(),
            tracks: self.media.track_states(),
            call: self.calls.session().cloned(),
            recording: self
                .recording
                .as_ref()
                .map(|r| r.state())
                .unwrap_or(RecordingState::Idle),
            recorded_chunks: self
                .recording
                .as_ref()
                .map(|r| r.buffered_chunks())
                .unwrap_or(0),
        }
    }

    fn publish(&self, notice: CallNotice) {
        debug!("Call notice: {:?}", notice);
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }
}
