use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::analysis::AnalysisResult;
use crate::call::CallSession;
use crate::media::MediaTrackState;
use crate::recording::{RecordingArtifact, RecordingState};
use crate::signaling::LocalIdentity;

/// Snapshot of everything the session owns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Identity assigned by the relay, if signaling is online
    pub identity: Option<LocalIdentity>,

    pub signaling_online: bool,

    pub media_acquired: bool,

    /// Local tracks and whether each is transmitting
    pub tracks: Vec<MediaTrackState>,

    /// Current or most recently ended call
    pub call: Option<CallSession>,

    pub recording: RecordingState,

    /// Chunks captured by the running recording
    pub recorded_chunks: usize,
}

/// Result of `start`: devices are held, signaling may still be offline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartReport {
    pub tracks: Vec<MediaTrackState>,
    pub identity: Option<LocalIdentity>,
    /// Why the relay could not be reached; local media keeps running
    pub relay_error: Option<String>,
}

/// Metadata of a finalized recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub id: Uuid,
    pub mime_type: String,
    pub file_name: String,
    pub size_bytes: usize,
    pub duration_secs: f64,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub saved_to: Option<PathBuf>,
}

impl ArtifactSummary {
    pub fn new(artifact: &RecordingArtifact, saved_to: Option<PathBuf>) -> Self {
        Self {
            id: artifact.id(),
            mime_type: artifact.mime_type().to_string(),
            file_name: artifact.file_name(),
            size_bytes: artifact.len(),
            duration_secs: artifact.duration().as_secs_f64(),
            chunk_count: artifact.chunk_count(),
            created_at: artifact.created_at(),
            saved_to,
        }
    }
}

/// The finished result handed back to the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub artifact: ArtifactSummary,
    pub analysis: AnalysisResult,
}
