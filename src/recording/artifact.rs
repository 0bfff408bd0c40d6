use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use super::container::ContainerFormat;

/// Container mime types a recording can be finalized into
pub const SUPPORTED_MIME_TYPES: [&str; 3] = ["video/webm", "audio/webm", "audio/ogg"];

pub fn is_supported_mime_type(mime_type: &str) -> bool {
    ContainerFormat::from_mime_type(mime_type).is_some()
}

/// File extension implied by a container mime type
pub fn extension_for(mime_type: &str) -> &'static str {
    ContainerFormat::from_mime_type(mime_type).map_or("webm", |format| format.extension())
}

/// Finalized recording, immutable once created
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    id: Uuid,
    mime_type: String,
    bytes: Bytes,
    duration: Duration,
    chunk_count: usize,
    created_at: DateTime<Utc>,
}

impl RecordingArtifact {
    pub fn new(mime_type: impl Into<String>, bytes: Bytes, duration: Duration, chunk_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            mime_type: mime_type.into(),
            bytes,
            duration,
            chunk_count,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Number of captured chunks concatenated into the artifact
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// `session-rec-<unix-ms>.<ext>`
    pub fn file_name(&self) -> String {
        format!(
            "session-rec-{}.{}",
            self.created_at.timestamp_millis(),
            extension_for(&self.mime_type)
        )
    }

    /// Write the artifact into `dir`, creating it if needed
    pub fn save_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create recording directory: {}", dir.display()))?;

        let path = dir.join(self.file_name());
        std::fs::write(&path, &self.bytes)
            .with_context(|| format!("Failed to write recording: {}", path.display()))?;

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_parameters_ignored() {
        assert!(is_supported_mime_type("video/webm;codecs=vp8,opus"));
        assert!(is_supported_mime_type("audio/ogg"));
        assert!(!is_supported_mime_type("video/x-matroska"));
        assert!(!is_supported_mime_type("video/mp4"));
        assert_eq!(extension_for("AUDIO/OGG; codecs=opus"), "ogg");
        assert_eq!(extension_for("Video/WebM"), "webm");
    }

    #[test]
    fn test_file_name() {
        let artifact = RecordingArtifact::new("video/webm", Bytes::from_static(b"abc"), Duration::from_secs(1), 1);
        let name = artifact.file_name();
        assert!(name.starts_with("session-rec-"));
        assert!(name.ends_with(".webm"));
    }
}
