use bytes::Bytes;
use std::io::Cursor;
use std::time::Duration;
use webrtc::media::io::ogg_writer::OggWriter;
use webrtc::media::io::Writer;
use webrtc::rtp::header::Header;
use webrtc::rtp::packet::Packet;

use super::webm::{write_webm, OPUS_CHANNELS, OPUS_SAMPLE_RATE};
use crate::error::{SessionError, SessionResult};
use crate::media::{MediaFrame, TrackKind};

/// Base mime type with parameters (`;codecs=...`) stripped
pub fn base_mime_type(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or(mime_type).trim()
}

/// Container a recording is finalized into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// `video/webm`: Opus and VP8
    VideoWebm,
    /// `audio/webm`: Opus only
    AudioWebm,
    /// `audio/ogg`: Opus only
    AudioOgg,
}

impl ContainerFormat {
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        match base_mime_type(mime_type).to_ascii_lowercase().as_str() {
            "video/webm" => Some(Self::VideoWebm),
            "audio/webm" => Some(Self::AudioWebm),
            "audio/ogg" => Some(Self::AudioOgg),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::VideoWebm | Self::AudioWebm => "webm",
            Self::AudioOgg => "ogg",
        }
    }

    /// Whether frames of `kind` end up in this container
    pub fn records(&self, kind: TrackKind) -> bool {
        match self {
            Self::VideoWebm => true,
            Self::AudioWebm | Self::AudioOgg => kind == TrackKind::Audio,
        }
    }

    /// Mux recorded frames into the container bytes
    pub fn mux(&self, frames: &[MediaFrame], duration: Duration) -> SessionResult<Bytes> {
        match self {
            Self::VideoWebm | Self::AudioWebm => Ok(Bytes::from(write_webm(frames, duration))),
            Self::AudioOgg => write_ogg(frames).map(Bytes::from).map_err(|e| {
                SessionError::RecordingUnsupported(format!("could not write ogg recording: {}", e))
            }),
        }
    }
}

/// Opus frames into an Ogg stream via the webrtc media writer
fn write_ogg(frames: &[MediaFrame]) -> Result<Vec<u8>, webrtc::media::Error> {
    let mut cursor = Cursor::new(Vec::new());

    {
        let mut writer = OggWriter::new(&mut cursor, OPUS_SAMPLE_RATE, OPUS_CHANNELS)?;
        let mut last_timestamp = 0u32;
        let mut written = 0usize;

        for frame in frames.iter().filter(|f| f.kind == TrackKind::Audio) {
            if frame.data.is_empty() {
                continue;
            }

            // Granule positions follow the 48 kHz RTP clock and must not go backwards
            let timestamp = ((frame.timestamp_ms * u64::from(OPUS_SAMPLE_RATE / 1000)) as u32).max(last_timestamp);
            last_timestamp = timestamp;

            let packet = Packet {
                header: Header {
                    timestamp,
                    sequence_number: written as u16,
                    ..Default::default()
                },
                payload: frame.data.clone(),
            };
            writer.write_rtp(&packet)?;
            written += 1;
        }

        // Closing rewrites the last page as end-of-stream, which needs one
        if written > 0 {
            writer.close()?;
        }
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_matching_ignores_case_and_parameters() {
        assert_eq!(
            ContainerFormat::from_mime_type("video/webm;codecs=vp8,opus"),
            Some(ContainerFormat::VideoWebm)
        );
        assert_eq!(
            ContainerFormat::from_mime_type("AUDIO/OGG"),
            Some(ContainerFormat::AudioOgg)
        );
        assert_eq!(ContainerFormat::from_mime_type("video/x-matroska"), None);
        assert_eq!(ContainerFormat::from_mime_type("video/mp4"), None);
    }

    #[test]
    fn test_audio_containers_skip_video() {
        assert!(ContainerFormat::VideoWebm.records(TrackKind::Video));
        assert!(!ContainerFormat::AudioWebm.records(TrackKind::Video));
        assert!(ContainerFormat::AudioOgg.records(TrackKind::Audio));
    }

    #[test]
    fn test_ogg_stream_pages() {
        let frames = [
            MediaFrame {
                kind: TrackKind::Audio,
                data: Bytes::from_static(b"\xf8\xff\xfe"),
                timestamp_ms: 0,
                duration_ms: 20,
            },
            MediaFrame {
                kind: TrackKind::Audio,
                data: Bytes::from_static(b"\xf8\xff\xfe"),
                timestamp_ms: 20,
                duration_ms: 20,
            },
        ];

        let bytes = ContainerFormat::AudioOgg.mux(&frames, Duration::from_millis(40)).unwrap();

        assert_eq!(&bytes[..4], b"OggS");
        assert!(bytes.windows(8).any(|w| w == b"OpusHead"));
        assert!(bytes.windows(8).any(|w| w == b"OpusTags"));
    }

    #[test]
    fn test_empty_ogg_has_headers_only() {
        let bytes = ContainerFormat::AudioOgg.mux(&[], Duration::ZERO).unwrap();
        assert_eq!(&bytes[..4], b"OggS");
    }
}
