//! Minimal WebM writer for Opus audio and VP8 video frames
//!
//! Produces a single segment with known sizes: EBML header, Info, Tracks and
//! Clusters of SimpleBlocks. Cues and seeking metadata are not written.

use std::time::Duration;

use crate::media::{MediaFrame, TrackKind};

const EBML: u32 = 0x1A45_DFA3;
const EBML_VERSION: u32 = 0x4286;
const EBML_READ_VERSION: u32 = 0x42F7;
const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
const DOC_TYPE: u32 = 0x4282;
const DOC_TYPE_VERSION: u32 = 0x4287;
const DOC_TYPE_READ_VERSION: u32 = 0x4285;

const SEGMENT: u32 = 0x1853_8067;
const INFO: u32 = 0x1549_A966;
const TIMECODE_SCALE: u32 = 0x2A_D7B1;
const MUXING_APP: u32 = 0x4D80;
const WRITING_APP: u32 = 0x5741;
const DURATION: u32 = 0x4489;

const TRACKS: u32 = 0x1654_AE6B;
const TRACK_ENTRY: u32 = 0xAE;
const TRACK_NUMBER: u32 = 0xD7;
const TRACK_UID: u32 = 0x73C5;
const TRACK_TYPE: u32 = 0x83;
const CODEC_ID: u32 = 0x86;
const CODEC_PRIVATE: u32 = 0x63A2;
const CODEC_DELAY: u32 = 0x56AA;
const SEEK_PRE_ROLL: u32 = 0x56BB;
const VIDEO: u32 = 0xE0;
const PIXEL_WIDTH: u32 = 0xB0;
const PIXEL_HEIGHT: u32 = 0xBA;
const AUDIO: u32 = 0xE1;
const SAMPLING_FREQUENCY: u32 = 0xB5;
const CHANNELS: u32 = 0x9F;

const CLUSTER: u32 = 0x1F43_B675;
const TIMECODE: u32 = 0xE7;
const SIMPLE_BLOCK: u32 = 0xA3;

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;
const AUDIO_TRACK: u64 = 1;
const VIDEO_TRACK: u64 = 2;

const KEYFRAME_FLAG: u8 = 0x80;

/// Opus stream parameters shared with the Ogg writer
pub const OPUS_SAMPLE_RATE: u32 = 48_000;
pub const OPUS_CHANNELS: u8 = 2;
pub const OPUS_PRE_SKIP: u16 = 3840;

/// A cluster never spans more than this, keeping block offsets well inside i16
const CLUSTER_SPAN_MS: i64 = 5_000;

/// Used when no VP8 key frame carries the picture size
const FALLBACK_DIMENSIONS: (u64, u64) = (640, 480);

/// Mux `frames` (in arrival order) into a WebM file
///
/// Audio is track 1, video track 2. A track is declared only when at least
/// one frame of that kind is present.
pub fn write_webm(frames: &[MediaFrame], duration: Duration) -> Vec<u8> {
    let has_audio = frames.iter().any(|f| f.kind == TrackKind::Audio);
    let has_video = frames.iter().any(|f| f.kind == TrackKind::Video);
    let (width, height) = frames
        .iter()
        .filter(|f| f.kind == TrackKind::Video)
        .find_map(|f| vp8_dimensions(&f.data))
        .unwrap_or(FALLBACK_DIMENSIONS);

    let mut out = Vec::new();

    master(&mut out, EBML, |header| {
        uint(header, EBML_VERSION, 1);
        uint(header, EBML_READ_VERSION, 1);
        uint(header, EBML_MAX_ID_LENGTH, 4);
        uint(header, EBML_MAX_SIZE_LENGTH, 8);
        string(header, DOC_TYPE, "webm");
        uint(header, DOC_TYPE_VERSION, 4);
        uint(header, DOC_TYPE_READ_VERSION, 2);
    });

    master(&mut out, SEGMENT, |segment| {
        master(segment, INFO, |info| {
            // Block timecodes are in milliseconds
            uint(info, TIMECODE_SCALE, 1_000_000);
            string(info, MUXING_APP, "mirror-session");
            string(info, WRITING_APP, "mirror-session");
            float(info, DURATION, duration.as_secs_f64() * 1000.0);
        });

        master(segment, TRACKS, |tracks| {
            if has_audio {
                master(tracks, TRACK_ENTRY, |entry| {
                    uint(entry, TRACK_NUMBER, AUDIO_TRACK);
                    uint(entry, TRACK_UID, AUDIO_TRACK);
                    uint(entry, TRACK_TYPE, TRACK_TYPE_AUDIO);
                    string(entry, CODEC_ID, "A_OPUS");
                    element(entry, CODEC_PRIVATE, &opus_head());
                    let pre_skip_ns = u64::from(OPUS_PRE_SKIP) * 1_000_000_000 / u64::from(OPUS_SAMPLE_RATE);
                    uint(entry, CODEC_DELAY, pre_skip_ns);
                    uint(entry, SEEK_PRE_ROLL, 80_000_000);
                    master(entry, AUDIO, |audio| {
                        float(audio, SAMPLING_FREQUENCY, f64::from(OPUS_SAMPLE_RATE));
                        uint(audio, CHANNELS, u64::from(OPUS_CHANNELS));
                    });
                });
            }
            if has_video {
                master(tracks, TRACK_ENTRY, |entry| {
                    uint(entry, TRACK_NUMBER, VIDEO_TRACK);
                    uint(entry, TRACK_UID, VIDEO_TRACK);
                    uint(entry, TRACK_TYPE, TRACK_TYPE_VIDEO);
                    string(entry, CODEC_ID, "V_VP8");
                    master(entry, VIDEO, |video| {
                        uint(video, PIXEL_WIDTH, width);
                        uint(video, PIXEL_HEIGHT, height);
                    });
                });
            }
        });

        write_clusters(segment, frames);
    });

    out
}

/// Frames sharing one cluster timecode
struct Cluster {
    start_ms: u64,
    blocks: Vec<u8>,
}

impl Cluster {
    fn new(start_ms: u64) -> Self {
        Self {
            start_ms,
            blocks: Vec::new(),
        }
    }

    fn offset(&self, timestamp_ms: u64) -> i64 {
        timestamp_ms as i64 - self.start_ms as i64
    }

    fn covers(&self, timestamp_ms: u64) -> bool {
        let offset = self.offset(timestamp_ms);
        offset < CLUSTER_SPAN_MS && offset >= i64::from(i16::MIN)
    }

    fn push(&mut self, frame: &MediaFrame) {
        let (track, keyframe) = match frame.kind {
            TrackKind::Audio => (AUDIO_TRACK, true),
            TrackKind::Video => (VIDEO_TRACK, is_vp8_keyframe(&frame.data)),
        };

        let mut block = Vec::with_capacity(frame.data.len() + 4);
        write_size(&mut block, track);
        block.extend_from_slice(&(self.offset(frame.timestamp_ms) as i16).to_be_bytes());
        block.push(if keyframe { KEYFRAME_FLAG } else { 0 });
        block.extend_from_slice(&frame.data);

        element(&mut self.blocks, SIMPLE_BLOCK, &block);
    }

    fn write_to(self, segment: &mut Vec<u8>) {
        master(segment, CLUSTER, |cluster| {
            uint(cluster, TIMECODE, self.start_ms);
            cluster.extend_from_slice(&self.blocks);
        });
    }
}

fn write_clusters(segment: &mut Vec<u8>, frames: &[MediaFrame]) {
    let mut open: Option<Cluster> = None;

    for frame in frames {
        let current = match open.take() {
            Some(cluster) if cluster.covers(frame.timestamp_ms) => cluster,
            Some(cluster) => {
                cluster.write_to(segment);
                Cluster::new(frame.timestamp_ms)
            }
            None => Cluster::new(frame.timestamp_ms),
        };
        let cluster = open.insert(current);
        cluster.push(frame);
    }

    if let Some(cluster) = open {
        cluster.write_to(segment);
    }
}

/// VP8 frame tag: bit 0 of the first byte is clear on key frames
pub fn is_vp8_keyframe(data: &[u8]) -> bool {
    data.first().is_some_and(|tag| tag & 0x01 == 0)
}

/// Picture size from a VP8 key frame header
fn vp8_dimensions(data: &[u8]) -> Option<(u64, u64)> {
    if data.len() < 10 || !is_vp8_keyframe(data) || data[3..6] != [0x9D, 0x01, 0x2A] {
        return None;
    }

    let width = u16::from_le_bytes([data[6], data[7]]) & 0x3FFF;
    let height = u16::from_le_bytes([data[8], data[9]]) & 0x3FFF;
    Some((u64::from(width), u64::from(height)))
}

/// Opus identification header, carried as CodecPrivate
fn opus_head() -> Vec<u8> {
    let mut head = Vec::with_capacity(19);
    head.extend_from_slice(b"OpusHead");
    head.push(1);
    head.push(OPUS_CHANNELS);
    head.extend_from_slice(&OPUS_PRE_SKIP.to_le_bytes());
    head.extend_from_slice(&OPUS_SAMPLE_RATE.to_le_bytes());
    head.extend_from_slice(&0u16.to_le_bytes());
    head.push(0);
    head
}

fn master(out: &mut Vec<u8>, id: u32, build: impl FnOnce(&mut Vec<u8>)) {
    let mut body = Vec::new();
    build(&mut body);
    element(out, id, &body);
}

fn element(out: &mut Vec<u8>, id: u32, body: &[u8]) {
    let id_bytes = id.to_be_bytes();
    let skip = id_bytes.iter().take_while(|b| **b == 0).count();
    out.extend_from_slice(&id_bytes[skip..]);
    write_size(out, body.len() as u64);
    out.extend_from_slice(body);
}

fn uint(out: &mut Vec<u8>, id: u32, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    element(out, id, &bytes[skip..]);
}

fn float(out: &mut Vec<u8>, id: u32, value: f64) {
    element(out, id, &value.to_be_bytes());
}

fn string(out: &mut Vec<u8>, id: u32, value: &str) {
    element(out, id, value.as_bytes());
}

/// EBML variable-length integer; all-ones values are reserved
fn write_size(out: &mut Vec<u8>, size: u64) {
    let mut len = 1;
    while len < 8 && size >= (1u64 << (7 * len)) - 1 {
        len += 1;
    }
    let marked = size | (1u64 << (7 * len));
    out.extend_from_slice(&marked.to_be_bytes()[8 - len..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(kind: TrackKind, data: &'static [u8], timestamp_ms: u64) -> MediaFrame {
        MediaFrame {
            kind,
            data: Bytes::from_static(data),
            timestamp_ms,
            duration_ms: 20,
        }
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    #[test]
    fn test_size_encoding() {
        let encode = |size| {
            let mut out = Vec::new();
            write_size(&mut out, size);
            out
        };

        assert_eq!(encode(0), vec![0x80]);
        assert_eq!(encode(126), vec![0xFE]);
        assert_eq!(encode(127), vec![0x40, 0x7F]);
        assert_eq!(encode(16_382), vec![0x7F, 0xFE]);
        assert_eq!(encode(16_383), vec![0x20, 0x3F, 0xFF]);
    }

    #[test]
    fn test_header_and_tracks() {
        let frames = [
            frame(TrackKind::Audio, b"opus-packet", 0),
            frame(TrackKind::Video, b"\x00vp8-key", 0),
        ];

        let file = write_webm(&frames, Duration::from_millis(20));

        assert_eq!(&file[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
        assert_eq!(count(&file, b"webm"), 1);
        assert_eq!(count(&file, b"A_OPUS"), 1);
        assert_eq!(count(&file, b"V_VP8"), 1);
        assert_eq!(count(&file, b"OpusHead"), 1);
        assert_eq!(count(&file, &[0x1F, 0x43, 0xB6, 0x75]), 1);
    }

    #[test]
    fn test_audio_only_declares_one_track() {
        let file = write_webm(&[frame(TrackKind::Audio, b"a", 0)], Duration::from_millis(20));

        assert_eq!(count(&file, b"A_OPUS"), 1);
        assert_eq!(count(&file, b"V_VP8"), 0);
    }

    #[test]
    fn test_long_recordings_split_clusters() {
        let frames = [
            frame(TrackKind::Audio, b"first", 0),
            frame(TrackKind::Audio, b"second", 4_000),
            frame(TrackKind::Audio, b"third", 6_000),
        ];

        let file = write_webm(&frames, Duration::from_secs(6));

        assert_eq!(count(&file, &[0x1F, 0x43, 0xB6, 0x75]), 2);
    }

    #[test]
    fn test_vp8_keyframe_flag_and_dimensions() {
        // Key frame tag, start code, 320x240
        let key: &[u8] = &[0x50, 0x42, 0x00, 0x9D, 0x01, 0x2A, 0x40, 0x01, 0xF0, 0x00];
        assert!(is_vp8_keyframe(key));
        assert_eq!(vp8_dimensions(key), Some((320, 240)));

        let inter: &[u8] = &[0x31, 0x00, 0x00];
        assert!(!is_vp8_keyframe(inter));
        assert_eq!(vp8_dimensions(inter), None);
    }
}
