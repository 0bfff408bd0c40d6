// Shared fakes for integration tests
//
// FakePeers stands in for the WebRTC stack and ManualCapture lets a test push
// frames into the media pipeline by hand.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use mirror_session::call::{PeerLink, PeerLinkFactory};
use mirror_session::config::CaptureConfig;
use mirror_session::error::{SessionError, SessionResult};
use mirror_session::media::{CaptureDevice, MediaFeed, MediaFrame, MediaTrackState, TrackKind};
use mirror_session::signaling::SignalDescriptor;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Counters shared between a FakePeers factory and its links
#[derive(Default)]
pub struct PeerCounters {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub answers_applied: AtomicUsize,
    pub fail_offer: AtomicBool,
    pub fail_answer: AtomicBool,
    pub fail_apply: AtomicBool,
    /// Track kinds negotiated by the last link
    pub last_tracks: Mutex<Vec<TrackKind>>,
}

#[derive(Clone, Default)]
pub struct FakePeers {
    pub counters: Arc<PeerCounters>,
}

impl FakePeers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> usize {
        self.counters.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn answers_applied(&self) -> usize {
        self.counters.answers_applied.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerLinkFactory for FakePeers {
    async fn create(
        &self,
        tracks: &[MediaTrackState],
        _feed: Option<MediaFeed>,
    ) -> SessionResult<Box<dyn PeerLink>> {
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        *self.counters.last_tracks.lock() = tracks.iter().map(|t| t.kind).collect();

        Ok(Box::new(FakeLink {
            counters: Arc::clone(&self.counters),
            closed: false,
        }))
    }
}

struct FakeLink {
    counters: Arc<PeerCounters>,
    closed: bool,
}

#[async_trait]
impl PeerLink for FakeLink {
    async fn create_offer(&mut self) -> SessionResult<SignalDescriptor> {
        if self.counters.fail_offer.load(Ordering::SeqCst) {
            return Err(SessionError::NegotiationFailure("offer refused".to_string()));
        }
        Ok(SignalDescriptor::offer("v=0\r\ns=fake-offer\r\n"))
    }

    async fn accept_offer(&mut self, _offer: &SignalDescriptor) -> SessionResult<SignalDescriptor> {
        if self.counters.fail_answer.load(Ordering::SeqCst) {
            return Err(SessionError::NegotiationFailure("answer refused".to_string()));
        }
        Ok(SignalDescriptor::answer("v=0\r\ns=fake-answer\r\n"))
    }

    async fn apply_answer(&mut self, _answer: &SignalDescriptor) -> SessionResult<()> {
        if self.counters.fail_apply.load(Ordering::SeqCst) {
            return Err(SessionError::NegotiationFailure("answer rejected".to_string()));
        }
        self.counters.answers_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Capture device driven by the test
///
/// `open` hands its frame sender to the shared slot so the test can push
/// frames; `close` drops it.
#[derive(Clone, Default)]
pub struct ManualCapture {
    pub sender: Arc<Mutex<Option<mpsc::Sender<MediaFrame>>>>,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub deny: Arc<AtomicBool>,
    pub pushed: Arc<AtomicU64>,
}

impl ManualCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denied() -> Self {
        let capture = Self::default();
        capture.deny.store(true, Ordering::SeqCst);
        capture
    }

    pub fn is_held(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Push one 20ms frame; false when the device is closed
    pub async fn push(&self, kind: TrackKind, payload: &'static [u8]) -> bool {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            return false;
        };

        sender
            .send(MediaFrame {
                kind,
                data: Bytes::from_static(payload),
                timestamp_ms: self.pushed.fetch_add(1, Ordering::SeqCst) * 20,
                duration_ms: 20,
            })
            .await
            .is_ok()
    }
}

#[async_trait]
impl CaptureDevice for ManualCapture {
    async fn open(&mut self, config: &CaptureConfig) -> SessionResult<mpsc::Receiver<MediaFrame>> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(SessionError::DeviceAccessDenied(
                "camera permission refused".to_string(),
            ));
        }
        if self.is_held() {
            return Err(SessionError::DeviceUnavailable("device busy".to_string()));
        }

        let (tx, rx) = mpsc::channel(config.feed_capacity.max(1));
        *self.sender.lock() = Some(tx);
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    fn close(&mut self) {
        if self.sender.lock().take().is_some() {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.is_held()
    }

    fn name(&self) -> &str {
        "manual"
    }
}

/// Let spawned forwarding tasks run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Byte offset of `needle` inside a recording
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];
