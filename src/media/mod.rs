//! Local capture device ownership
//!
//! `MediaController` holds the exclusive device lock and republishes frames
//! of enabled tracks to any number of `MediaFeed` subscribers (the recorder
//! and the peer link).

pub mod capture;
pub mod controller;

pub use capture::{CaptureDevice, MediaFrame, SyntheticCapture, TrackKind};
pub use controller::{MediaController, MediaFeed, MediaTrackState};
