pub mod artifact;
pub mod container;
pub mod controller;
pub mod webm;

pub use artifact::{RecordingArtifact, SUPPORTED_MIME_TYPES};
pub use container::ContainerFormat;
pub use controller::{RecordingController, RecordingState};
