//! Session orchestration
//!
//! A `SessionWorker` task owns the media, call and recording controllers and
//! is driven through cloneable `SessionHandle`s:
//! - start: acquire devices and connect signaling
//! - dial / accept / reject / end a call
//! - start and finish a recording, with analysis
//! - leave: tear everything down

mod handle;
mod status;
mod worker;

pub use handle::{spawn_session, SessionHandle};
pub use status::{ArtifactSummary, SessionOutcome, SessionStatus, StartReport};
pub use worker::SessionWorker;
