//! Playback layer.
//!
//! - [`handle`]: uniform wrapper around one provider player
//! - [`machine`]: playback state machine and its auxiliary flags
//! - [`reveal`]: cancellable warmup/settle/reveal schedule
//! - [`drift`]: progress sampling and follower correction
//! - [`session`]: one leader/follower pair for one stream identifier
//! - [`driver`]: the task that owns a session

pub mod drift;
pub mod driver;
pub mod handle;
pub mod machine;
pub mod reveal;
pub mod session;

pub use drift::{DriftCorrection, DriftCorrector, ProgressSample};
pub use driver::{SessionCommand, SessionDriver};
pub use handle::StreamHandle;
pub use machine::{PlaybackMachine, PlaybackState};
pub use reveal::{RevealSequencer, RevealStep, SequencePhase};
pub use session::{MaskState, PlaybackSnapshot, Readiness, Session};
