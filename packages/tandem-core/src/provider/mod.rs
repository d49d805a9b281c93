//! Remote media provider contract.
//!
//! The provider is a third-party embeddable video backend. The core never talks
//! to it directly: each player instance sits behind [`ProviderPlayer`], is
//! constructed through a [`ProviderFactory`], and reports back through a
//! [`ProviderEventSink`] that is pre-tagged with the session generation and the
//! stream role it belongs to.

pub mod simulated;
mod traits;

pub use traits::{ProviderFactory, ProviderPlayer};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;

/// Which of the two streams a player instance drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamRole {
    /// Foreground, audible, user-visible stream.
    Leader,
    /// Background, muted, blurred ambient-light stream.
    Follower,
}

impl StreamRole {
    /// Mount point identifier used when constructing a player for this role.
    pub fn mount_point(self) -> &'static str {
        match self {
            Self::Leader => "tandem-leader",
            Self::Follower => "tandem-follower",
        }
    }
}

/// Player state reported by a provider `stateChange` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

impl ProviderState {
    /// Maps the provider's numeric state code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::Unstarted),
            0 => Some(Self::Ended),
            1 => Some(Self::Playing),
            2 => Some(Self::Paused),
            3 => Some(Self::Buffering),
            5 => Some(Self::Cued),
            _ => None,
        }
    }
}

/// Classified provider runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "code", rename_all = "camelCase")]
pub enum ProviderFault {
    /// The stream identifier or start parameters were rejected.
    InvalidParameter,
    /// The provider's internal player failed.
    PlayerFailure,
    /// The stream does not exist or was removed.
    NotFound,
    /// The stream owner does not allow embedded playback.
    EmbedForbidden,
    /// Any other numeric error code.
    Other(i32),
}

impl ProviderFault {
    /// Maps the provider's numeric error code.
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => Self::InvalidParameter,
            5 => Self::PlayerFailure,
            100 => Self::NotFound,
            101 | 150 => Self::EmbedForbidden,
            other => Self::Other(other),
        }
    }
}

/// What a provider reported.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProviderEventKind {
    Ready,
    StateChange(ProviderState),
    Error(ProviderFault),
}

/// A provider notification, tagged with where it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderEvent {
    /// Session generation the emitting player was constructed in.
    pub generation: u64,
    /// Role of the emitting player.
    pub role: StreamRole,
    pub kind: ProviderEventKind,
}

/// Sender handed to each constructed player.
///
/// Emitting after the session has dropped its receiver is a silent no-op: a
/// player outliving its session must not be able to revive it.
#[derive(Debug, Clone)]
pub struct ProviderEventSink {
    tx: mpsc::UnboundedSender<ProviderEvent>,
    generation: u64,
    role: StreamRole,
}

impl ProviderEventSink {
    pub fn new(tx: mpsc::UnboundedSender<ProviderEvent>, generation: u64, role: StreamRole) -> Self {
        Self {
            tx,
            generation,
            role,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn role(&self) -> StreamRole {
        self.role
    }

    /// Emits an event. Returns `false` if nobody is listening any more.
    pub fn emit(&self, kind: ProviderEventKind) -> bool {
        self.tx
            .send(ProviderEvent {
                generation: self.generation,
                role: self.role,
                kind,
            })
            .is_ok()
    }
}

/// Start configuration for a provider player.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerOptions {
    pub autoplay: bool,
    pub inline_playback: bool,
    /// Show the provider's own controls. Always off: the control surface owns
    /// the chrome.
    pub native_controls: bool,
    pub muted: bool,
    pub start_seconds: f64,
}

impl PlayerOptions {
    /// Options for a player whose playback the session starts explicitly.
    pub fn cued(start_seconds: f64) -> Self {
        Self {
            autoplay: false,
            inline_playback: true,
            native_controls: false,
            muted: true,
            start_seconds: start_seconds.max(0.0),
        }
    }
}

/// Provider-side failures.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider could not construct a player.
    #[error("player construction failed: {0}")]
    Construction(String),

    /// The provider threw while tearing a player down.
    #[error("player teardown failed: {0}")]
    Teardown(String),

    /// The provider is not loaded.
    #[error("provider unavailable")]
    Unavailable,
}
