//! Event system for playback observers.
//!
//! This module provides:
//! - [`EventEmitter`] trait for the session and control surface to emit events
//! - [`BroadcastEventBridge`] for fan-out to any number of subscribers
//! - Event types for the playback engine and the control surface

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::playback::{DriftCorrection, PlaybackState};
use crate::provider::{ProviderFault, StreamRole};
use crate::surface::keyboard::Shortcut;

/// Events delivered to subscribers of a [`BroadcastEventBridge`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum TandemEvent {
    /// Events from the playback session.
    Playback(PlaybackEvent),

    /// Events from the control surface.
    Surface(SurfaceEvent),
}

/// Events related to the playback session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    /// The authoritative playback state changed.
    StateChanged {
        #[serde(rename = "streamId")]
        stream_id: String,
        from: PlaybackState,
        to: PlaybackState,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A provider player was constructed.
    HandleCreated {
        #[serde(rename = "streamId")]
        stream_id: String,
        role: StreamRole,
        generation: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A provider player was destroyed.
    HandleDestroyed {
        #[serde(rename = "streamId")]
        stream_id: String,
        role: StreamRole,
        generation: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The leader started playing under the mask; the reveal sequence is armed.
    SyncArmed {
        #[serde(rename = "streamId")]
        stream_id: String,
        /// Sync capture point in seconds.
        #[serde(rename = "capturePoint")]
        capture_point: f64,
        epoch: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The mask lifted and the control surface became interactive.
    Revealed {
        #[serde(rename = "streamId")]
        stream_id: String,
        /// Leader position at reveal, in seconds.
        position: f64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The target volume was (re-)asserted on the leader.
    VolumeRestored {
        #[serde(rename = "streamId")]
        stream_id: String,
        /// Provider-scale volume.
        volume: u8,
        /// Pulse index, `None` for the initial restoration.
        pulse: Option<usize>,
        /// Whether the zero read-back nudge was applied.
        nudged: bool,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The follower was re-seeked.
    DriftCorrected {
        #[serde(rename = "streamId")]
        stream_id: String,
        /// `leader - follower`, in seconds.
        drift: f64,
        correction: DriftCorrection,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The ambient layer was dropped; playback continues leader-only.
    AmbientLost {
        #[serde(rename = "streamId")]
        stream_id: String,
        reason: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The leader reported a fatal error.
    Terminated {
        #[serde(rename = "streamId")]
        stream_id: String,
        fault: ProviderFault,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to the control surface.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SurfaceEvent {
    /// A keyboard shortcut was accepted.
    ShortcutInvoked {
        shortcut: Shortcut,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The host reported a fullscreen change.
    FullscreenChanged {
        #[serde(rename = "isFullscreen")]
        is_fullscreen: bool,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Controls were shown or auto-hidden.
    ControlsVisibilityChanged {
        visible: bool,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}
