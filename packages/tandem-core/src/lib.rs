//! Tandem Core - dual-stream synchronized playback controller.
//!
//! Plays one remote stream twice: a *leader* that the user sees and hears, and
//! a muted, blurred *follower* behind it as an ambient layer. The leader is
//! authoritative; the follower is kept within a small tolerance of it. Startup
//! is hidden behind an opaque mask until the leader has been playing long
//! enough to be stable (hidden sync), then the mask fades and audio is restored.
//!
//! # Architecture
//!
//! - [`provider`]: the remote media provider contract plus a simulated backend
//! - [`playback`]: stream handles, state machine, reveal sequencer, drift
//!   corrector, and the session and its driver task
//! - [`surface`]: user controls, keyboard shortcuts, fullscreen, volume curve
//! - [`ui`]: presentation-only state (controls visibility, fullscreen, mobile)
//! - [`host`]: capabilities of the document hosting the player
//! - [`events`]: domain events for observers
//! - [`config`]: tuning, loadable with serde
//! - [`error`]: centralized error types
//!
//! # Abstraction Traits
//!
//! - [`ProviderFactory`](provider::ProviderFactory) /
//!   [`ProviderPlayer`](provider::ProviderPlayer): constructing and driving players
//! - [`HostDocument`](host::HostDocument): focus, fullscreen and device hints
//! - [`EventEmitter`](events::EventEmitter): emitting domain events
//! - [`TaskSpawner`](runtime::TaskSpawner): where the session task runs
//!
//! Each trait has a default implementation suitable for the headless simulator.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod playback;
pub mod provider;
pub mod runtime;
pub mod surface;
pub mod ui;
pub mod utils;

pub use config::{ControlsConfig, DriftConfig, RevealConfig, SyncConfig};
pub use error::{ErrorCode, TandemError, TandemResult};
pub use events::{
    BroadcastEventBridge, EventEmitter, LoggingEventEmitter, NoopEventEmitter, PlaybackEvent,
    SurfaceEvent, TandemEvent,
};
pub use host::{HeadlessHost, HostDocument};
pub use playback::{
    MaskState, PlaybackSnapshot, PlaybackState, SessionCommand, SessionDriver,
};
pub use provider::{
    PlayerOptions, ProviderError, ProviderEvent, ProviderEventKind, ProviderFactory,
    ProviderFault, ProviderPlayer, ProviderState, StreamRole,
};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use surface::{ControlSurface, Shortcut, SurfaceView};
pub use ui::{DeviceHints, UiState};
pub use utils::now_millis;
