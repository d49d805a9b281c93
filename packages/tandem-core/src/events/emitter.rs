//! Event emitter trait for decoupling the engine from event delivery.
//!
//! The [`EventEmitter`] trait lets the session and control surface emit events
//! without knowing whether they end up in a log, a broadcast channel, or a
//! host-specific bridge.

use super::{PlaybackEvent, SurfaceEvent};

/// Trait for emitting domain events.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the session emits from its driver
/// task while the control surface emits from the caller's task.
pub trait EventEmitter: Send + Sync {
    /// Emits a playback session event.
    fn emit_playback(&self, event: PlaybackEvent);

    /// Emits a control surface event.
    fn emit_surface(&self, event: SurfaceEvent);
}

/// No-op emitter for embedders that only read snapshots.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_playback(&self, _event: PlaybackEvent) {}

    fn emit_surface(&self, _event: SurfaceEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_playback(&self, event: PlaybackEvent) {
        tracing::debug!(?event, "playback_event");
    }

    fn emit_surface(&self, event: SurfaceEvent) {
        tracing::debug!(?event, "surface_event");
    }
}
