//! Bridge implementation that fans domain events out over a broadcast channel.
//!
//! The [`BroadcastEventBridge`] lets any number of observers (a terminal
//! printer, a UI adapter, a test) follow the session without the session
//! knowing about them.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{PlaybackEvent, SurfaceEvent, TandemEvent};

/// Bridges domain events to a `tokio::sync::broadcast` channel.
///
/// An optional external emitter (for example [`LoggingEventEmitter`]) also
/// receives every event and can be set after construction.
///
/// [`LoggingEventEmitter`]: super::LoggingEventEmitter
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<TandemEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter that sees every event before it is broadcast.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<TandemEvent> {
        self.tx.subscribe()
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(TandemEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_playback, PlaybackEvent, Playback);
    impl_emit!(emit_surface, SurfaceEvent, Surface);
}
