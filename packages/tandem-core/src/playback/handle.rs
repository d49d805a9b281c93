//! Stream handle: one provider player behind capability-checked calls.
//!
//! The player may be absent (construction failed, or torn down), and any
//! individual method may be a provider no-op. Either way every transport call
//! here is safe to make and every query has an answer.

use crate::provider::{ProviderPlayer, StreamRole};

/// Wraps one provider player instance and the last known transport facts.
pub struct StreamHandle {
    role: StreamRole,
    player: Option<Box<dyn ProviderPlayer>>,
    ready: bool,
    /// Last known position (seconds).
    position: f64,
    /// Last known duration (seconds).
    duration: f64,
    muted: bool,
    /// Last provider-scale volume sent (0-100).
    volume: u8,
}

impl StreamHandle {
    /// Wraps a constructed player.
    pub fn new(role: StreamRole, player: Box<dyn ProviderPlayer>) -> Self {
        Self {
            player: Some(player),
            ..Self::empty(role)
        }
    }

    /// A handle with no player behind it. Every call is a no-op.
    pub fn empty(role: StreamRole) -> Self {
        Self {
            role,
            player: None,
            ready: false,
            position: 0.0,
            duration: 0.0,
            muted: true,
            volume: 0,
        }
    }

    pub fn role(&self) -> StreamRole {
        self.role
    }

    /// Whether a player instance is present.
    pub fn is_live(&self) -> bool {
        self.player.is_some()
    }

    /// Whether the provider reported `ready` for this instance.
    pub fn is_ready(&self) -> bool {
        self.ready && self.player.is_some()
    }

    pub fn mark_ready(&mut self) {
        if self.player.is_some() {
            self.ready = true;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    pub fn play(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.play();
        }
    }

    pub fn pause(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.pause();
        }
    }

    /// Seeks to `seconds` (clamped to `>= 0`).
    pub fn seek_to(&mut self, seconds: f64) {
        let seconds = if seconds.is_nan() { 0.0 } else { seconds.max(0.0) };
        if let Some(player) = self.player.as_mut() {
            player.seek_to(seconds);
            self.position = seconds;
        }
    }

    /// Sets the provider-scale volume (clamped to `<= 100`).
    pub fn set_volume(&mut self, volume: u8) {
        let volume = volume.min(100);
        if let Some(player) = self.player.as_mut() {
            player.set_volume(volume);
            self.volume = volume;
        }
    }

    pub fn mute(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.mute();
            self.muted = true;
        }
    }

    pub fn unmute(&mut self) {
        if let Some(player) = self.player.as_mut() {
            player.unmute();
            self.muted = false;
        }
    }

    /// Mutes and zeroes the volume.
    pub fn silence(&mut self) {
        self.mute();
        self.set_volume(0);
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        if !(rate.is_finite() && rate > 0.0) {
            return;
        }
        if let Some(player) = self.player.as_mut() {
            player.set_playback_rate(rate);
        }
    }

    pub fn load_stream(&mut self, stream_id: &str, start_seconds: f64) {
        let start_seconds = start_seconds.max(0.0);
        if let Some(player) = self.player.as_mut() {
            player.load_stream(stream_id, start_seconds);
            self.position = start_seconds;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Current position in seconds; falls back to the last known value, then 0.
    pub fn current_time(&mut self) -> f64 {
        if let Some(time) = self
            .player
            .as_ref()
            .and_then(|p| p.current_time())
            .filter(|t| t.is_finite())
        {
            self.position = time;
        }
        self.position
    }

    /// Duration in seconds; falls back to the last known value, then 0.
    pub fn duration(&mut self) -> f64 {
        if let Some(duration) = self
            .player
            .as_ref()
            .and_then(|p| p.duration())
            .filter(|d| d.is_finite() && *d > 0.0)
        {
            self.duration = duration;
        }
        self.duration
    }

    /// Volume as the provider reports it right now, if it reports one.
    pub fn volume_readback(&self) -> Option<u8> {
        self.player.as_ref().and_then(|p| p.volume())
    }

    pub fn playback_rate(&self) -> Option<f64> {
        self.player
            .as_ref()
            .and_then(|p| p.playback_rate())
            .filter(|r| r.is_finite() && *r > 0.0)
    }

    /// Buffered fraction (0-1); 0 when unknown.
    pub fn loaded_fraction(&self) -> f64 {
        self.player
            .as_ref()
            .and_then(|p| p.loaded_fraction())
            .filter(|f| f.is_finite())
            .map_or(0.0, |f| f.clamp(0.0, 1.0))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Releases the player. Idempotent; provider failures are logged and
    /// swallowed so teardown always completes.
    ///
    /// Returns `true` if a player was actually released.
    pub fn destroy(&mut self) -> bool {
        self.ready = false;
        let Some(mut player) = self.player.take() else {
            return false;
        };
        if let Err(e) = player.destroy() {
            log::warn!("[Handle] Failed to destroy {:?} player: {}", self.role, e);
        }
        true
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("role", &self.role)
            .field("live", &self.is_live())
            .field("ready", &self.ready)
            .field("position", &self.position)
            .field("duration", &self.duration)
            .field("muted", &self.muted)
            .field("volume", &self.volume)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::simulated::{SimCall, SimulatedProvider};
    use crate::provider::{PlayerOptions, ProviderEventSink, ProviderFactory};
    use tokio::sync::mpsc;

    fn live_handle(provider: &SimulatedProvider) -> StreamHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sink = ProviderEventSink::new(tx, 1, StreamRole::Leader);
        let player = provider
            .create("mount", "abc", &PlayerOptions::cued(0.0), sink)
            .expect("create should succeed");
        StreamHandle::new(StreamRole::Leader, player)
    }

    #[test]
    fn empty_handle_is_a_safe_no_op() {
        let mut handle = StreamHandle::empty(StreamRole::Follower);

        handle.play();
        handle.seek_to(10.0);
        handle.set_volume(50);
        handle.unmute();
        handle.mark_ready();

        assert!(!handle.is_live());
        assert!(!handle.is_ready());
        assert_eq!(handle.current_time(), 0.0);
        assert_eq!(handle.duration(), 0.0);
        assert_eq!(handle.loaded_fraction(), 0.0);
        assert_eq!(handle.volume_readback(), None);
        assert!(!handle.destroy());
    }

    #[test]
    fn clamps_inputs_before_calling_provider() {
        let provider = SimulatedProvider::new();
        let mut handle = live_handle(&provider);

        handle.seek_to(-4.0);
        handle.set_volume(250);
        handle.set_playback_rate(0.0);

        let calls = provider.calls(StreamRole::Leader);
        assert_eq!(&calls[1..], &[SimCall::SeekTo(0.0), SimCall::SetVolume(100)]);
    }

    #[test]
    fn queries_cache_last_known_values() {
        let provider = SimulatedProvider::new();
        let mut handle = live_handle(&provider);
        provider.set_position(StreamRole::Leader, 42.0);
        provider.set_duration(StreamRole::Leader, 120.0);

        assert_eq!(handle.current_time(), 42.0);
        assert_eq!(handle.duration(), 120.0);

        handle.destroy();
        assert_eq!(handle.current_time(), 42.0);
        assert_eq!(handle.duration(), 120.0);
    }

    #[test]
    fn destroy_is_idempotent_and_swallows_failures() {
        let provider = SimulatedProvider::new();
        provider.fail_destroy(true);
        let mut handle = live_handle(&provider);
        handle.mark_ready();

        assert!(handle.destroy());
        assert!(!handle.destroy());
        assert!(!handle.is_ready());

        let destroyed = provider
            .calls(StreamRole::Leader)
            .into_iter()
            .filter(|c| *c == SimCall::Destroyed)
            .count();
        assert_eq!(destroyed, 1);
    }
}
