//! Trait abstractions for provider players.
//!
//! Provider methods may not exist yet during early lifecycle or any more after
//! teardown. Rather than checking for each method at every call site, every
//! transport method here has a no-op default and every query defaults to
//! `None`; an adapter only overrides what the real provider actually exposes.

use super::{PlayerOptions, ProviderError, ProviderEventSink};

/// One remote player instance.
///
/// Calls are synchronous and imperative; results arrive later as events on the
/// sink the player was constructed with.
pub trait ProviderPlayer: Send {
    fn play(&mut self) {}

    fn pause(&mut self) {}

    /// Seeks to an absolute position in seconds.
    fn seek_to(&mut self, _seconds: f64) {}

    /// Sets the provider-scale volume (0-100).
    fn set_volume(&mut self, _volume: u8) {}

    fn mute(&mut self) {}

    fn unmute(&mut self) {}

    fn set_playback_rate(&mut self, _rate: f64) {}

    /// Replaces the loaded stream and starts it from `start_seconds`.
    fn load_stream(&mut self, _stream_id: &str, _start_seconds: f64) {}

    /// Current position in seconds.
    fn current_time(&self) -> Option<f64> {
        None
    }

    /// Duration in seconds; `0` or `None` while unknown.
    fn duration(&self) -> Option<f64> {
        None
    }

    /// Provider-scale volume as the provider currently reports it.
    fn volume(&self) -> Option<u8> {
        None
    }

    fn is_muted(&self) -> Option<bool> {
        None
    }

    fn playback_rate(&self) -> Option<f64> {
        None
    }

    /// Fraction of the stream buffered so far (0-1).
    fn loaded_fraction(&self) -> Option<f64> {
        None
    }

    /// Releases the player. Failures are reported but never block teardown.
    fn destroy(&mut self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Constructs provider players bound to a mount point.
///
/// Used by `Session` to create the leader and follower for a stream.
pub trait ProviderFactory: Send + Sync {
    /// Creates a player for `stream_id` at `mount`.
    ///
    /// # Arguments
    /// * `mount` - Mount point identifier the player renders into
    /// * `stream_id` - Provider stream identifier
    /// * `options` - Start configuration (autoplay, inline playback, chrome)
    /// * `events` - Sink for `ready`, `stateChange` and `error` notifications
    fn create(
        &self,
        mount: &str,
        stream_id: &str,
        options: &PlayerOptions,
        events: ProviderEventSink,
    ) -> Result<Box<dyn ProviderPlayer>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A provider that exposes nothing at all.
    struct BarePlayer;

    impl ProviderPlayer for BarePlayer {}

    #[test]
    fn bare_player_answers_with_defaults() {
        let mut player = BarePlayer;
        player.play();
        player.seek_to(12.0);
        player.set_volume(80);
        player.load_stream("abc", 0.0);

        assert_eq!(player.current_time(), None);
        assert_eq!(player.duration(), None);
        assert_eq!(player.volume(), None);
        assert!(player.destroy().is_ok());
    }
}
