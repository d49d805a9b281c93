//! Playback state machine.
//!
//! A single authoritative state plus the auxiliary flags that decide which
//! transitions are legal. Only the session mutates it; everything else reads.

use serde::Serialize;

use crate::error::{TandemError, TandemResult};

/// Authoritative playback state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
    /// No handles; waiting for playback to be requested.
    Idle,
    /// Handles constructing.
    Loading,
    /// Leader ready, playback not yet desired.
    ReadyPaused,
    /// Playing muted under an opaque mask while the reveal sequence runs
    /// ("uplink").
    HiddenSync,
    Playing,
    Paused,
    Buffering,
    Ended,
    /// Fatal provider error. Sticky until the session is recreated.
    Terminated,
}

impl PlaybackState {
    /// States with live handles that can still reach `Ended`/`Terminated`.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Loading
                | Self::ReadyPaused
                | Self::HiddenSync
                | Self::Playing
                | Self::Paused
                | Self::Buffering
                | Self::Ended
        )
    }

    /// Whether playback is moving, visibly or not.
    pub fn is_rolling(self) -> bool {
        matches!(self, Self::HiddenSync | Self::Playing | Self::Buffering)
    }

    /// Legality table for `from -> to`.
    pub fn can_transition(from: Self, to: Self) -> bool {
        use PlaybackState::*;

        if to == Terminated {
            return from.is_active();
        }
        if to == Ended {
            return from.is_active() && from != Loading;
        }

        match (from, to) {
            (Idle, Loading) => true,

            (Loading, ReadyPaused) | (Loading, HiddenSync) => true,

            (ReadyPaused, HiddenSync) => true,

            // Re-entry is how restart works while already syncing.
            (HiddenSync, HiddenSync) | (HiddenSync, Playing) | (HiddenSync, Paused) => true,

            (Playing, Paused) | (Playing, Buffering) | (Playing, HiddenSync) => true,

            (Paused, Playing) | (Paused, Buffering) | (Paused, HiddenSync) => true,

            (Buffering, Playing) | (Buffering, Paused) | (Buffering, HiddenSync) => true,

            (Ended, HiddenSync) | (Ended, Playing) | (Ended, Paused) | (Ended, Buffering) => true,

            _ => false,
        }
    }
}

/// State plus the auxiliary flags that gate transitions.
#[derive(Debug, Clone)]
pub struct PlaybackMachine {
    state: PlaybackState,
    /// Playback has been requested for this session.
    has_started: bool,
    /// The leader reported ready, so the transport can answer.
    is_player_ready: bool,
    /// The latest hidden sync completed; cleared when another one starts.
    revealed: bool,
}

impl PlaybackMachine {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
            has_started: false,
            is_player_ready: false,
            revealed: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn has_started(&self) -> bool {
        self.has_started
    }

    pub fn is_player_ready(&self) -> bool {
        self.is_player_ready
    }

    pub fn has_revealed(&self) -> bool {
        self.revealed
    }

    pub fn is_terminated(&self) -> bool {
        self.state == PlaybackState::Terminated
    }

    pub fn mark_started(&mut self) {
        self.has_started = true;
    }

    pub fn set_player_ready(&mut self, ready: bool) {
        self.is_player_ready = ready;
    }

    pub fn mark_revealed(&mut self) {
        self.revealed = true;
    }

    /// A new hidden sync hides the stream again until its own reveal.
    pub fn clear_revealed(&mut self) {
        self.revealed = false;
    }

    /// Moves to `to`, returning the previous state.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::InvalidTransition`] if the table forbids it.
    pub fn transition(&mut self, to: PlaybackState) -> TandemResult<PlaybackState> {
        let from = self.state;
        if !PlaybackState::can_transition(from, to) {
            return Err(TandemError::InvalidTransition { from, to });
        }
        self.state = to;
        log::debug!("[Machine] {:?} -> {:?}", from, to);
        Ok(from)
    }

    /// Back to `Idle` with every flag cleared except `has_started`, which
    /// reflects the user's intent and survives a stream change.
    pub fn reset(&mut self) {
        self.state = PlaybackState::Idle;
        self.is_player_ready = false;
        self.revealed = false;
    }

    /// Clears the user's playback intent as well.
    pub fn reset_intent(&mut self) {
        self.reset();
        self.has_started = false;
    }
}

impl Default for PlaybackMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlaybackState::*;

    #[test]
    fn happy_path_is_legal() {
        let mut machine = PlaybackMachine::new();
        for to in [Loading, HiddenSync, Playing, Paused, Playing, Buffering, Playing, Ended] {
            machine
                .transition(to)
                .unwrap_or_else(|e| panic!("transition to {:?} failed: {}", to, e));
        }
        assert_eq!(machine.state(), Ended);
    }

    #[test]
    fn restart_reenters_hidden_sync_from_anywhere_active() {
        for from in [ReadyPaused, HiddenSync, Playing, Paused, Buffering, Ended] {
            assert!(PlaybackState::can_transition(from, HiddenSync), "{:?}", from);
        }
        assert!(!PlaybackState::can_transition(Idle, HiddenSync));
        assert!(!PlaybackState::can_transition(Terminated, HiddenSync));
    }

    #[test]
    fn terminated_is_sticky() {
        let mut machine = PlaybackMachine::new();
        machine.transition(Loading).unwrap();
        machine.transition(Terminated).unwrap();

        for to in [Loading, ReadyPaused, HiddenSync, Playing, Paused, Ended, Terminated] {
            let err = machine.transition(to).unwrap_err();
            assert!(matches!(err, TandemError::InvalidTransition { .. }));
        }
        assert!(machine.is_terminated());

        machine.reset();
        assert_eq!(machine.state(), Idle);
    }

    #[test]
    fn idle_cannot_play_directly() {
        let mut machine = PlaybackMachine::new();
        assert!(machine.transition(Playing).is_err());
        assert!(machine.transition(Terminated).is_err());
        assert_eq!(machine.state(), Idle);
    }

    #[test]
    fn reset_keeps_intent_unless_asked() {
        let mut machine = PlaybackMachine::new();
        machine.mark_started();
        machine.set_player_ready(true);
        machine.mark_revealed();

        machine.reset();
        assert!(machine.has_started());
        assert!(!machine.is_player_ready());
        assert!(!machine.has_revealed());

        machine.reset_intent();
        assert!(!machine.has_started());
    }
}
