//! In-process simulated provider.
//!
//! Serves two purposes:
//! - the backend of the `tandem-sim` binary, where players become ready, start
//!   and end on their own after configurable latencies, and
//! - the test double for the session, where nothing happens unless the test
//!   emits it, and every provider call is journaled in global order (including
//!   construction and destruction) so tests can assert on call sequences.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::{
    PlayerOptions, ProviderError, ProviderEventKind, ProviderEventSink, ProviderFactory,
    ProviderPlayer, ProviderState, StreamRole,
};

/// How a simulated player behaves on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedBehavior {
    /// Emit `ready` this long after construction. `None` = never on its own.
    pub ready_after: Option<Duration>,
    /// Emit `Playing` this long after `play`/`load_stream`/`seek_to`.
    /// `None` = never on its own (and no `Paused`/`Ended` either).
    pub playing_after: Option<Duration>,
    /// Stream duration in seconds.
    pub duration_secs: f64,
    /// Advance the position with the (tokio) clock while playing.
    pub advance_clock: bool,
    /// Multiplier on clock advancement, to make a player run fast or slow.
    pub clock_skew: f64,
}

impl SimulatedBehavior {
    /// Nothing happens on its own; positions only change when set.
    pub fn manual() -> Self {
        Self {
            ready_after: None,
            playing_after: None,
            duration_secs: 300.0,
            advance_clock: false,
            clock_skew: 1.0,
        }
    }

    /// Becomes ready after `startup` and starts `buffering` after each play.
    pub fn realistic(startup: Duration, buffering: Duration, duration_secs: f64) -> Self {
        Self {
            ready_after: Some(startup),
            playing_after: Some(buffering),
            duration_secs,
            advance_clock: true,
            clock_skew: 1.0,
        }
    }

    pub fn with_clock_skew(mut self, skew: f64) -> Self {
        self.clock_skew = skew;
        self
    }
}

impl Default for SimulatedBehavior {
    fn default() -> Self {
        Self::manual()
    }
}

/// A provider call as seen by the simulated backend.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCall {
    Created {
        stream_id: String,
        options: PlayerOptions,
    },
    Play,
    Pause,
    SeekTo(f64),
    SetVolume(u8),
    Mute,
    Unmute,
    SetPlaybackRate(f64),
    LoadStream {
        stream_id: String,
        start_seconds: f64,
    },
    Destroyed,
}

/// One journaled call.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Construction order of the player, starting at 0.
    pub player: usize,
    pub role: StreamRole,
    pub generation: u64,
    pub call: SimCall,
}

struct PlayerState {
    id: usize,
    role: StreamRole,
    generation: u64,
    stream_id: String,
    behavior: SimulatedBehavior,
    position: f64,
    /// Clock time from which the position advances (`None` = paused).
    playing_since: Option<Instant>,
    rate: f64,
    volume: u8,
    muted: bool,
    duration: f64,
    volume_readback: Option<u8>,
    destroyed: bool,
    /// Bumped by every transport change; scheduled events carry the epoch
    /// they were scheduled in and are dropped if it moved on.
    epoch: u64,
    /// How often the position was queried.
    position_reads: usize,
    sink: ProviderEventSink,
}

impl PlayerState {
    fn position_at(&self, now: Instant) -> f64 {
        let mut position = self.position;
        if let Some(since) = self.playing_since {
            if self.behavior.advance_clock && now > since {
                let elapsed = now.duration_since(since).as_secs_f64();
                position += elapsed * self.rate * self.behavior.clock_skew;
            }
        }
        if self.duration > 0.0 {
            position = position.min(self.duration);
        }
        position.max(0.0)
    }

    /// Folds clock advancement into `position` before a transport change.
    fn fold(&mut self, now: Instant) {
        self.position = self.position_at(now);
        if let Some(since) = self.playing_since {
            self.playing_since = Some(since.max(now));
        }
        self.epoch += 1;
    }

    fn start(&mut self, now: Instant) {
        let delay = self.behavior.playing_after.unwrap_or_default();
        self.playing_since = Some(now + delay);
    }
}

#[derive(Default)]
struct Registry {
    leader_behavior: SimulatedBehavior,
    follower_behavior: SimulatedBehavior,
    players: Vec<Arc<Mutex<PlayerState>>>,
    journal: Vec<JournalEntry>,
    fail_create: HashSet<StreamRole>,
    fail_destroy: bool,
}

impl Registry {
    fn latest(&self, role: StreamRole) -> Option<Arc<Mutex<PlayerState>>> {
        self.players
            .iter()
            .rev()
            .find(|p| p.lock().role == role)
            .cloned()
    }
}

/// Simulated provider; cheap to clone, all clones share one registry.
#[derive(Clone, Default)]
pub struct SimulatedProvider {
    registry: Arc<Mutex<Registry>>,
}

impl SimulatedProvider {
    /// Creates a provider whose players do nothing on their own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider with separate behaviors for leader and follower.
    pub fn with_behavior(leader: SimulatedBehavior, follower: SimulatedBehavior) -> Self {
        let provider = Self::default();
        {
            let mut registry = provider.registry.lock();
            registry.leader_behavior = leader;
            registry.follower_behavior = follower;
        }
        provider
    }

    /// All journaled calls, in the order they happened.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.registry.lock().journal.clone()
    }

    pub fn clear_journal(&self) {
        self.registry.lock().journal.clear();
    }

    /// Calls made on the most recently constructed player for `role`.
    pub fn calls(&self, role: StreamRole) -> Vec<SimCall> {
        let registry = self.registry.lock();
        let Some(id) = registry.latest(role).map(|p| p.lock().id) else {
            return Vec::new();
        };
        registry
            .journal
            .iter()
            .filter(|e| e.player == id)
            .map(|e| e.call.clone())
            .collect()
    }

    /// Number of players ever constructed for `role`.
    pub fn created(&self, role: StreamRole) -> usize {
        self.registry
            .lock()
            .players
            .iter()
            .filter(|p| p.lock().role == role)
            .count()
    }

    /// Emits an event from the most recent live player for `role`.
    ///
    /// Returns `false` if there is no such player or nobody is listening.
    pub fn emit(&self, role: StreamRole, kind: ProviderEventKind) -> bool {
        let Some(player) = self.registry.lock().latest(role) else {
            return false;
        };
        let state = player.lock();
        !state.destroyed && state.sink.emit(kind)
    }

    pub fn set_position(&self, role: StreamRole, seconds: f64) {
        self.with_latest(role, |state| {
            state.position = seconds;
            if state.playing_since.is_some() {
                state.playing_since = Some(Instant::now());
            }
        });
    }

    pub fn set_duration(&self, role: StreamRole, seconds: f64) {
        self.with_latest(role, |state| state.duration = seconds);
    }

    /// Overrides what `volume()` reports, to simulate a provider that drops
    /// the volume it was given.
    pub fn force_volume_readback(&self, role: StreamRole, volume: Option<u8>) {
        self.with_latest(role, |state| state.volume_readback = volume);
    }

    /// Makes the next construction for `role` fail.
    pub fn fail_next_create(&self, role: StreamRole) {
        self.registry.lock().fail_create.insert(role);
    }

    /// Makes every `destroy` report a failure (the player is still released).
    pub fn fail_destroy(&self, fail: bool) {
        self.registry.lock().fail_destroy = fail;
    }

    pub fn position(&self, role: StreamRole) -> Option<f64> {
        self.read_latest(role, |state| state.position_at(Instant::now()))
    }

    pub fn volume(&self, role: StreamRole) -> Option<u8> {
        self.read_latest(role, |state| state.volume)
    }

    pub fn is_muted(&self, role: StreamRole) -> Option<bool> {
        self.read_latest(role, |state| state.muted)
    }

    /// Number of position queries made on the latest player for `role`.
    pub fn position_reads(&self, role: StreamRole) -> usize {
        self.read_latest(role, |state| state.position_reads)
            .unwrap_or_default()
    }

    pub fn is_playing(&self, role: StreamRole) -> Option<bool> {
        self.read_latest(role, |state| state.playing_since.is_some())
    }

    fn with_latest(&self, role: StreamRole, f: impl FnOnce(&mut PlayerState)) {
        let player = self.registry.lock().latest(role);
        if let Some(player) = player {
            f(&mut player.lock());
        }
    }

    fn read_latest<T>(&self, role: StreamRole, f: impl FnOnce(&PlayerState) -> T) -> Option<T> {
        let player = self.registry.lock().latest(role)?;
        let state = player.lock();
        Some(f(&state))
    }
}

impl ProviderFactory for SimulatedProvider {
    fn create(
        &self,
        mount: &str,
        stream_id: &str,
        options: &PlayerOptions,
        events: ProviderEventSink,
    ) -> Result<Box<dyn ProviderPlayer>, ProviderError> {
        let role = events.role();
        let generation = events.generation();

        let mut registry = self.registry.lock();
        if registry.fail_create.remove(&role) {
            return Err(ProviderError::Construction(format!(
                "simulated failure mounting {}",
                mount
            )));
        }

        let behavior = match role {
            StreamRole::Leader => registry.leader_behavior.clone(),
            StreamRole::Follower => registry.follower_behavior.clone(),
        };
        let id = registry.players.len();
        let now = Instant::now();

        let state = Arc::new(Mutex::new(PlayerState {
            id,
            role,
            generation,
            stream_id: stream_id.to_string(),
            behavior: behavior.clone(),
            position: options.start_seconds,
            playing_since: options.autoplay.then_some(now),
            rate: 1.0,
            volume: if options.muted { 0 } else { 100 },
            muted: options.muted,
            duration: behavior.duration_secs,
            volume_readback: None,
            destroyed: false,
            epoch: 0,
            position_reads: 0,
            sink: events,
        }));

        registry.players.push(Arc::clone(&state));
        registry.journal.push(JournalEntry {
            player: id,
            role,
            generation,
            call: SimCall::Created {
                stream_id: stream_id.to_string(),
                options: options.clone(),
            },
        });
        drop(registry);

        log::debug!(
            "[SimProvider] Created {:?} player #{} for stream {} at {}",
            role,
            id,
            stream_id,
            mount
        );

        if let Some(delay) = behavior.ready_after {
            schedule(&state, delay, ProviderEventKind::Ready);
        }

        Ok(Box::new(SimulatedPlayer {
            state,
            registry: Arc::clone(&self.registry),
        }))
    }
}

/// Emits `kind` after `delay` unless the player was destroyed or its transport
/// changed in the meantime. Needs a Tokio runtime; without one nothing is
/// scheduled.
fn schedule(state: &Arc<Mutex<PlayerState>>, delay: Duration, kind: ProviderEventKind) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        log::trace!("[SimProvider] No runtime, dropping scheduled {:?}", kind);
        return;
    };
    let state = Arc::clone(state);
    let epoch = state.lock().epoch;
    let check_epoch = !matches!(kind, ProviderEventKind::Ready);

    handle.spawn(async move {
        tokio::time::sleep(delay).await;
        let state = state.lock();
        if state.destroyed || (check_epoch && state.epoch != epoch) {
            return;
        }
        state.sink.emit(kind);
    });
}

/// A simulated player instance.
pub struct SimulatedPlayer {
    state: Arc<Mutex<PlayerState>>,
    registry: Arc<Mutex<Registry>>,
}

impl SimulatedPlayer {
    /// Applies `f` and journals `call`, unless the player was destroyed.
    fn transport(&mut self, call: SimCall, f: impl FnOnce(&mut PlayerState, Instant)) {
        let (id, role, generation) = {
            let mut state = self.state.lock();
            if state.destroyed {
                return;
            }
            f(&mut state, Instant::now());
            (state.id, state.role, state.generation)
        };
        self.registry.lock().journal.push(JournalEntry {
            player: id,
            role,
            generation,
            call,
        });
    }

    /// Schedules the `Playing` event (and the eventual `Ended`) that follow a
    /// transport start in auto mode.
    fn schedule_start(&self) {
        let (playing_after, remaining) = {
            let state = self.state.lock();
            let Some(after) = state.behavior.playing_after else {
                return;
            };
            let speed = state.rate * state.behavior.clock_skew;
            let remaining = if state.behavior.advance_clock && state.duration > 0.0 && speed > 0.0
            {
                Some(Duration::from_secs_f64(
                    ((state.duration - state.position) / speed).max(0.0),
                ))
            } else {
                None
            };
            (after, remaining)
        };

        schedule(
            &self.state,
            playing_after,
            ProviderEventKind::StateChange(ProviderState::Playing),
        );
        if let Some(remaining) = remaining {
            schedule(
                &self.state,
                playing_after + remaining,
                ProviderEventKind::StateChange(ProviderState::Ended),
            );
        }
    }
}

impl ProviderPlayer for SimulatedPlayer {
    fn play(&mut self) {
        self.transport(SimCall::Play, |state, now| {
            state.fold(now);
            if state.playing_since.is_none() {
                state.start(now);
            }
        });
        self.schedule_start();
    }

    fn pause(&mut self) {
        let mut was_playing = false;
        self.transport(SimCall::Pause, |state, now| {
            state.fold(now);
            was_playing = state.playing_since.take().is_some();
        });
        let state = self.state.lock();
        if was_playing && state.behavior.playing_after.is_some() {
            state
                .sink
                .emit(ProviderEventKind::StateChange(ProviderState::Paused));
        }
    }

    fn seek_to(&mut self, seconds: f64) {
        let mut playing = false;
        self.transport(SimCall::SeekTo(seconds), |state, now| {
            state.fold(now);
            state.position = seconds.max(0.0);
            if state.playing_since.is_some() {
                state.start(now);
                playing = true;
            }
        });
        if playing {
            self.schedule_start();
        }
    }

    fn set_volume(&mut self, volume: u8) {
        self.transport(SimCall::SetVolume(volume), |state, _| {
            state.volume = volume.min(100);
        });
    }

    fn mute(&mut self) {
        self.transport(SimCall::Mute, |state, _| state.muted = true);
    }

    fn unmute(&mut self) {
        self.transport(SimCall::Unmute, |state, _| state.muted = false);
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.transport(SimCall::SetPlaybackRate(rate), |state, now| {
            state.fold(now);
            state.rate = rate;
        });
    }

    fn load_stream(&mut self, stream_id: &str, start_seconds: f64) {
        let call = SimCall::LoadStream {
            stream_id: stream_id.to_string(),
            start_seconds,
        };
        self.transport(call, |state, now| {
            state.fold(now);
            state.stream_id = stream_id.to_string();
            state.position = start_seconds.max(0.0);
            state.start(now);
        });
        self.schedule_start();
    }

    fn current_time(&self) -> Option<f64> {
        let mut state = self.state.lock();
        state.position_reads += 1;
        (!state.destroyed).then(|| state.position_at(Instant::now()))
    }

    fn duration(&self) -> Option<f64> {
        let state = self.state.lock();
        (!state.destroyed).then_some(state.duration)
    }

    fn volume(&self) -> Option<u8> {
        let state = self.state.lock();
        (!state.destroyed).then(|| state.volume_readback.unwrap_or(state.volume))
    }

    fn is_muted(&self) -> Option<bool> {
        let state = self.state.lock();
        (!state.destroyed).then_some(state.muted)
    }

    fn playback_rate(&self) -> Option<f64> {
        let state = self.state.lock();
        (!state.destroyed).then_some(state.rate)
    }

    fn loaded_fraction(&self) -> Option<f64> {
        let state = self.state.lock();
        if state.destroyed || state.duration <= 0.0 {
            return None;
        }
        let buffered_to = state.position_at(Instant::now()) + 30.0;
        Some((buffered_to / state.duration).min(1.0))
    }

    fn destroy(&mut self) -> Result<(), ProviderError> {
        let (id, role, generation, stream_id) = {
            let mut state = self.state.lock();
            if state.destroyed {
                return Ok(());
            }
            state.destroyed = true;
            state.playing_since = None;
            (state.id, state.role, state.generation, state.stream_id.clone())
        };

        let mut registry = self.registry.lock();
        registry.journal.push(JournalEntry {
            player: id,
            role,
            generation,
            call: SimCall::Destroyed,
        });

        if registry.fail_destroy {
            return Err(ProviderError::Teardown(format!(
                "simulated failure destroying {:?} player for {}",
                role, stream_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderEvent;
    use tokio::sync::mpsc;

    fn sink(role: StreamRole) -> (ProviderEventSink, mpsc::UnboundedReceiver<ProviderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ProviderEventSink::new(tx, 1, role), rx)
    }

    #[test]
    fn journals_calls_in_order() {
        let provider = SimulatedProvider::new();
        let (events, _rx) = sink(StreamRole::Leader);
        let mut player = provider
            .create("mount", "abc", &PlayerOptions::cued(0.0), events)
            .expect("create should succeed");

        player.mute();
        player.seek_to(4.0);
        player.play();

        let calls = provider.calls(StreamRole::Leader);
        assert!(matches!(calls[0], SimCall::Created { .. }));
        assert_eq!(
            &calls[1..],
            &[SimCall::Mute, SimCall::SeekTo(4.0), SimCall::Play]
        );
    }

    #[test]
    fn destroyed_player_ignores_calls() {
        let provider = SimulatedProvider::new();
        let (events, _rx) = sink(StreamRole::Follower);
        let mut player = provider
            .create("mount", "abc", &PlayerOptions::cued(0.0), events)
            .expect("create should succeed");

        player.destroy().expect("destroy should succeed");
        player.play();
        player.destroy().expect("second destroy is a no-op");

        assert_eq!(player.current_time(), None);
        let calls = provider.calls(StreamRole::Follower);
        assert_eq!(calls.last(), Some(&SimCall::Destroyed));
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn fail_next_create_applies_once() {
        let provider = SimulatedProvider::new();
        provider.fail_next_create(StreamRole::Leader);

        let (events, _rx) = sink(StreamRole::Leader);
        assert!(provider
            .create("mount", "abc", &PlayerOptions::cued(0.0), events.clone())
            .is_err());
        assert!(provider
            .create("mount", "abc", &PlayerOptions::cued(0.0), events)
            .is_ok());
    }

    #[test]
    fn emit_goes_through_latest_player_sink() {
        let provider = SimulatedProvider::new();
        let (events, mut rx) = sink(StreamRole::Leader);
        let _player = provider
            .create("mount", "abc", &PlayerOptions::cued(0.0), events)
            .expect("create should succeed");

        assert!(provider.emit(StreamRole::Leader, ProviderEventKind::Ready));
        assert!(!provider.emit(StreamRole::Follower, ProviderEventKind::Ready));
        assert_eq!(rx.try_recv().map(|e| e.kind), Ok(ProviderEventKind::Ready));
    }

    #[tokio::test(start_paused = true)]
    async fn realistic_player_becomes_ready_and_plays() {
        let behavior =
            SimulatedBehavior::realistic(Duration::from_millis(500), Duration::from_millis(200), 60.0);
        let provider = SimulatedProvider::with_behavior(behavior.clone(), behavior);
        let (events, mut rx) = sink(StreamRole::Leader);
        let mut player = provider
            .create("mount", "abc", &PlayerOptions::cued(0.0), events)
            .expect("create should succeed");

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(rx.try_recv().map(|e| e.kind), Ok(ProviderEventKind::Ready));

        player.play();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(
            rx.try_recv().map(|e| e.kind),
            Ok(ProviderEventKind::StateChange(ProviderState::Playing))
        );

        tokio::time::sleep(Duration::from_secs(10)).await;
        let position = player.current_time().expect("player is live");
        assert!((position - 10.0).abs() < 0.1, "position was {}", position);
    }

    #[tokio::test(start_paused = true)]
    async fn each_role_runs_on_its_own_behavior() {
        let leader =
            SimulatedBehavior::realistic(Duration::from_millis(10), Duration::ZERO, 600.0);
        let follower = leader.clone().with_clock_skew(1.5);
        let provider = SimulatedProvider::with_behavior(leader, follower);

        let (leader_events, _leader_rx) = sink(StreamRole::Leader);
        let (follower_events, _follower_rx) = sink(StreamRole::Follower);
        let mut leader = provider
            .create("mount", "abc", &PlayerOptions::cued(0.0), leader_events)
            .expect("create should succeed");
        let mut follower = provider
            .create("ambient", "abc", &PlayerOptions::cued(0.0), follower_events)
            .expect("create should succeed");

        leader.play();
        follower.play();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let leader_at = leader.current_time().expect("leader is live");
        let follower_at = follower.current_time().expect("follower is live");
        assert!((leader_at - 10.0).abs() < 0.1, "leader at {}", leader_at);
        assert!((follower_at - 15.0).abs() < 0.1, "follower at {}", follower_at);
    }

    #[tokio::test(start_paused = true)]
    async fn realistic_player_reaches_end() {
        let behavior =
            SimulatedBehavior::realistic(Duration::from_millis(10), Duration::from_millis(10), 5.0);
        let provider = SimulatedProvider::with_behavior(behavior.clone(), behavior);
        let (events, mut rx) = sink(StreamRole::Leader);
        let mut player = provider
            .create("mount", "abc", &PlayerOptions::cued(0.0), events)
            .expect("create should succeed");

        player.play();
        tokio::time::sleep(Duration::from_secs(6)).await;

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok().map(|e| e.kind)).collect();
        assert_eq!(
            kinds.last(),
            Some(&ProviderEventKind::StateChange(ProviderState::Ended))
        );
        assert_eq!(player.current_time(), Some(5.0));
    }
}
