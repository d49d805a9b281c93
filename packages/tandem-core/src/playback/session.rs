//! Playback session.
//!
//! A [`Session`] owns one leader handle, at most one follower handle, the state
//! machine, the reveal sequencer and the drift corrector for one stream
//! identifier. It is a plain synchronous object: every input (a control, a
//! provider event, a timer) is a method call with an explicit `now`, which the
//! [`SessionDriver`](super::SessionDriver) supplies from a single task.
//!
//! Handles are never reused across streams. Mounting a different identifier
//! tears the old pair down completely before the new pair is constructed, and
//! every constructed pair gets a fresh generation so that events from old
//! players cannot touch the new ones.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::SyncConfig;
use crate::error::{TandemError, TandemResult};
use crate::events::{EventEmitter, PlaybackEvent};
use crate::provider::{
    PlayerOptions, ProviderEvent, ProviderEventKind, ProviderEventSink, ProviderFactory,
    ProviderFault, ProviderState, StreamRole,
};
use crate::surface::volume::{nudge_sequence, VolumeIntent};
use crate::utils::{clamp_fraction, now_millis, played_fraction};

use super::drift::{DriftCorrection, DriftCorrector, ProgressSample};
use super::handle::StreamHandle;
use super::machine::{PlaybackMachine, PlaybackState};
use super::reveal::{RevealSequencer, RevealStep};

/// What the mask over the player shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MaskState {
    /// Fully covering the player (before the first reveal, during hidden sync).
    Opaque,
    /// Fading out between the settle step and the reveal.
    Fading,
    /// Player visible.
    Clear,
    /// Hard black overlay after a fatal provider error.
    Blackout,
}

/// Everything presentation needs to know about a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub stream_id: Option<String>,
    pub state: PlaybackState,
    /// Played fraction (0-1).
    pub played: f64,
    /// Duration in seconds; 0 while unknown.
    pub duration: f64,
    /// Buffered fraction (0-1).
    pub buffered: f64,
    /// UI volume (0-100).
    pub volume: u8,
    pub muted: bool,
    pub mask: MaskState,
    pub has_started: bool,
    /// Transport can answer; controls are enabled.
    pub is_ready: bool,
    pub is_buffering: bool,
    pub is_ended: bool,
    pub is_terminated: bool,
    /// Hidden sync in progress.
    pub is_syncing: bool,
    pub is_seeking: bool,
}

/// Readiness of the handle pair, used to restart the drift loop whenever it
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub generation: u64,
    pub leader: bool,
    pub follower: bool,
}

/// One dual-stream playback session.
pub struct Session {
    config: SyncConfig,
    factory: Arc<dyn ProviderFactory>,
    emitter: Arc<dyn EventEmitter>,
    events_tx: mpsc::UnboundedSender<ProviderEvent>,

    stream_id: Option<String>,
    resume_from: Option<f64>,
    mounted: bool,
    generation: u64,

    leader: StreamHandle,
    follower: Option<StreamHandle>,
    follower_started: bool,

    machine: PlaybackMachine,
    sequencer: RevealSequencer,
    drift: DriftCorrector,

    /// Sync capture point (seconds).
    capture_point: f64,
    audio: VolumeIntent,
    played: f64,
    duration: f64,
    buffered: f64,
    mask: MaskState,
    seeking: bool,
}

impl Session {
    /// Creates an unmounted session. Provider events for this session are
    /// delivered on the receiving end of `events_tx`.
    pub fn new(
        config: SyncConfig,
        factory: Arc<dyn ProviderFactory>,
        emitter: Arc<dyn EventEmitter>,
        events_tx: mpsc::UnboundedSender<ProviderEvent>,
    ) -> Self {
        Self {
            sequencer: RevealSequencer::new(&config.reveal),
            drift: DriftCorrector::new(config.drift.clone()),
            audio: VolumeIntent::new(config.initial_volume),
            config,
            factory,
            emitter,
            events_tx,
            stream_id: None,
            resume_from: None,
            mounted: false,
            generation: 0,
            leader: StreamHandle::empty(StreamRole::Leader),
            follower: None,
            follower_started: false,
            machine: PlaybackMachine::new(),
            capture_point: 0.0,
            played: 0.0,
            duration: 0.0,
            buffered: 0.0,
            mask: MaskState::Opaque,
            seeking: false,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> PlaybackState {
        self.machine.state()
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn capture_point(&self) -> f64 {
        self.capture_point
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Binds the session to `stream_id`.
    ///
    /// A different identifier than the current one tears the old handles down
    /// first. If playback was already desired, the new pair is constructed
    /// straight away.
    pub fn mount(&mut self, stream_id: &str, resume_from: Option<f64>) {
        if self.mounted && self.stream_id.as_deref() == Some(stream_id) {
            log::debug!("[Session] {} already mounted", stream_id);
            return;
        }

        self.teardown();

        log::info!(
            "[Session] Mounting stream {} (resume from {:?})",
            stream_id,
            resume_from
        );
        self.stream_id = Some(stream_id.to_string());
        self.resume_from = resume_from.filter(|t| t.is_finite() && *t > 0.0);
        self.mounted = true;

        if self.machine.has_started() {
            self.construct_handles();
        }
    }

    /// Unbinds the session, destroying both handles.
    pub fn unmount(&mut self) {
        if self.stream_id.is_none() {
            return;
        }
        self.teardown();
        log::info!("[Session] Unmounted");
        self.stream_id = None;
        self.resume_from = None;
        self.machine.reset_intent();
    }

    /// Constructs the handles without asking for playback, ending in
    /// `ReadyPaused` once the leader reports ready.
    pub fn prepare(&mut self) -> TandemResult<()> {
        self.ensure_mounted()?;
        if self.machine.state() == PlaybackState::Idle {
            self.construct_handles();
        }
        Ok(())
    }

    /// Records that the user wants playback, constructing handles if needed.
    pub fn request_playback(&mut self) -> TandemResult<()> {
        self.ensure_mounted()?;
        if self.machine.is_terminated() {
            return Err(TandemError::Terminated);
        }
        self.machine.mark_started();

        match self.machine.state() {
            PlaybackState::Idle => {
                self.construct_handles();
                Ok(())
            }
            PlaybackState::ReadyPaused | PlaybackState::Paused => self.play(),
            _ => Ok(()),
        }
    }

    /// Full teardown, in order: mark unmounted, cancel every reveal step,
    /// destroy both handles, reset the progress loop, reset ready flags.
    fn teardown(&mut self) {
        self.mounted = false;
        // Nothing constructed under the old generation may reach the new pair.
        self.generation += 1;

        self.sequencer.cancel();

        let stream_id = self.stream_id.clone().unwrap_or_default();
        let generation = self.generation - 1;
        if self.leader.destroy() {
            self.emit_handle_destroyed(&stream_id, StreamRole::Leader, generation);
        }
        if let Some(mut follower) = self.follower.take() {
            if follower.destroy() {
                self.emit_handle_destroyed(&stream_id, StreamRole::Follower, generation);
            }
        }
        self.leader = StreamHandle::empty(StreamRole::Leader);
        self.follower_started = false;

        self.drift.reset();
        self.seeking = false;

        let from = self.machine.state();
        self.machine.reset();
        if from != PlaybackState::Idle {
            log::info!("[Session] Torn down {} (was {:?})", stream_id, from);
            self.emit_state_changed(from, PlaybackState::Idle);
        }

        self.capture_point = 0.0;
        self.played = 0.0;
        self.duration = 0.0;
        self.buffered = 0.0;
        self.mask = MaskState::Opaque;
    }

    fn construct_handles(&mut self) {
        let Some(stream_id) = self.stream_id.clone() else {
            return;
        };
        self.generation += 1;
        let options = PlayerOptions::cued(self.resume_from.unwrap_or(0.0));

        self.leader = self.create_handle(StreamRole::Leader, &stream_id, &options);
        self.follower = if self.config.ambient_layer {
            Some(self.create_handle(StreamRole::Follower, &stream_id, &options))
                .filter(StreamHandle::is_live)
        } else {
            None
        };

        if let Err(e) = self.transition(PlaybackState::Loading) {
            log::warn!("[Session] Could not enter Loading: {}", e);
        }
    }

    fn create_handle(
        &self,
        role: StreamRole,
        stream_id: &str,
        options: &PlayerOptions,
    ) -> StreamHandle {
        let sink = ProviderEventSink::new(self.events_tx.clone(), self.generation, role);
        match self
            .factory
            .create(role.mount_point(), stream_id, options, sink)
        {
            Ok(player) => {
                log::debug!(
                    "[Session] Created {:?} player for {} (generation {})",
                    role,
                    stream_id,
                    self.generation
                );
                self.emitter.emit_playback(PlaybackEvent::HandleCreated {
                    stream_id: stream_id.to_string(),
                    role,
                    generation: self.generation,
                    timestamp: now_millis(),
                });
                StreamHandle::new(role, player)
            }
            Err(e) => {
                log::warn!("[Session] Failed to create {:?} player: {}", role, e);
                StreamHandle::empty(role)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Provider events
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies a provider event. Events from another generation, or arriving
    /// while unmounted or terminated, are dropped.
    pub fn handle_provider_event(&mut self, event: ProviderEvent, now: Instant) {
        if !self.mounted || event.generation != self.generation {
            log::trace!(
                "[Session] Dropping stale {:?} event from generation {} (current {})",
                event.role,
                event.generation,
                self.generation
            );
            return;
        }
        if self.machine.is_terminated() {
            log::trace!("[Session] Terminated, ignoring {:?}", event.kind);
            return;
        }

        match (event.role, event.kind) {
            (StreamRole::Leader, ProviderEventKind::Ready) => self.on_leader_ready(),
            (StreamRole::Leader, ProviderEventKind::StateChange(state)) => {
                self.on_leader_state(state, now)
            }
            (StreamRole::Leader, ProviderEventKind::Error(fault)) => self.terminate(fault),
            (StreamRole::Follower, ProviderEventKind::Ready) => self.on_follower_ready(),
            (StreamRole::Follower, ProviderEventKind::StateChange(state)) => {
                log::trace!("[Session] Follower reported {:?}", state);
            }
            (StreamRole::Follower, ProviderEventKind::Error(fault)) => self.drop_ambient(fault),
        }
    }

    fn on_leader_ready(&mut self) {
        self.leader.mark_ready();
        self.machine.set_player_ready(true);
        self.duration = self.leader.duration();
        if let Some(played) = played_fraction(self.leader.current_time(), self.duration) {
            self.played = played;
        }

        if self.machine.state() != PlaybackState::Loading {
            return;
        }

        let result = if self.machine.has_started() {
            let capture = self.resume_from.unwrap_or(0.0);
            self.enter_hidden_sync(capture)
        } else {
            self.transition(PlaybackState::ReadyPaused)
        };
        if let Err(e) = result {
            log::warn!("[Session] Leader ready but could not leave Loading: {}", e);
        }
    }

    fn on_follower_ready(&mut self) {
        let Some(follower) = self.follower.as_mut() else {
            return;
        };
        follower.mark_ready();
        follower.silence();
        // A follower that shows up late joins an already revealed session.
        if self.machine.has_revealed()
            && matches!(
                self.machine.state(),
                PlaybackState::Playing | PlaybackState::Buffering
            )
        {
            self.start_follower();
        }
    }

    fn on_leader_state(&mut self, reported: ProviderState, now: Instant) {
        let current = self.machine.state();

        if current == PlaybackState::HiddenSync {
            match reported {
                ProviderState::Playing => self.arm_reveal(now),
                ProviderState::Ended => self.on_ended(),
                other => log::trace!("[Session] Masked provider {:?} during hidden sync", other),
            }
            return;
        }

        if !matches!(
            current,
            PlaybackState::Playing
                | PlaybackState::Paused
                | PlaybackState::Buffering
                | PlaybackState::Ended
        ) {
            log::trace!("[Session] Ignoring provider {:?} in {:?}", reported, current);
            return;
        }

        // Until a reveal completes the leader is silenced, so only the end of
        // the stream is taken from the provider. Play goes back through hidden
        // sync.
        if !self.machine.has_revealed() && reported != ProviderState::Ended {
            log::trace!("[Session] Ignoring provider {:?} before reveal", reported);
            return;
        }

        let target = match reported {
            ProviderState::Playing => PlaybackState::Playing,
            ProviderState::Paused => PlaybackState::Paused,
            ProviderState::Buffering => PlaybackState::Buffering,
            ProviderState::Ended => {
                self.on_ended();
                return;
            }
            ProviderState::Unstarted | ProviderState::Cued => return,
        };
        if target == current {
            return;
        }

        if let Err(e) = self.transition(target) {
            log::debug!("[Session] Provider {:?} ignored: {}", reported, e);
            return;
        }

        match target {
            PlaybackState::Paused => {
                self.sequencer.cancel();
                if let Some(follower) = self.follower.as_mut() {
                    follower.pause();
                }
            }
            PlaybackState::Playing if self.machine.has_revealed() && !self.follower_started => {
                self.mask = MaskState::Clear;
                self.start_follower();
            }
            PlaybackState::Playing => self.mask = MaskState::Clear,
            _ => {}
        }
    }

    fn arm_reveal(&mut self, now: Instant) {
        match self.sequencer.arm(now) {
            Ok(epoch) => {
                log::info!(
                    "[Reveal] Leader playing under mask, reveal armed (capture point {:.3}s)",
                    self.capture_point
                );
                self.emitter.emit_playback(PlaybackEvent::SyncArmed {
                    stream_id: self.stream_label(),
                    capture_point: self.capture_point,
                    epoch,
                    timestamp: now_millis(),
                });
            }
            Err(e) => log::debug!("[Reveal] Repeated Playing event ignored: {}", e),
        }
    }

    fn on_ended(&mut self) {
        self.sequencer.cancel();
        if let Err(e) = self.transition(PlaybackState::Ended) {
            log::debug!("[Session] Provider Ended ignored: {}", e);
            return;
        }
        self.played = 1.0;
        if let Some(follower) = self.follower.as_mut() {
            follower.pause();
        }
        log::info!("[Session] Playback ended");
    }

    fn terminate(&mut self, fault: ProviderFault) {
        log::error!("[Session] Leader reported {:?}, terminating session", fault);
        self.sequencer.cancel();
        if let Err(e) = self.transition(PlaybackState::Terminated) {
            log::debug!("[Session] Could not terminate: {}", e);
            return;
        }
        self.mask = MaskState::Blackout;
        self.seeking = false;
        self.emitter.emit_playback(PlaybackEvent::Terminated {
            stream_id: self.stream_label(),
            fault,
            timestamp: now_millis(),
        });
    }

    fn drop_ambient(&mut self, fault: ProviderFault) {
        let Some(mut follower) = self.follower.take() else {
            return;
        };
        log::warn!(
            "[Session] Follower reported {:?}, continuing without ambient layer",
            fault
        );
        self.follower_started = false;
        let stream_id = self.stream_label();
        if follower.destroy() {
            self.emit_handle_destroyed(&stream_id, StreamRole::Follower, self.generation);
        }
        self.emitter.emit_playback(PlaybackEvent::AmbientLost {
            stream_id,
            reason: format!("{:?}", fault),
            timestamp: now_millis(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Hidden sync and reveal
    // ─────────────────────────────────────────────────────────────────────────

    /// Enters `HiddenSync`: clears any pending reveal, silences the leader,
    /// seeks it to `capture` and plays it under an opaque mask. The follower
    /// stays paused until the reveal.
    fn enter_hidden_sync(&mut self, capture: f64) -> TandemResult<()> {
        self.transition(PlaybackState::HiddenSync)?;
        self.sequencer.cancel();
        self.machine.clear_revealed();

        self.capture_point = if capture.is_finite() { capture.max(0.0) } else { 0.0 };
        self.mask = MaskState::Opaque;

        if let Some(follower) = self.follower.as_mut() {
            follower.pause();
            follower.silence();
        }
        self.follower_started = false;

        self.leader.silence();
        self.leader.seek_to(self.capture_point);
        self.leader.play();

        log::info!("[Session] Hidden sync from {:.3}s", self.capture_point);
        Ok(())
    }

    /// Runs every reveal step due at `now`.
    pub fn poll_timers(&mut self, now: Instant) {
        let steps = self.sequencer.poll(now);
        if steps.is_empty() {
            return;
        }
        // Late steps must never act on a torn-down or dead session.
        if !self.mounted || !self.leader.is_live() || self.machine.is_terminated() {
            log::debug!("[Reveal] Dropping {} steps for inactive session", steps.len());
            self.sequencer.cancel();
            return;
        }

        for step in steps {
            self.run_step(step);
        }
    }

    fn run_step(&mut self, step: RevealStep) {
        log::debug!("[Reveal] {:?}", step);
        match step {
            RevealStep::Warmup => self.leader.seek_to(self.capture_point),
            RevealStep::Settle => {
                self.restore_audio(None);
                self.mask = MaskState::Fading;
            }
            RevealStep::VolumePulse(index) => self.restore_audio(Some(index)),
            RevealStep::Reveal => self.reveal(),
        }
    }

    /// Applies the audio intent to the leader. Reads the intent at call time,
    /// so changes made during hidden sync are picked up by the next pulse.
    fn restore_audio(&mut self, pulse: Option<usize>) {
        if !self.audio.is_audible() {
            log::trace!("[Reveal] Audio intent is silent, skipping restoration");
            return;
        }

        let target = self.audio.provider_volume();
        self.leader.unmute();
        self.leader.set_volume(target);

        let mut nudged = false;
        if target > 0 && self.leader.volume_readback() == Some(0) {
            log::debug!("[Reveal] Volume read back as 0, nudging to {}", target);
            for volume in nudge_sequence(target, self.config.reveal.volume_nudge) {
                self.leader.set_volume(volume);
            }
            nudged = true;
        }

        self.emitter.emit_playback(PlaybackEvent::VolumeRestored {
            stream_id: self.stream_label(),
            volume: target,
            pulse,
            nudged,
            timestamp: now_millis(),
        });
    }

    fn reveal(&mut self) {
        if let Err(e) = self.transition(PlaybackState::Playing) {
            log::warn!("[Reveal] Reveal step out of order: {}", e);
            return;
        }
        self.mask = MaskState::Clear;
        self.machine.mark_revealed();

        let position = self.leader.current_time();
        log::info!("[Reveal] Revealed at {:.3}s", position);
        self.emitter.emit_playback(PlaybackEvent::Revealed {
            stream_id: self.stream_label(),
            position,
            timestamp: now_millis(),
        });

        self.start_follower();
    }

    /// Starts the ambient layer at the leader's position, muted at zero volume.
    fn start_follower(&mut self) {
        let leader_time = self.leader.current_time();
        let Some(follower) = self.follower.as_mut().filter(|f| f.is_ready()) else {
            return;
        };
        follower.silence();
        follower.seek_to(leader_time);
        follower.play();
        self.follower_started = true;
        log::debug!("[Session] Ambient layer started at {:.3}s", leader_time);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Progress loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the drift/progress loop should be running.
    pub fn drift_loop_active(&self) -> bool {
        self.mounted
            && self.leader.is_ready()
            && !self.machine.is_terminated()
            && !self.seeking
    }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            generation: self.generation,
            leader: self.leader.is_ready(),
            follower: self.follower.as_ref().is_some_and(StreamHandle::is_ready),
        }
    }

    /// One pass of the progress/drift loop.
    ///
    /// Publishes progress even under the mask. The follower is only corrected
    /// once it has been started after a reveal.
    pub fn drift_tick(&mut self) -> Option<ProgressSample> {
        if !self.drift_loop_active() {
            return None;
        }
        let follower = if self.follower_started {
            self.follower.as_mut()
        } else {
            None
        };
        let sample = self.drift.tick(&mut self.leader, follower)?;

        if sample.duration > 0.0 {
            self.duration = sample.duration;
        }
        if let Some(played) = sample.played {
            if self.machine.state() != PlaybackState::Ended {
                self.played = played;
            }
        }
        self.buffered = sample.buffered;

        if let (Some(drift), DriftCorrection::Soft { .. } | DriftCorrection::Hard { .. }) =
            (sample.drift, sample.correction)
        {
            log::debug!(
                "[Drift] {} correction of {:.3}s",
                sample.correction.label(),
                drift
            );
            self.emitter.emit_playback(PlaybackEvent::DriftCorrected {
                stream_id: self.stream_label(),
                drift,
                correction: sample.correction,
                timestamp: now_millis(),
            });
        }
        Some(sample)
    }

    /// Earliest pending reveal step.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sequencer.next_deadline()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Controls
    // ─────────────────────────────────────────────────────────────────────────

    pub fn toggle_play(&mut self) -> TandemResult<()> {
        self.ensure_controllable()?;
        match self.machine.state() {
            PlaybackState::HiddenSync | PlaybackState::Playing | PlaybackState::Buffering => {
                self.pause()
            }
            _ => self.play(),
        }
    }

    /// Starts playback.
    ///
    /// Before the first reveal this goes through hidden sync from the leader's
    /// current position; afterwards both handles are simply played and the
    /// state follows the provider. Playing an ended stream restarts it.
    pub fn play(&mut self) -> TandemResult<()> {
        self.ensure_controllable()?;
        self.machine.mark_started();

        match self.machine.state() {
            PlaybackState::ReadyPaused => {
                let capture = self.leader.current_time();
                self.enter_hidden_sync(capture)
            }
            PlaybackState::Paused if !self.machine.has_revealed() => {
                let capture = self.leader.current_time();
                self.enter_hidden_sync(capture)
            }
            PlaybackState::Paused => {
                self.leader.play();
                self.start_follower();
                Ok(())
            }
            PlaybackState::Ended => self.restart(),
            _ => Ok(()),
        }
    }

    /// Pauses playback. Pausing during hidden sync abandons the reveal: no
    /// audio restoration, no ambient start.
    pub fn pause(&mut self) -> TandemResult<()> {
        self.ensure_controllable()?;
        if !matches!(
            self.machine.state(),
            PlaybackState::HiddenSync | PlaybackState::Playing | PlaybackState::Buffering
        ) {
            return Ok(());
        }

        let dropped = self.sequencer.cancel();
        if dropped > 0 {
            log::debug!("[Session] Pause abandoned {} pending reveal steps", dropped);
        }
        self.transition(PlaybackState::Paused)?;
        self.leader.pause();
        if let Some(follower) = self.follower.as_mut() {
            follower.pause();
        }
        Ok(())
    }

    /// Start of a seek drag. Suspends the drift loop until [`Self::end_seek`].
    pub fn begin_seek(&mut self) -> TandemResult<()> {
        self.ensure_controllable()?;
        self.seeking = true;
        self.drift.suspend();
        Ok(())
    }

    /// Drag moved; only the displayed fraction changes.
    pub fn update_seek(&mut self, fraction: f64) -> TandemResult<()> {
        self.ensure_controllable()?;
        self.played = clamp_fraction(fraction);
        Ok(())
    }

    /// Drag released at `fraction`; seeks and resumes the drift loop.
    pub fn end_seek(&mut self, fraction: f64) -> TandemResult<()> {
        self.ensure_controllable()?;
        self.seeking = false;
        self.drift.resume();

        let fraction = clamp_fraction(fraction);
        let duration = self.leader.duration();
        if duration > 0.0 {
            self.seek_to_seconds(fraction * duration);
        } else {
            self.played = fraction;
        }
        Ok(())
    }

    /// Seeks `delta` seconds relative to the leader's position.
    pub fn seek_by(&mut self, delta: f64) -> TandemResult<()> {
        self.ensure_controllable()?;
        if !delta.is_finite() {
            return Ok(());
        }
        let position = self.leader.current_time();
        self.seek_to_seconds(position + delta);
        Ok(())
    }

    /// Steps one frame forward or back.
    pub fn step_frame(&mut self, forward: bool) -> TandemResult<()> {
        let step = self.config.controls.frame_step_secs;
        self.seek_by(if forward { step } else { -step })
    }

    fn seek_to_seconds(&mut self, seconds: f64) {
        let duration = self.leader.duration();
        let target = if duration > 0.0 {
            seconds.clamp(0.0, duration)
        } else {
            seconds.max(0.0)
        };

        if self.machine.state() == PlaybackState::HiddenSync {
            // The reveal re-seeks to the capture point, so move it with the user.
            self.capture_point = target;
        }
        self.leader.seek_to(target);
        if self.follower_started {
            if let Some(follower) = self.follower.as_mut() {
                follower.seek_to(target);
            }
        }
        if let Some(played) = played_fraction(target, duration) {
            self.played = played;
        }
        log::debug!("[Session] Seek to {:.3}s", target);
    }

    /// Sets the UI volume (0-100).
    pub fn set_volume(&mut self, level: u8) -> TandemResult<()> {
        self.ensure_controllable()?;
        self.audio.set_level(level);
        self.apply_audio();
        Ok(())
    }

    pub fn toggle_mute(&mut self) -> TandemResult<()> {
        self.ensure_controllable()?;
        self.audio.toggle_mute();
        self.apply_audio();
        Ok(())
    }

    /// Pushes the audio intent to the leader once it is audible. Before the
    /// first reveal and during hidden sync the intent is only recorded; the
    /// reveal applies it.
    fn apply_audio(&mut self) {
        if !self.machine.has_revealed() || self.machine.state() == PlaybackState::HiddenSync {
            return;
        }
        if self.audio.is_muted() {
            self.leader.mute();
        } else {
            self.leader.unmute();
            self.leader.set_volume(self.audio.provider_volume());
        }
    }

    /// Reloads both handles at position 0 and re-enters hidden sync.
    ///
    /// A reload rather than a seek, since providers do not reliably resume an
    /// ended stream from a seek alone.
    pub fn restart(&mut self) -> TandemResult<()> {
        self.ensure_controllable()?;
        let stream_id = self.stream_label();

        self.sequencer.cancel();
        self.machine.mark_started();
        self.leader.silence();
        self.leader.load_stream(&stream_id, 0.0);
        if let Some(follower) = self.follower.as_mut() {
            follower.silence();
            follower.load_stream(&stream_id, 0.0);
        }

        self.enter_hidden_sync(0.0)?;
        self.played = 0.0;
        log::info!("[Session] Restarted {}", stream_id);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Views
    // ─────────────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let state = self.machine.state();
        PlaybackSnapshot {
            stream_id: self.stream_id.clone(),
            state,
            played: self.played,
            duration: self.duration,
            buffered: self.buffered,
            volume: self.audio.level(),
            muted: self.audio.is_muted(),
            mask: self.mask,
            has_started: self.machine.has_started(),
            is_ready: self.is_controllable(),
            is_buffering: state == PlaybackState::Buffering,
            is_ended: state == PlaybackState::Ended,
            is_terminated: state == PlaybackState::Terminated,
            is_syncing: state == PlaybackState::HiddenSync,
            is_seeking: self.seeking,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn is_controllable(&self) -> bool {
        self.mounted
            && !self.machine.is_terminated()
            && self.machine.is_player_ready()
            && self.leader.is_ready()
    }

    fn ensure_mounted(&self) -> TandemResult<()> {
        if !self.mounted || self.stream_id.is_none() {
            return Err(TandemError::NoStream);
        }
        Ok(())
    }

    fn ensure_controllable(&self) -> TandemResult<()> {
        self.ensure_mounted()?;
        if self.machine.is_terminated() {
            return Err(TandemError::Terminated);
        }
        if !self.is_controllable() {
            return Err(TandemError::NotReady);
        }
        Ok(())
    }

    fn transition(&mut self, to: PlaybackState) -> TandemResult<()> {
        let from = self.machine.transition(to)?;
        if from != to {
            self.emit_state_changed(from, to);
        }
        Ok(())
    }

    fn stream_label(&self) -> String {
        self.stream_id.clone().unwrap_or_default()
    }

    fn emit_state_changed(&self, from: PlaybackState, to: PlaybackState) {
        self.emitter.emit_playback(PlaybackEvent::StateChanged {
            stream_id: self.stream_label(),
            from,
            to,
            timestamp: now_millis(),
        });
    }

    fn emit_handle_destroyed(&self, stream_id: &str, role: StreamRole, generation: u64) {
        log::debug!(
            "[Session] Destroyed {:?} player for {} (generation {})",
            role,
            stream_id,
            generation
        );
        self.emitter.emit_playback(PlaybackEvent::HandleDestroyed {
            stream_id: stream_id.to_string(),
            role,
            generation,
            timestamp: now_millis(),
        });
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("stream_id", &self.stream_id)
            .field("generation", &self.generation)
            .field("state", &self.machine.state())
            .field("leader", &self.leader)
            .field("follower", &self.follower)
            .finish_non_exhaustive()
    }
}
