//! Session driver task.
//!
//! A [`SessionDriver`] owns a [`Session`] inside one background task and feeds
//! it from four sources: caller commands, provider events, the reveal
//! sequencer's next deadline and the drift loop's fixed cadence. Everything
//! that touches the session runs on that task, so a step can never race a
//! teardown.
//!
//! ```text
//!   SessionDriver::send ──► commands ─┐
//!   ProviderEventSink ───► events ────┼──► select loop ──► Session
//!   sequencer deadline ───────────────┤         │
//!   drift interval (while ready) ─────┘         └──► watch<PlaybackSnapshot>
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::error::{TandemError, TandemResult};
use crate::events::EventEmitter;
use crate::provider::{ProviderEvent, ProviderFactory};
use crate::runtime::TaskSpawner;

use super::session::{PlaybackSnapshot, Session};

/// Pending commands before [`SessionDriver::send`] starts waiting.
const COMMAND_QUEUE_CAPACITY: usize = 32;

/// A request for the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Mount {
        stream_id: String,
        resume_from: Option<f64>,
    },
    Unmount,
    Prepare,
    RequestPlayback,
    TogglePlay,
    Play,
    Pause,
    BeginSeek,
    /// Drag position as a played fraction.
    UpdateSeek(f64),
    /// Release position as a played fraction.
    EndSeek(f64),
    /// Relative seek in seconds.
    SeekBy(f64),
    StepFrame {
        forward: bool,
    },
    SetVolume(u8),
    ToggleMute,
    Restart,
}

struct Envelope {
    command: SessionCommand,
    reply: oneshot::Sender<TandemResult<()>>,
}

fn dispatch(session: &mut Session, command: SessionCommand) -> TandemResult<()> {
    match command {
        SessionCommand::Mount {
            stream_id,
            resume_from,
        } => {
            session.mount(&stream_id, resume_from);
            Ok(())
        }
        SessionCommand::Unmount => {
            session.unmount();
            Ok(())
        }
        SessionCommand::Prepare => session.prepare(),
        SessionCommand::RequestPlayback => session.request_playback(),
        SessionCommand::TogglePlay => session.toggle_play(),
        SessionCommand::Play => session.play(),
        SessionCommand::Pause => session.pause(),
        SessionCommand::BeginSeek => session.begin_seek(),
        SessionCommand::UpdateSeek(fraction) => session.update_seek(fraction),
        SessionCommand::EndSeek(fraction) => session.end_seek(fraction),
        SessionCommand::SeekBy(delta) => session.seek_by(delta),
        SessionCommand::StepFrame { forward } => session.step_frame(forward),
        SessionCommand::SetVolume(level) => session.set_volume(level),
        SessionCommand::ToggleMute => session.toggle_mute(),
        SessionCommand::Restart => session.restart(),
    }
}

/// Handle to a session running on its own task.
///
/// Dropping the driver (or calling [`Self::shutdown`]) stops the task, which
/// tears the session down and destroys both players.
pub struct SessionDriver {
    commands: mpsc::Sender<Envelope>,
    snapshots: watch::Receiver<PlaybackSnapshot>,
    cancel: CancellationToken,
}

impl SessionDriver {
    /// Validates `config` and starts the session task on `spawner`.
    pub fn spawn<S: TaskSpawner>(
        config: SyncConfig,
        factory: Arc<dyn ProviderFactory>,
        emitter: Arc<dyn EventEmitter>,
        spawner: &S,
    ) -> TandemResult<Self> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let session = Session::new(config, factory, emitter, events_tx);
        let (snapshots_tx, snapshots_rx) = watch::channel(session.snapshot());
        let cancel = CancellationToken::new();

        spawner.spawn(run(
            session,
            commands_rx,
            events_rx,
            snapshots_tx,
            cancel.clone(),
        ));

        Ok(Self {
            commands: commands_tx,
            snapshots: snapshots_rx,
            cancel,
        })
    }

    /// Sends `command` and waits for the session's answer.
    ///
    /// # Errors
    ///
    /// [`TandemError::SessionClosed`] once the task has stopped, otherwise
    /// whatever the session returned for the command.
    pub async fn send(&self, command: SessionCommand) -> TandemResult<()> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(Envelope { command, reply })
            .await
            .map_err(|_| TandemError::SessionClosed)?;
        answer.await.map_err(|_| TandemError::SessionClosed)?
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes whenever the snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshots.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

impl Drop for SessionDriver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDriver")
            .field("closed", &self.is_closed())
            .field("state", &self.snapshots.borrow().state)
            .finish()
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run(
    mut session: Session,
    mut commands: mpsc::Receiver<Envelope>,
    mut events: mpsc::UnboundedReceiver<ProviderEvent>,
    snapshots: watch::Sender<PlaybackSnapshot>,
    cancel: CancellationToken,
) {
    let mut drift = interval(session.config().drift.interval());
    drift.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut readiness = session.readiness();

    log::debug!("[Driver] Session task started");

    loop {
        let deadline = session.next_deadline();
        let drift_active = session.drift_loop_active();
        let mut answer = None;

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                log::debug!("[Driver] Cancelled");
                break;
            }

            envelope = commands.recv() => {
                let Some(Envelope { command, reply }) = envelope else {
                    log::debug!("[Driver] All handles dropped");
                    break;
                };
                log::trace!("[Driver] {:?}", command);
                let result = dispatch(&mut session, command);
                if let Err(e) = &result {
                    log::debug!("[Driver] Command rejected: {}", e);
                }
                answer = Some((reply, result));
            }

            Some(event) = events.recv() => {
                session.handle_provider_event(event, Instant::now());
            }

            _ = sleep_until_deadline(deadline) => {
                session.poll_timers(Instant::now());
            }

            _ = drift.tick(), if drift_active => {
                session.drift_tick();
            }
        }

        // A new pair or a newly ready handle restarts the cadence from now.
        let current = session.readiness();
        if current != readiness {
            readiness = current;
            drift.reset();
        }

        let snapshot = session.snapshot();
        snapshots.send_if_modified(|published| {
            if *published == snapshot {
                return false;
            }
            *published = snapshot;
            true
        });

        // Answered after publishing, so callers see the snapshot their command
        // produced.
        if let Some((reply, result)) = answer {
            let _ = reply.send(result);
        }
    }

    session.unmount();
    snapshots.send_replace(session.snapshot());
    log::debug!("[Driver] Session task stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::{BroadcastEventBridge, PlaybackEvent, TandemEvent};
    use crate::playback::{MaskState, PlaybackState};
    use crate::provider::simulated::{SimCall, SimulatedBehavior, SimulatedProvider};
    use crate::provider::StreamRole;
    use crate::runtime::TokioSpawner;
    use tokio::sync::broadcast;
    use tokio::time::sleep;

    fn realistic() -> SimulatedBehavior {
        SimulatedBehavior::realistic(Duration::from_millis(500), Duration::from_millis(200), 300.0)
    }

    struct Rig {
        driver: SessionDriver,
        provider: SimulatedProvider,
        events: broadcast::Receiver<TandemEvent>,
        t0: Instant,
    }

    impl Rig {
        fn new(provider: SimulatedProvider) -> Self {
            let bridge = BroadcastEventBridge::new(1024);
            let events = bridge.subscribe();
            let driver = SessionDriver::spawn(
                SyncConfig::default(),
                Arc::new(provider.clone()),
                Arc::new(bridge),
                &TokioSpawner::current(),
            )
            .expect("default config is valid");
            Self {
                driver,
                provider,
                events,
                t0: Instant::now(),
            }
        }

        async fn start(&self, stream_id: &str) {
            self.driver
                .send(SessionCommand::Mount {
                    stream_id: stream_id.to_string(),
                    resume_from: None,
                })
                .await
                .expect("mount");
            self.driver
                .send(SessionCommand::RequestPlayback)
                .await
                .expect("request playback");
        }

        async fn at(&self, ms: u64) {
            sleep_until(self.t0 + Duration::from_millis(ms)).await;
        }

        fn drain(&mut self) -> Vec<PlaybackEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                if let TandemEvent::Playback(event) = event {
                    out.push(event);
                }
            }
            out
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reveals_once_the_fixed_delays_have_passed() {
        let rig = Rig::new(SimulatedProvider::with_behavior(realistic(), realistic()));
        rig.start("abc").await;

        // Ready at 500, playing under the mask at 700, reveal at 700 + 4750.
        rig.at(600).await;
        assert_eq!(rig.driver.snapshot().state, PlaybackState::HiddenSync);

        rig.at(4600).await;
        assert_eq!(rig.provider.volume(StreamRole::Leader), Some(0));

        rig.at(4700).await;
        assert_eq!(rig.provider.volume(StreamRole::Leader), Some(100));

        rig.at(5400).await;
        let snapshot = rig.driver.snapshot();
        assert_eq!(snapshot.state, PlaybackState::HiddenSync);
        assert!(snapshot.is_syncing);

        rig.at(5500).await;
        let snapshot = rig.driver.snapshot();
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.mask, MaskState::Clear);
        assert_eq!(rig.provider.is_playing(StreamRole::Follower), Some(true));
        assert_eq!(rig.provider.is_muted(StreamRole::Follower), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_advances_under_the_mask() {
        let rig = Rig::new(SimulatedProvider::with_behavior(realistic(), realistic()));
        rig.start("abc").await;

        rig.at(3000).await;
        let snapshot = rig.driver.snapshot();
        assert_eq!(snapshot.state, PlaybackState::HiddenSync);
        assert_eq!(snapshot.duration, 300.0);
        assert!(snapshot.played > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn changing_identifier_cancels_the_old_reveal() {
        let mut rig = Rig::new(SimulatedProvider::with_behavior(realistic(), realistic()));
        rig.start("a").await;

        rig.at(2000).await;
        rig.drain();
        rig.driver
            .send(SessionCommand::Mount {
                stream_id: "b".to_string(),
                resume_from: None,
            })
            .await
            .expect("mount");

        // The first reveal would have landed at 5450.
        rig.at(5500).await;
        assert_eq!(rig.driver.snapshot().state, PlaybackState::HiddenSync);
        assert_eq!(rig.driver.snapshot().stream_id.as_deref(), Some("b"));
        assert!(!rig
            .drain()
            .iter()
            .any(|e| matches!(e, PlaybackEvent::Revealed { .. })));

        rig.at(7500).await;
        assert_eq!(rig.driver.snapshot().state, PlaybackState::Playing);

        let journal = rig.provider.journal();
        let first_new = journal
            .iter()
            .position(|e| matches!(&e.call, SimCall::Created { stream_id, .. } if stream_id == "b"))
            .expect("new pair created");
        let last_destroyed = journal
            .iter()
            .rposition(|e| e.call == SimCall::Destroyed)
            .expect("old pair destroyed");
        assert!(last_destroyed < first_new);
    }

    #[tokio::test(start_paused = true)]
    async fn controls_report_not_ready_until_the_leader_is() {
        let rig = Rig::new(SimulatedProvider::with_behavior(realistic(), realistic()));
        assert!(matches!(
            rig.driver.send(SessionCommand::Play).await,
            Err(TandemError::NoStream)
        ));

        rig.start("abc").await;
        assert!(matches!(
            rig.driver.send(SessionCommand::SetVolume(40)).await,
            Err(TandemError::NotReady)
        ));

        rig.at(600).await;
        rig.driver
            .send(SessionCommand::SetVolume(40))
            .await
            .expect("leader is ready");
        assert_eq!(rig.driver.snapshot().volume, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn drifting_follower_is_pulled_back() {
        let mut rig = Rig::new(SimulatedProvider::with_behavior(
            realistic(),
            realistic().with_clock_skew(1.1),
        ));
        rig.start("abc").await;

        rig.at(5500).await;
        rig.drain();

        rig.at(9000).await;
        let corrections = rig
            .drain()
            .into_iter()
            .filter(|e| matches!(e, PlaybackEvent::DriftCorrected { .. }))
            .count();
        assert!(corrections > 0);

        let leader = rig.provider.position(StreamRole::Leader).expect("leader");
        let follower = rig.provider.position(StreamRole::Follower).expect("follower");
        assert!((leader - follower).abs() < 0.75, "leader {leader} follower {follower}");
    }

    #[tokio::test(start_paused = true)]
    async fn seek_drag_stops_the_drift_loop() {
        let rig = Rig::new(SimulatedProvider::with_behavior(realistic(), realistic()));
        rig.start("abc").await;
        rig.at(5500).await;

        rig.driver
            .send(SessionCommand::BeginSeek)
            .await
            .expect("ready");
        let reads = rig.provider.position_reads(StreamRole::Leader);

        rig.at(7000).await;
        assert_eq!(rig.provider.position_reads(StreamRole::Leader), reads);
        assert!(rig.driver.snapshot().is_seeking);

        rig.driver
            .send(SessionCommand::EndSeek(0.5))
            .await
            .expect("ready");
        rig.at(7500).await;
        assert!(rig.provider.position_reads(StreamRole::Leader) > reads);
        assert!(!rig.driver.snapshot().is_seeking);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_tears_the_session_down() {
        let rig = Rig::new(SimulatedProvider::with_behavior(realistic(), realistic()));
        rig.start("abc").await;
        rig.at(1000).await;
        let mut snapshots = rig.driver.subscribe();

        rig.driver.shutdown();
        sleep(Duration::from_millis(10)).await;

        assert!(matches!(
            rig.driver.send(SessionCommand::Pause).await,
            Err(TandemError::SessionClosed)
        ));
        assert!(rig.driver.is_closed());
        assert_eq!(rig.provider.calls(StreamRole::Leader).last(), Some(&SimCall::Destroyed));
        assert_eq!(rig.provider.calls(StreamRole::Follower).last(), Some(&SimCall::Destroyed));
        assert_eq!(snapshots.borrow_and_update().state, PlaybackState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_is_rejected() {
        let mut config = SyncConfig::default();
        config.drift.interval_ms = 0;
        let result = SessionDriver::spawn(
            config,
            Arc::new(SimulatedProvider::new()),
            Arc::new(crate::events::NoopEventEmitter),
            &TokioSpawner::current(),
        );
        assert!(matches!(result, Err(TandemError::Configuration(_))));
    }
}
