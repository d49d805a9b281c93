//! Control surface.
//!
//! The user-facing side of a session: transport controls, seeking, volume,
//! restart, fullscreen and keyboard shortcuts. Every control is disabled (the
//! call returns [`TandemError::NotReady`]) until the transport is ready, and
//! every control counts as user activity for the auto-hiding controls.

pub mod fullscreen;
pub mod keyboard;
pub mod volume;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::ControlsConfig;
use crate::error::{TandemError, TandemResult};
use crate::events::{EventEmitter, SurfaceEvent};
use crate::host::HostDocument;
use crate::playback::{PlaybackSnapshot, SessionCommand, SessionDriver};
use crate::ui::{UiBridge, UiState};
use crate::utils::now_millis;

pub use fullscreen::{FullscreenApi, FullscreenController, FullscreenError, FullscreenScope};
pub use keyboard::Shortcut;
pub use volume::{nudge_sequence, perceptual_volume, VolumeIntent};

/// What presentation components render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceView {
    pub playback: PlaybackSnapshot,
    pub ui: UiState,
}

/// Translates user intent into session commands.
pub struct ControlSurface {
    driver: Arc<SessionDriver>,
    host: Arc<dyn HostDocument>,
    emitter: Arc<dyn EventEmitter>,
    controls: ControlsConfig,
    fullscreen: Mutex<FullscreenController>,
    ui: Mutex<UiBridge>,
}

impl ControlSurface {
    pub fn new(
        driver: Arc<SessionDriver>,
        host: Arc<dyn HostDocument>,
        emitter: Arc<dyn EventEmitter>,
        controls: ControlsConfig,
    ) -> Self {
        let ui = UiBridge::new(&controls, &host.device_hints(), Instant::now());
        Self {
            driver,
            host,
            emitter,
            controls,
            fullscreen: Mutex::new(FullscreenController::new()),
            ui: Mutex::new(ui),
        }
    }

    pub fn driver(&self) -> &SessionDriver {
        &self.driver
    }

    pub fn view(&self) -> SurfaceView {
        SurfaceView {
            playback: self.driver.snapshot(),
            ui: self.ui.lock().state(),
        }
    }

    /// Whether controls should be enabled right now.
    pub fn controls_enabled(&self) -> bool {
        self.ensure_enabled().is_ok()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn toggle_play(&self) -> TandemResult<()> {
        self.command(SessionCommand::TogglePlay).await
    }

    pub async fn play(&self) -> TandemResult<()> {
        self.command(SessionCommand::Play).await
    }

    pub async fn pause(&self) -> TandemResult<()> {
        self.command(SessionCommand::Pause).await
    }

    pub async fn restart(&self) -> TandemResult<()> {
        self.command(SessionCommand::Restart).await
    }

    /// Seek drag started; progress updates stop until [`Self::end_seek`].
    pub async fn begin_seek(&self) -> TandemResult<()> {
        self.command(SessionCommand::BeginSeek).await
    }

    pub async fn update_seek(&self, fraction: f64) -> TandemResult<()> {
        self.command(SessionCommand::UpdateSeek(fraction)).await
    }

    pub async fn end_seek(&self, fraction: f64) -> TandemResult<()> {
        self.command(SessionCommand::EndSeek(fraction)).await
    }

    pub async fn seek_by(&self, delta: f64) -> TandemResult<()> {
        self.command(SessionCommand::SeekBy(delta)).await
    }

    pub async fn step_frame(&self, forward: bool) -> TandemResult<()> {
        self.command(SessionCommand::StepFrame { forward }).await
    }

    /// Sets the UI volume (0-100); the provider gets the perceptual value.
    pub async fn set_volume(&self, level: u8) -> TandemResult<()> {
        self.command(SessionCommand::SetVolume(level.min(100))).await
    }

    pub async fn toggle_mute(&self) -> TandemResult<()> {
        self.command(SessionCommand::ToggleMute).await
    }

    async fn command(&self, command: SessionCommand) -> TandemResult<()> {
        self.ensure_enabled()?;
        self.activity(Instant::now());
        self.driver.send(command).await
    }

    fn ensure_enabled(&self) -> TandemResult<()> {
        let snapshot = self.driver.snapshot();
        if snapshot.stream_id.is_none() {
            return Err(TandemError::NoStream);
        }
        if snapshot.is_terminated {
            return Err(TandemError::Terminated);
        }
        if !snapshot.is_ready {
            return Err(TandemError::NotReady);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fullscreen
    // ─────────────────────────────────────────────────────────────────────────

    /// Requests or leaves fullscreen. A host that rejects the request is
    /// logged and otherwise ignored; the flag only follows
    /// [`Self::on_fullscreen_change`].
    pub fn toggle_fullscreen(&self) -> TandemResult<()> {
        self.ensure_enabled()?;
        self.activity(Instant::now());
        if let Err(e) = self.fullscreen.lock().toggle(self.host.as_ref()) {
            log::warn!("[Surface] Fullscreen toggle failed: {}", e);
        }
        Ok(())
    }

    /// Host reported a `fullscreenchange` (or prefixed) notification.
    pub fn on_fullscreen_change(&self, is_fullscreen: bool) {
        if !self.fullscreen.lock().on_change(is_fullscreen) {
            return;
        }
        self.ui.lock().set_fullscreen(is_fullscreen);
        log::debug!("[Surface] Fullscreen is now {}", is_fullscreen);
        self.emitter.emit_surface(SurfaceEvent::FullscreenChanged {
            is_fullscreen,
            timestamp: now_millis(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Keyboard
    // ─────────────────────────────────────────────────────────────────────────

    /// Handles a key press from the host.
    ///
    /// Returns the shortcut that ran, or `None` if the key is not bound or a
    /// text input has focus.
    pub async fn handle_key(&self, key: &str) -> TandemResult<Option<Shortcut>> {
        if self.host.text_input_focused() {
            log::trace!("[Surface] Text input focused, ignoring {:?}", key);
            return Ok(None);
        }
        let Some(shortcut) = Shortcut::from_key(key) else {
            return Ok(None);
        };

        let step = self.controls.seek_step_secs;
        match shortcut {
            Shortcut::TogglePlay => self.toggle_play().await?,
            Shortcut::ToggleFullscreen => self.toggle_fullscreen()?,
            Shortcut::ToggleMute => self.toggle_mute().await?,
            Shortcut::SeekBackward => self.seek_by(-step).await?,
            Shortcut::SeekForward => self.seek_by(step).await?,
            Shortcut::FrameBackward => self.step_frame(false).await?,
            Shortcut::FrameForward => self.step_frame(true).await?,
        }

        self.emitter.emit_surface(SurfaceEvent::ShortcutInvoked {
            shortcut,
            timestamp: now_millis(),
        });
        Ok(Some(shortcut))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // UI bridge
    // ─────────────────────────────────────────────────────────────────────────

    /// Pointer or key activity; shows the controls.
    pub fn activity(&self, now: Instant) {
        let changed = self.ui.lock().touch(now);
        self.emit_visibility(changed);
    }

    /// Re-derives controls visibility from the playback state.
    pub fn tick(&self, now: Instant) {
        let playing = self.driver.snapshot().state.is_rolling();
        let changed = self.ui.lock().sync(now, playing);
        self.emit_visibility(changed);
    }

    /// When the controls hide if nothing else happens.
    pub fn hide_deadline(&self) -> Instant {
        self.ui.lock().hide_deadline()
    }

    /// Re-reads the host's device hints, e.g. after a resize.
    pub fn refresh_device(&self) -> bool {
        self.ui.lock().update_device(&self.host.device_hints())
    }

    fn emit_visibility(&self, changed: Option<bool>) {
        if let Some(visible) = changed {
            self.emitter
                .emit_surface(SurfaceEvent::ControlsVisibilityChanged {
                    visible,
                    timestamp: now_millis(),
                });
        }
    }
}

impl std::fmt::Debug for ControlSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlSurface")
            .field("driver", &self.driver)
            .field("fullscreen", &*self.fullscreen.lock())
            .field("ui", &self.ui.lock().state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::config::SyncConfig;
    use crate::events::PlaybackEvent;
    use crate::playback::PlaybackState;
    use crate::provider::simulated::{SimCall, SimulatedBehavior, SimulatedProvider};
    use crate::provider::StreamRole;
    use crate::runtime::TokioSpawner;
    use crate::ui::DeviceHints;
    use tokio::time::sleep;

    #[derive(Default)]
    struct TestHost {
        typing: AtomicBool,
        reject: AtomicBool,
        narrow: AtomicBool,
        requests: AtomicUsize,
    }

    impl HostDocument for TestHost {
        fn text_input_focused(&self) -> bool {
            self.typing.load(Ordering::SeqCst)
        }

        fn request_fullscreen(
            &self,
            _scope: FullscreenScope,
            _api: FullscreenApi,
        ) -> Result<(), FullscreenError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.reject.load(Ordering::SeqCst) {
                Err(FullscreenError::Rejected("not allowed".into()))
            } else {
                Ok(())
            }
        }

        fn device_hints(&self) -> DeviceHints {
            DeviceHints {
                user_agent: "Mozilla/5.0 (X11; Linux x86_64)".into(),
                max_touch_points: 0,
                viewport_width: if self.narrow.load(Ordering::SeqCst) { 390 } else { 1440 },
            }
        }
    }

    #[derive(Default)]
    struct SurfaceLog {
        events: Mutex<Vec<SurfaceEvent>>,
    }

    impl EventEmitter for SurfaceLog {
        fn emit_playback(&self, _event: PlaybackEvent) {}

        fn emit_surface(&self, event: SurfaceEvent) {
            self.events.lock().push(event);
        }
    }

    struct Fixture {
        surface: ControlSurface,
        provider: SimulatedProvider,
        host: Arc<TestHost>,
        log: Arc<SurfaceLog>,
    }

    async fn fixture() -> Fixture {
        let behavior =
            SimulatedBehavior::realistic(Duration::from_millis(500), Duration::from_millis(200), 300.0);
        let provider = SimulatedProvider::with_behavior(behavior.clone(), behavior);
        let driver = SessionDriver::spawn(
            SyncConfig::default(),
            Arc::new(provider.clone()),
            Arc::new(crate::events::NoopEventEmitter),
            &TokioSpawner::current(),
        )
        .expect("default config is valid");
        driver
            .send(SessionCommand::Mount {
                stream_id: "abc".into(),
                resume_from: None,
            })
            .await
            .expect("mount");
        driver
            .send(SessionCommand::RequestPlayback)
            .await
            .expect("request playback");

        let host = Arc::new(TestHost::default());
        let log = Arc::new(SurfaceLog::default());
        let surface = ControlSurface::new(
            Arc::new(driver),
            host.clone(),
            log.clone(),
            ControlsConfig::default(),
        );
        Fixture {
            surface,
            provider,
            host,
            log,
        }
    }

    /// Past the reveal (ready 500ms, playing 700ms, reveal 5450ms).
    async fn revealed() -> Fixture {
        let f = fixture().await;
        sleep(Duration::from_millis(5500)).await;
        assert_eq!(f.surface.view().playback.state, PlaybackState::Playing);
        f
    }

    #[tokio::test(start_paused = true)]
    async fn controls_are_disabled_until_ready() {
        let f = fixture().await;
        assert!(!f.surface.controls_enabled());
        assert!(matches!(f.surface.toggle_play().await, Err(TandemError::NotReady)));
        assert!(matches!(f.surface.toggle_fullscreen(), Err(TandemError::NotReady)));
        assert_eq!(f.host.requests.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(600)).await;
        assert!(f.surface.controls_enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn shortcuts_drive_the_session() {
        let f = revealed().await;

        assert_eq!(f.surface.handle_key("k").await.unwrap(), Some(Shortcut::TogglePlay));
        assert_eq!(f.surface.view().playback.state, PlaybackState::Paused);

        f.surface.handle_key("m").await.unwrap();
        assert!(f.surface.view().playback.muted);

        f.provider.set_position(StreamRole::Leader, 60.0);
        f.surface.handle_key("ArrowRight").await.unwrap();
        assert!(f
            .provider
            .calls(StreamRole::Leader)
            .contains(&SimCall::SeekTo(65.0)));

        assert_eq!(f.surface.handle_key("x").await.unwrap(), None);
        let invoked = f
            .log
            .events
            .lock()
            .iter()
            .filter(|e| matches!(e, SurfaceEvent::ShortcutInvoked { .. }))
            .count();
        assert_eq!(invoked, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shortcuts_are_ignored_while_typing() {
        let f = revealed().await;
        f.host.typing.store(true, Ordering::SeqCst);

        assert_eq!(f.surface.handle_key(" ").await.unwrap(), None);
        assert_eq!(f.surface.view().playback.state, PlaybackState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn fullscreen_follows_notifications_and_swallows_rejection() {
        let f = revealed().await;
        f.host.reject.store(true, Ordering::SeqCst);

        f.surface.toggle_fullscreen().expect("rejection is swallowed");
        assert!(f.host.requests.load(Ordering::SeqCst) > 0);
        assert!(!f.surface.view().ui.is_fullscreen);

        f.host.reject.store(false, Ordering::SeqCst);
        f.surface.handle_key("f").await.unwrap();
        assert!(!f.surface.view().ui.is_fullscreen);

        f.surface.on_fullscreen_change(true);
        f.surface.on_fullscreen_change(true);
        assert!(f.surface.view().ui.is_fullscreen);
        let changes = f
            .log
            .events
            .lock()
            .iter()
            .filter(|e| matches!(e, SurfaceEvent::FullscreenChanged { .. }))
            .count();
        assert_eq!(changes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn controls_hide_while_playing_and_return_on_activity() {
        let f = revealed().await;
        let now = Instant::now();
        f.surface.activity(now);

        f.surface.tick(now + Duration::from_millis(2999));
        assert!(f.surface.view().ui.controls_visible);

        f.surface.tick(f.surface.hide_deadline());
        assert!(!f.surface.view().ui.controls_visible);

        f.surface.activity(now + Duration::from_secs(4));
        assert!(f.surface.view().ui.controls_visible);
        assert!(!f.surface.view().ui.is_mobile);
    }

    #[tokio::test(start_paused = true)]
    async fn resize_is_picked_up_on_refresh() {
        let f = fixture().await;
        assert!(!f.surface.view().ui.is_mobile);

        f.host.narrow.store(true, Ordering::SeqCst);
        assert!(!f.surface.view().ui.is_mobile);
        assert!(f.surface.refresh_device());
        assert!(f.surface.view().ui.is_mobile);

        f.host.narrow.store(false, Ordering::SeqCst);
        assert!(!f.surface.refresh_device());
    }

    #[tokio::test(start_paused = true)]
    async fn volume_is_gated_and_mapped() {
        let f = revealed().await;
        f.surface.set_volume(50).await.unwrap();

        assert_eq!(f.surface.view().playback.volume, 50);
        assert_eq!(f.provider.volume(StreamRole::Leader), Some(25));
    }
}
