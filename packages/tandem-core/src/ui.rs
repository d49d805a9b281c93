//! UI state bridge.
//!
//! Presentation-only state derived next to the playback session: whether the
//! controls are showing, whether the host is fullscreen, and whether it looks
//! like a mobile device. None of it affects playback correctness.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::ControlsConfig;

/// User agent fragments that identify a mobile device.
const MOBILE_UA_TOKENS: [&str; 5] = ["Mobi", "Android", "iPhone", "iPad", "iPod"];

/// Touch devices up to this viewport width count as mobile (tablets).
const TOUCH_VIEWPORT_PX: u32 = 1024;

/// What the host can tell about the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceHints {
    pub user_agent: String,
    pub max_touch_points: u32,
    /// Viewport width in CSS pixels; 0 if unknown.
    pub viewport_width: u32,
}

/// Mobile if the user agent says so, if a touch screen sits on a narrow
/// viewport, or if the viewport is below `breakpoint_px`.
pub fn detect_mobile(hints: &DeviceHints, breakpoint_px: u32) -> bool {
    if MOBILE_UA_TOKENS
        .iter()
        .any(|token| hints.user_agent.contains(token))
    {
        return true;
    }
    let width = hints.viewport_width;
    if width == 0 {
        return false;
    }
    (hints.max_touch_points > 0 && width <= TOUCH_VIEWPORT_PX) || width < breakpoint_px
}

/// Presentation flags published next to the playback snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub controls_visible: bool,
    pub is_fullscreen: bool,
    pub is_mobile: bool,
}

/// Derives [`UiState`] from user activity and host notifications.
#[derive(Debug)]
pub struct UiBridge {
    hide_after: Duration,
    breakpoint_px: u32,
    last_activity: Instant,
    state: UiState,
}

impl UiBridge {
    pub fn new(config: &ControlsConfig, hints: &DeviceHints, now: Instant) -> Self {
        Self {
            hide_after: config.controls_hide(),
            breakpoint_px: config.mobile_breakpoint_px,
            last_activity: now,
            state: UiState {
                controls_visible: true,
                is_fullscreen: false,
                is_mobile: detect_mobile(hints, config.mobile_breakpoint_px),
            },
        }
    }

    pub fn state(&self) -> UiState {
        self.state
    }

    /// Records user activity; controls show again.
    ///
    /// Returns the new visibility if it changed.
    pub fn touch(&mut self, now: Instant) -> Option<bool> {
        self.last_activity = now;
        self.set_controls_visible(true)
    }

    /// Re-derives controls visibility: always visible unless playing, hidden
    /// once `controls_hide_ms` passed without activity.
    ///
    /// Returns the new visibility if it changed.
    pub fn sync(&mut self, now: Instant, playing: bool) -> Option<bool> {
        let idle = now.saturating_duration_since(self.last_activity);
        self.set_controls_visible(!playing || idle < self.hide_after)
    }

    /// When the controls will hide if nothing else happens.
    pub fn hide_deadline(&self) -> Instant {
        self.last_activity + self.hide_after
    }

    /// Records a host fullscreen notification. Returns `true` if it changed.
    pub fn set_fullscreen(&mut self, is_fullscreen: bool) -> bool {
        let changed = self.state.is_fullscreen != is_fullscreen;
        self.state.is_fullscreen = is_fullscreen;
        changed
    }

    /// Re-runs mobile detection, e.g. after a resize.
    pub fn update_device(&mut self, hints: &DeviceHints) -> bool {
        self.state.is_mobile = detect_mobile(hints, self.breakpoint_px);
        self.state.is_mobile
    }

    fn set_controls_visible(&mut self, visible: bool) -> Option<bool> {
        if self.state.controls_visible == visible {
            return None;
        }
        self.state.controls_visible = visible;
        Some(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints(ua: &str, touch: u32, width: u32) -> DeviceHints {
        DeviceHints {
            user_agent: ua.to_string(),
            max_touch_points: touch,
            viewport_width: width,
        }
    }

    #[test]
    fn mobile_detection_rules() {
        let desktop = "Mozilla/5.0 (X11; Linux x86_64)";
        assert!(detect_mobile(&hints("Mozilla/5.0 (iPhone; CPU iPhone OS)", 0, 0), 768));
        assert!(detect_mobile(&hints("Mozilla/5.0 (Linux; Android 14)", 0, 1920), 768));
        assert!(detect_mobile(&hints(desktop, 5, 1000), 768));
        assert!(detect_mobile(&hints(desktop, 0, 500), 768));
        assert!(!detect_mobile(&hints(desktop, 5, 1920), 768));
        assert!(!detect_mobile(&hints(desktop, 0, 1280), 768));
        assert!(!detect_mobile(&DeviceHints::default(), 768));
    }

    #[test]
    fn controls_hide_only_while_playing() {
        let t0 = Instant::now();
        let mut bridge = UiBridge::new(&ControlsConfig::default(), &DeviceHints::default(), t0);
        let later = t0 + Duration::from_millis(3000);

        assert_eq!(bridge.sync(later, false), None);
        assert!(bridge.state().controls_visible);

        assert_eq!(bridge.sync(t0 + Duration::from_millis(2999), true), None);
        assert_eq!(bridge.sync(later, true), Some(false));
        assert!(!bridge.state().controls_visible);

        assert_eq!(bridge.touch(later), Some(true));
        assert_eq!(bridge.hide_deadline(), later + Duration::from_millis(3000));

        // Pausing brings them back even without activity.
        bridge.sync(later + Duration::from_secs(10), true);
        assert_eq!(bridge.sync(later + Duration::from_secs(10), false), Some(true));
    }

    #[test]
    fn fullscreen_flag_reports_changes() {
        let mut bridge =
            UiBridge::new(&ControlsConfig::default(), &DeviceHints::default(), Instant::now());
        assert!(bridge.set_fullscreen(true));
        assert!(!bridge.set_fullscreen(true));
        assert!(bridge.state().is_fullscreen);
    }
}
