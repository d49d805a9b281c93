//! Volume mapping and the user's audio intent.

use serde::Serialize;

/// Maps a linear UI volume (0-100) onto the provider scale with a quadratic
/// curve, `(ui / 100)^2 * 100`, to track perceived loudness.
///
/// `0 -> 0`, `50 -> 25`, `100 -> 100`. Values above 100 are clamped.
#[must_use]
pub fn perceptual_volume(ui: u8) -> u8 {
    let linear = f64::from(ui.min(100)) / 100.0;
    (linear * linear * 100.0).round() as u8
}

/// Provider volumes to set, in order, to "move" a volume that reads back as
/// zero: one step below the target, then the target.
#[must_use]
pub fn nudge_sequence(target: u8, step: u8) -> [u8; 2] {
    [target.saturating_sub(step.max(1)), target]
}

/// What the user wants to hear, independent of what the leader is doing now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolumeIntent {
    /// UI scale (0-100).
    level: u8,
    muted: bool,
}

impl VolumeIntent {
    pub fn new(level: u8) -> Self {
        Self {
            level: level.min(100),
            muted: false,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Sets the UI level. A nonzero level also clears the muted intent.
    pub fn set_level(&mut self, level: u8) {
        self.level = level.min(100);
        if self.level > 0 {
            self.muted = false;
        }
    }

    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }

    /// Provider-scale volume to restore to.
    pub fn provider_volume(&self) -> u8 {
        perceptual_volume(self.level)
    }

    /// Whether restoring this intent should produce sound at all.
    pub fn is_audible(&self) -> bool {
        !self.muted && self.level > 0
    }
}

impl Default for VolumeIntent {
    fn default() -> Self {
        Self::new(100)
    }
}
