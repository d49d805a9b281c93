//! Session configuration.
//!
//! The reveal delays and drift thresholds are tuned against a specific
//! provider's startup latency, so every one of them is configurable. Defaults
//! match the values the choreography was tuned with.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{TandemError, TandemResult};

/// Drift corrector tuning.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DriftConfig {
    /// Sampling cadence of the progress/drift loop (milliseconds).
    pub interval_ms: u64,

    /// Drift at or below this (seconds) is left alone.
    pub dead_zone_secs: f64,

    /// Drift above this (seconds) triggers a hard re-seek of the follower.
    pub hard_threshold_secs: f64,

    /// Fraction of the drift applied by a soft correction.
    pub correction_gain: f64,
}

impl DriftConfig {
    /// Sampling cadence as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            dead_zone_secs: 0.12,
            hard_threshold_secs: 0.75,
            correction_gain: 0.35,
        }
    }
}

/// Reveal choreography timings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RevealConfig {
    /// Delay after the first `Playing` event before re-seeking (milliseconds).
    pub warmup_ms: u64,

    /// Delay after the silent re-seek before audio restoration (milliseconds).
    pub settle_ms: u64,

    /// Delay between the start of the mask fade and the state flip to
    /// `Playing` (milliseconds).
    pub reveal_ms: u64,

    /// Length of the mask fade transition (milliseconds). Presentation hint only.
    pub mask_fade_ms: u64,

    /// Offsets (milliseconds after the settle step) at which the target volume
    /// is re-asserted.
    pub volume_pulses_ms: Vec<u64>,

    /// Step below the target used to "move" a volume that reads back as zero.
    pub volume_nudge: u8,
}

impl RevealConfig {
    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn reveal(&self) -> Duration {
        Duration::from_millis(self.reveal_ms)
    }

    pub fn pulses(&self) -> Vec<Duration> {
        self.volume_pulses_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    /// Total time from the first `Playing` event until the state flips to
    /// `Playing`.
    pub fn time_to_reveal(&self) -> Duration {
        self.warmup() + self.settle() + self.reveal()
    }
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            warmup_ms: 3800,
            settle_ms: 150,
            reveal_ms: 800,
            mask_fade_ms: 300,
            volume_pulses_ms: vec![100, 500, 1500, 3000],
            volume_nudge: 2,
        }
    }
}

/// Control surface and UI bridge tuning.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ControlsConfig {
    /// Relative seek step for the arrow/`j`/`l` shortcuts (seconds).
    pub seek_step_secs: f64,

    /// Frame step for the `,`/`.` shortcuts (seconds).
    pub frame_step_secs: f64,

    /// Inactivity before controls hide while playing (milliseconds).
    pub controls_hide_ms: u64,

    /// Viewport width below which the host counts as mobile (CSS pixels).
    pub mobile_breakpoint_px: u32,
}

impl ControlsConfig {
    pub fn controls_hide(&self) -> Duration {
        Duration::from_millis(self.controls_hide_ms)
    }
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            seek_step_secs: 5.0,
            frame_step_secs: 1.0 / 24.0,
            controls_hide_ms: 3000,
            mobile_breakpoint_px: 768,
        }
    }
}

/// Configuration for a playback session.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Drift corrector tuning.
    pub drift: DriftConfig,

    /// Reveal choreography timings.
    pub reveal: RevealConfig,

    /// Control surface tuning.
    pub controls: ControlsConfig,

    /// Create the muted, blurred follower stream.
    pub ambient_layer: bool,

    /// UI volume (0-100) a new session starts with.
    pub initial_volume: u8,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drift: DriftConfig::default(),
            reveal: RevealConfig::default(),
            controls: ControlsConfig::default(),
            ambient_layer: true,
            initial_volume: 100,
        }
    }
}

impl SyncConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::Configuration`] if any value would cause runtime issues.
    pub fn validate(&self) -> TandemResult<()> {
        let invalid = |msg: &str| Err(TandemError::Configuration(msg.to_string()));

        if self.drift.interval_ms == 0 {
            return invalid("drift.interval_ms must be >= 1 (tokio interval panics on 0)");
        }
        let drift = &self.drift;
        if !drift.dead_zone_secs.is_finite() || drift.dead_zone_secs < 0.0 {
            return invalid("drift.dead_zone_secs must be >= 0");
        }
        if !positive(drift.hard_threshold_secs) || drift.dead_zone_secs >= drift.hard_threshold_secs
        {
            return invalid("drift.dead_zone_secs must be below drift.hard_threshold_secs");
        }
        if !positive(drift.correction_gain) || drift.correction_gain > 1.0 {
            return invalid("drift.correction_gain must be in (0, 1]");
        }
        if !positive(self.controls.seek_step_secs) {
            return invalid("controls.seek_step_secs must be > 0");
        }
        if !positive(self.controls.frame_step_secs) {
            return invalid("controls.frame_step_secs must be > 0");
        }
        if self.initial_volume > 100 {
            return invalid("initial_volume must be <= 100");
        }
        if self.reveal.volume_nudge > 100 {
            return invalid("reveal.volume_nudge must be <= 100");
        }
        Ok(())
    }
}

/// Finite and strictly positive.
fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
