//! Simulator configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tandem_core::provider::simulated::SimulatedBehavior;
use tandem_core::{DeviceHints, SyncConfig};

/// Simulator configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Stream identifier mounted at startup.
    /// Override: `TANDEM_STREAM_ID`
    pub stream_id: String,

    /// Position (seconds) to resume from.
    pub resume_from: Option<f64>,

    /// Ask for playback straight away instead of stopping in ready-paused.
    pub autoplay: bool,

    /// Time from player construction to `ready` (milliseconds).
    /// Override: `TANDEM_STARTUP_LATENCY_MS`
    pub startup_latency_ms: u64,

    /// Time from `play`/`seek` to `Playing` (milliseconds).
    pub buffering_latency_ms: u64,

    /// Simulated stream length (seconds).
    pub duration_secs: f64,

    /// Clock multiplier for the follower, so drift correction has something
    /// to do. 1.0 keeps both players in step.
    pub follower_clock_skew: f64,

    /// How often a snapshot is printed (milliseconds).
    pub report_interval_ms: u64,

    /// User agent reported to the session's mobile detection.
    pub user_agent: String,

    /// Viewport width (CSS pixels) reported to mobile detection.
    pub viewport_width: u32,

    /// Session tuning. `reveal.warmup_ms` can be overridden with
    /// `TANDEM_WARMUP_MS`.
    pub session: SyncConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            stream_id: "demo".to_string(),
            resume_from: None,
            autoplay: true,
            startup_latency_ms: 800,
            buffering_latency_ms: 300,
            duration_secs: 120.0,
            follower_clock_skew: 1.02,
            report_interval_ms: 1000,
            user_agent: "tandem-sim".to_string(),
            viewport_width: 1280,
            session: SyncConfig::default(),
        }
    }
}

impl SimConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TANDEM_STREAM_ID") {
            if !val.trim().is_empty() {
                self.stream_id = val.trim().to_string();
            }
        }

        if let Ok(val) = std::env::var("TANDEM_STARTUP_LATENCY_MS") {
            if let Ok(ms) = val.parse() {
                self.startup_latency_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("TANDEM_WARMUP_MS") {
            if let Ok(ms) = val.parse() {
                self.session.reveal.warmup_ms = ms;
            }
        }

        // Note: TANDEM_LOG_LEVEL is handled by clap via #[arg(env = ...)] in main.rs
    }

    pub fn leader_behavior(&self) -> SimulatedBehavior {
        SimulatedBehavior::realistic(
            Duration::from_millis(self.startup_latency_ms),
            Duration::from_millis(self.buffering_latency_ms),
            self.duration_secs,
        )
    }

    pub fn follower_behavior(&self) -> SimulatedBehavior {
        self.leader_behavior()
            .with_clock_skew(self.follower_clock_skew)
    }

    pub fn device_hints(&self) -> DeviceHints {
        DeviceHints {
            user_agent: self.user_agent.clone(),
            max_touch_points: 0,
            viewport_width: self.viewport_width,
        }
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms.max(50))
    }
}
