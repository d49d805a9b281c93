//! Drift corrector and progress sampling.
//!
//! Runs on a fixed cadence while the leader is ready:
//! 1. Publishes `played = leader_time / duration` for the progress bar. This
//!    keeps running under the mask, so the bar advances during hidden sync.
//! 2. Compares the follower against the leader and nudges it:
//!    - `|drift| > hard threshold` → hard seek to the leader position (a seek
//!      or a buffering stall, not something rate nudging can fix)
//!    - `dead zone < |drift| <= hard threshold` → damped seek to
//!      `follower + drift * gain`
//!    - `|drift| <= dead zone` → nothing, to avoid oscillation
//! 3. Mirrors the leader's playback rate onto the follower.
//!
//! The follower sits under a heavy blur, so it only has to look right; a damped
//! correction avoids visible seek artifacts and the hard threshold keeps drift
//! from accumulating without bound.

use serde::Serialize;

use crate::config::DriftConfig;
use crate::utils::played_fraction;

use super::handle::StreamHandle;

/// Correction decided for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DriftCorrection {
    /// Within the dead zone.
    None,
    /// Damped seek of the follower.
    Soft { target: f64 },
    /// Follower re-seeked to the leader position.
    Hard { target: f64 },
}

impl DriftCorrection {
    /// Follower seek target, if any.
    pub fn target(&self) -> Option<f64> {
        match self {
            Self::None => None,
            Self::Soft { target } | Self::Hard { target } => Some(*target),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Soft { .. } => "soft",
            Self::Hard { .. } => "hard",
        }
    }
}

/// Decides how to correct a follower at `follower_time` against a leader at
/// `leader_time`.
pub fn assess(policy: &DriftConfig, leader_time: f64, follower_time: f64) -> DriftCorrection {
    let drift = leader_time - follower_time;
    let magnitude = drift.abs();

    if magnitude > policy.hard_threshold_secs {
        DriftCorrection::Hard {
            target: leader_time,
        }
    } else if magnitude > policy.dead_zone_secs {
        DriftCorrection::Soft {
            target: follower_time + drift * policy.correction_gain,
        }
    } else {
        DriftCorrection::None
    }
}

/// One sampling pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub leader_time: f64,
    pub duration: f64,
    /// `leader_time / duration`, when the duration is known.
    pub played: Option<f64>,
    /// Buffered fraction reported by the leader.
    pub buffered: f64,
    /// `leader_time - follower_time`, when the follower was sampled.
    pub drift: Option<f64>,
    pub correction: DriftCorrection,
}

/// Periodic sampler that keeps the follower in step with the leader.
#[derive(Debug)]
pub struct DriftCorrector {
    policy: DriftConfig,
    suspended: bool,
    last_mirrored_rate: Option<f64>,
}

impl DriftCorrector {
    pub fn new(policy: DriftConfig) -> Self {
        Self {
            policy,
            suspended: false,
            last_mirrored_rate: None,
        }
    }

    pub fn policy(&self) -> &DriftConfig {
        &self.policy
    }

    /// Stops sampling, e.g. for the duration of a seek drag.
    pub fn suspend(&mut self) {
        if !self.suspended {
            log::trace!("[Drift] Suspended");
        }
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        if self.suspended {
            log::trace!("[Drift] Resumed");
        }
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Forgets per-pair state; used when the handle pair is replaced.
    pub fn reset(&mut self) {
        self.suspended = false;
        self.last_mirrored_rate = None;
    }

    /// Samples the leader and, if given, corrects the follower.
    ///
    /// Returns `None` while suspended or while the leader is not ready.
    pub fn tick(
        &mut self,
        leader: &mut StreamHandle,
        follower: Option<&mut StreamHandle>,
    ) -> Option<ProgressSample> {
        if self.suspended || !leader.is_ready() {
            return None;
        }

        let leader_time = leader.current_time();
        let duration = leader.duration();
        let mut sample = ProgressSample {
            leader_time,
            duration,
            played: played_fraction(leader_time, duration),
            buffered: leader.loaded_fraction(),
            drift: None,
            correction: DriftCorrection::None,
        };

        let Some(follower) = follower.filter(|f| f.is_ready()) else {
            return Some(sample);
        };

        let follower_time = follower.current_time();
        let correction = assess(&self.policy, leader_time, follower_time);
        sample.drift = Some(leader_time - follower_time);
        sample.correction = correction;

        if let Some(target) = correction.target() {
            log::trace!(
                "[Drift] {} correction: leader={:.3}s follower={:.3}s target={:.3}s",
                correction.label(),
                leader_time,
                follower_time,
                target
            );
            follower.seek_to(target);
        }

        if let Some(rate) = leader.playback_rate() {
            if self.last_mirrored_rate != Some(rate) {
                follower.set_playback_rate(rate);
                self.last_mirrored_rate = Some(rate);
            }
        }

        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::simulated::{SimCall, SimulatedProvider};
    use crate::provider::{PlayerOptions, ProviderEventSink, ProviderFactory, StreamRole};
    use tokio::sync::mpsc;

    fn policy() -> DriftConfig {
        DriftConfig::default()
    }

    fn ready_handle(provider: &SimulatedProvider, role: StreamRole) -> StreamHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sink = ProviderEventSink::new(tx, 1, role);
        let player = provider
            .create(role.mount_point(), "abc", &PlayerOptions::cued(0.0), sink)
            .expect("create should succeed");
        let mut handle = StreamHandle::new(role, player);
        handle.mark_ready();
        handle
    }

    #[test]
    fn dead_zone_makes_no_correction() {
        for drift in [0.0, 0.05, 0.12, -0.12, -0.01] {
            assert_eq!(
                assess(&policy(), 10.0 + drift, 10.0),
                DriftCorrection::None,
                "drift {}",
                drift
            );
        }
    }

    #[test]
    fn moderate_drift_is_damped() {
        for drift in [0.13, 0.5, 0.75, -0.3, -0.75] {
            let leader = 20.0 + drift;
            match assess(&policy(), leader, 20.0) {
                DriftCorrection::Soft { target } => {
                    let expected = 20.0 + 0.35 * drift;
                    assert!((target - expected).abs() < 1e-9, "drift {}", drift);
                }
                other => panic!("drift {} gave {:?}", drift, other),
            }
        }
    }

    #[test]
    fn large_drift_snaps_to_leader() {
        for drift in [0.76, 3.0, -0.76, -40.0] {
            let leader = 50.0 + drift;
            assert_eq!(
                assess(&policy(), leader, 50.0),
                DriftCorrection::Hard { target: leader },
                "drift {}",
                drift
            );
        }
    }

    #[test]
    fn tick_publishes_progress_without_follower() {
        let provider = SimulatedProvider::new();
        let mut leader = ready_handle(&provider, StreamRole::Leader);
        provider.set_position(StreamRole::Leader, 75.0);
        provider.set_duration(StreamRole::Leader, 300.0);

        let mut corrector = DriftCorrector::new(policy());
        let sample = corrector.tick(&mut leader, None).expect("leader is ready");

        assert_eq!(sample.played, Some(0.25));
        assert_eq!(sample.drift, None);
        assert_eq!(sample.correction, DriftCorrection::None);
    }

    #[test]
    fn tick_seeks_follower_and_mirrors_rate_once() {
        let provider = SimulatedProvider::new();
        let mut leader = ready_handle(&provider, StreamRole::Leader);
        let mut follower = ready_handle(&provider, StreamRole::Follower);
        provider.set_position(StreamRole::Leader, 12.0);
        provider.set_position(StreamRole::Follower, 10.0);

        let mut corrector = DriftCorrector::new(policy());
        let sample = corrector
            .tick(&mut leader, Some(&mut follower))
            .expect("leader is ready");
        assert_eq!(sample.correction, DriftCorrection::Hard { target: 12.0 });

        corrector.tick(&mut leader, Some(&mut follower));

        let calls = provider.calls(StreamRole::Follower);
        assert_eq!(
            &calls[1..],
            &[SimCall::SeekTo(12.0), SimCall::SetPlaybackRate(1.0)]
        );
    }

    #[test]
    fn suspended_corrector_does_nothing() {
        let provider = SimulatedProvider::new();
        let mut leader = ready_handle(&provider, StreamRole::Leader);
        let mut follower = ready_handle(&provider, StreamRole::Follower);
        provider.set_position(StreamRole::Leader, 30.0);

        let mut corrector = DriftCorrector::new(policy());
        corrector.suspend();
        assert!(corrector.tick(&mut leader, Some(&mut follower)).is_none());

        corrector.resume();
        assert!(corrector.tick(&mut leader, Some(&mut follower)).is_some());
    }
}
