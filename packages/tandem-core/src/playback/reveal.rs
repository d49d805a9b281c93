//! Reveal sequencer.
//!
//! Choreographs the way out of hidden sync so that no sound or visual jump is
//! perceptible. Once armed by the first `Playing` event under the mask:
//!
//! ```text
//! arm ──warmup──▶ Warmup ──settle──▶ Settle ──┬─pulse[0]─▶ VolumePulse(0)
//!                 (silent re-seek)   (unmute, │ ...
//!                                    fade)    ├─pulse[n]─▶ VolumePulse(n)
//!                                             └─reveal───▶ Reveal
//!                                                          (Playing, follower)
//! ```
//!
//! Every step is scheduled relative to the due time of the step that produced
//! it, so a late poll does not stretch the choreography. The sequencer itself
//! only keeps time; the session performs the side effects of each step.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::RevealConfig;
use crate::error::{TandemError, TandemResult};

/// A named step of the reveal choreography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", content = "index", rename_all = "camelCase")]
pub enum RevealStep {
    /// Warm-up elapsed: silently re-seek the leader to the capture point.
    Warmup,
    /// Settle elapsed: restore audio and start the mask fade.
    Settle,
    /// Re-assert the target volume (n-th pulse).
    VolumePulse(usize),
    /// Flip to `Playing` and start the follower.
    Reveal,
}

/// Which step is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SequencePhase {
    Idle,
    WarmingUp,
    Settling,
    Revealing,
    /// Revealed; only volume pulses remain.
    Restoring,
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    due: Instant,
    /// Insertion order, to keep ties stable.
    seq: u64,
    epoch: u64,
    step: RevealStep,
}

/// Explicit, cancellable reveal choreography.
#[derive(Debug)]
pub struct RevealSequencer {
    warmup: Duration,
    settle: Duration,
    reveal: Duration,
    pulses: Vec<Duration>,
    epoch: u64,
    next_seq: u64,
    phase: SequencePhase,
    pending: Vec<Scheduled>,
}

impl RevealSequencer {
    pub fn new(config: &RevealConfig) -> Self {
        Self {
            warmup: config.warmup(),
            settle: config.settle(),
            reveal: config.reveal(),
            pulses: config.pulses(),
            epoch: 0,
            next_seq: 0,
            phase: SequencePhase::Idle,
            pending: Vec::new(),
        }
    }

    pub fn phase(&self) -> SequencePhase {
        self.phase
    }

    /// Identifies the current sequence; bumped by every cancel.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether a hidden wait is scheduled (warm-up, settle or reveal pending).
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.phase,
            SequencePhase::WarmingUp | SequencePhase::Settling | SequencePhase::Revealing
        )
    }

    pub fn pending_steps(&self) -> usize {
        self.pending.len()
    }

    /// Starts a sequence whose warm-up begins at `now`.
    ///
    /// Leftover volume pulses from a completed sequence are dropped first.
    ///
    /// # Errors
    ///
    /// Returns [`TandemError::SequenceInFlight`] if a sequence is already
    /// waiting to reveal; arming twice is illegal, not merely skipped.
    pub fn arm(&mut self, now: Instant) -> TandemResult<u64> {
        if self.is_in_flight() {
            return Err(TandemError::SequenceInFlight);
        }
        if !self.pending.is_empty() {
            self.cancel();
        }
        self.schedule(now + self.warmup, RevealStep::Warmup);
        self.phase = SequencePhase::WarmingUp;
        log::debug!(
            "[Reveal] Armed sequence {} (warmup {}ms)",
            self.epoch,
            self.warmup.as_millis()
        );
        Ok(self.epoch)
    }

    /// Drops every pending step and invalidates the current sequence.
    ///
    /// Returns how many steps were dropped.
    pub fn cancel(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.epoch += 1;
        if self.phase != SequencePhase::Idle || dropped > 0 {
            log::debug!(
                "[Reveal] Cancelled in {:?}, dropped {} pending steps",
                self.phase,
                dropped
            );
        }
        self.phase = SequencePhase::Idle;
        dropped
    }

    /// Earliest pending due time.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|s| s.due).min()
    }

    /// Pops every step due at `now`, in due order, scheduling follow-up steps
    /// as it goes.
    pub fn poll(&mut self, now: Instant) -> Vec<RevealStep> {
        let mut fired = Vec::new();

        while let Some(index) = self.earliest_due(now) {
            let entry = self.pending.swap_remove(index);
            if entry.epoch != self.epoch {
                continue;
            }
            self.advance(entry);
            fired.push(entry.step);
        }

        fired
    }

    fn earliest_due(&self, now: Instant) -> Option<usize> {
        self.pending
            .iter()
            .enumerate()
            .filter(|(_, s)| s.due <= now)
            .min_by_key(|(_, s)| (s.due, s.seq))
            .map(|(i, _)| i)
    }

    fn advance(&mut self, entry: Scheduled) {
        match entry.step {
            RevealStep::Warmup => {
                self.schedule(entry.due + self.settle, RevealStep::Settle);
                self.phase = SequencePhase::Settling;
            }
            RevealStep::Settle => {
                let pulses = self.pulses.clone();
                for (i, offset) in pulses.into_iter().enumerate() {
                    self.schedule(entry.due + offset, RevealStep::VolumePulse(i));
                }
                self.schedule(entry.due + self.reveal, RevealStep::Reveal);
                self.phase = SequencePhase::Revealing;
            }
            RevealStep::Reveal => {
                self.phase = if self.pending.is_empty() {
                    SequencePhase::Idle
                } else {
                    SequencePhase::Restoring
                };
            }
            RevealStep::VolumePulse(_) => {
                if self.phase == SequencePhase::Restoring && self.pending.is_empty() {
                    self.phase = SequencePhase::Idle;
                }
            }
        }
    }

    fn schedule(&mut self, due: Instant, step: RevealStep) {
        self.pending.push(Scheduled {
            due,
            seq: self.next_seq,
            epoch: self.epoch,
            step,
        });
        self.next_seq += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn sequencer() -> RevealSequencer {
        RevealSequencer::new(&RevealConfig::default())
    }

    #[test]
    fn runs_full_choreography_in_order() {
        let mut seq = sequencer();
        let t0 = Instant::now();
        seq.arm(t0).expect("first arm");

        assert!(seq.poll(t0 + ms(3799)).is_empty());
        assert_eq!(seq.poll(t0 + ms(3800)), vec![RevealStep::Warmup]);
        assert_eq!(seq.phase(), SequencePhase::Settling);

        // settle at 3950; pulses at +100/+500; reveal at +800 (4750)
        assert_eq!(seq.poll(t0 + ms(3950)), vec![RevealStep::Settle]);
        assert_eq!(
            seq.poll(t0 + ms(4750)),
            vec![
                RevealStep::VolumePulse(0),
                RevealStep::VolumePulse(1),
                RevealStep::Reveal
            ]
        );
        assert_eq!(seq.phase(), SequencePhase::Restoring);
        assert!(!seq.is_in_flight());

        assert_eq!(
            seq.poll(t0 + ms(3950 + 3000)),
            vec![RevealStep::VolumePulse(2), RevealStep::VolumePulse(3)]
        );
        assert_eq!(seq.phase(), SequencePhase::Idle);
        assert_eq!(seq.next_deadline(), None);
    }

    #[test]
    fn late_poll_fires_whole_chain_without_stretching() {
        let mut seq = sequencer();
        let t0 = Instant::now();
        seq.arm(t0).unwrap();

        let fired = seq.poll(t0 + ms(10_000));
        assert_eq!(fired.first(), Some(&RevealStep::Warmup));
        assert_eq!(fired.get(1), Some(&RevealStep::Settle));
        assert!(fired.contains(&RevealStep::Reveal));
        assert_eq!(fired.len(), 2 + 4 + 1);
    }

    #[test]
    fn second_arm_while_pending_is_illegal() {
        let mut seq = sequencer();
        let t0 = Instant::now();
        seq.arm(t0).unwrap();

        let err = seq.arm(t0 + ms(100)).unwrap_err();
        assert!(matches!(err, TandemError::SequenceInFlight));
        assert_eq!(seq.pending_steps(), 1);
        assert_eq!(seq.next_deadline(), Some(t0 + ms(3800)));
    }

    #[test]
    fn cancel_drops_everything_and_bumps_epoch() {
        let mut seq = sequencer();
        let t0 = Instant::now();
        let epoch = seq.arm(t0).unwrap();
        seq.poll(t0 + ms(3800));

        assert_eq!(seq.cancel(), 1);
        assert!(seq.epoch() > epoch);
        assert_eq!(seq.phase(), SequencePhase::Idle);
        assert!(seq.poll(t0 + ms(60_000)).is_empty());
    }

    #[test]
    fn arming_during_restoring_drops_old_pulses() {
        let mut seq = sequencer();
        let t0 = Instant::now();
        seq.arm(t0).unwrap();
        seq.poll(t0 + ms(4750));
        assert_eq!(seq.phase(), SequencePhase::Restoring);

        let t1 = t0 + ms(5000);
        seq.arm(t1).expect("restoring does not block a new sequence");
        assert_eq!(seq.pending_steps(), 1);
        assert_eq!(seq.next_deadline(), Some(t1 + ms(3800)));
    }
}
