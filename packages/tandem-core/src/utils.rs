//! General utilities shared across the crate.

use std::time::{SystemTime, UNIX_EPOCH};

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Position Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns `position / duration` clamped to `0.0..=1.0`.
///
/// Returns `None` when the duration is not yet known (zero, negative or NaN),
/// so callers can keep the previous fraction instead of snapping to zero.
#[must_use]
pub fn played_fraction(position: f64, duration: f64) -> Option<f64> {
    if duration.is_nan() || duration <= 0.0 {
        return None;
    }
    Some((position / duration).clamp(0.0, 1.0))
}

/// Clamps a fraction supplied by a caller (e.g. a seek bar) to `0.0..=1.0`.
///
/// NaN is treated as 0.
#[must_use]
pub fn clamp_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn played_fraction_requires_known_duration() {
        assert_eq!(played_fraction(10.0, 0.0), None);
        assert_eq!(played_fraction(10.0, f64::NAN), None);
        assert_eq!(played_fraction(30.0, 120.0), Some(0.25));
    }

    #[test]
    fn played_fraction_is_clamped() {
        assert_eq!(played_fraction(130.0, 120.0), Some(1.0));
        assert_eq!(played_fraction(-1.0, 120.0), Some(0.0));
    }

    #[test]
    fn clamp_fraction_handles_nan() {
        assert_eq!(clamp_fraction(f64::NAN), 0.0);
        assert_eq!(clamp_fraction(1.5), 1.0);
        assert_eq!(clamp_fraction(0.4), 0.4);
    }
}
