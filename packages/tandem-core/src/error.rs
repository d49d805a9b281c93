//! Centralized error types for the tandem core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Gives every error a machine-readable code for hosts and logs
//! - Converts leaf errors (provider, fullscreen) into [`TandemError`]

use serde::Serialize;
use thiserror::Error;

use crate::playback::PlaybackState;
use crate::provider::ProviderError;
use crate::surface::fullscreen::FullscreenError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for ProviderError {
    fn code(&self) -> &'static str {
        match self {
            Self::Construction(_) => "provider_construction_failed",
            Self::Teardown(_) => "provider_teardown_failed",
            Self::Unavailable => "provider_unavailable",
        }
    }
}

impl ErrorCode for FullscreenError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unsupported => "fullscreen_unsupported",
            Self::Rejected(_) => "fullscreen_rejected",
        }
    }
}

/// Crate-wide error type for playback sessions and their control surface.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum TandemError {
    /// A control was used before the transport could answer.
    #[error("Transport not ready")]
    NotReady,

    /// The session hit a fatal provider error and accepts no transport calls
    /// until it is recreated.
    #[error("Session terminated")]
    Terminated,

    /// The state machine rejected a transition.
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: PlaybackState,
        to: PlaybackState,
    },

    /// A reveal sequence is already pending for this session.
    #[error("Reveal sequence already in flight")]
    SequenceInFlight,

    /// The operation needs a mounted stream identifier.
    #[error("No stream mounted")]
    NoStream,

    /// The session driver task has stopped.
    #[error("Session closed")]
    SessionClosed,

    /// Provider-side failure surfaced to a caller.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Fullscreen request failed.
    #[error("Fullscreen error: {0}")]
    Fullscreen(String),

    /// Configuration rejected by validation.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TandemError {
    /// Returns a machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::Terminated => "terminated",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::SequenceInFlight => "sequence_in_flight",
            Self::NoStream => "no_stream",
            Self::SessionClosed => "session_closed",
            Self::Provider(_) => "provider_error",
            Self::Fullscreen(_) => "fullscreen_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Whether this error means the control was merely disabled, as opposed to
    /// something having gone wrong.
    pub fn is_gated(&self) -> bool {
        matches!(self, Self::NotReady | Self::Terminated | Self::NoStream)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Type Aliases
// ─────────────────────────────────────────────────────────────────────────────

/// Convenient Result alias for crate-wide operations.
pub type TandemResult<T> = Result<T, TandemError>;

impl From<ProviderError> for TandemError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err.to_string())
    }
}

impl From<FullscreenError> for TandemError {
    fn from(err: FullscreenError) -> Self {
        Self::Fullscreen(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gated_errors_are_flagged() {
        assert!(TandemError::NotReady.is_gated());
        assert!(TandemError::Terminated.is_gated());
        assert!(!TandemError::SequenceInFlight.is_gated());
    }

    #[test]
    fn invalid_transition_returns_correct_code() {
        let err = TandemError::InvalidTransition {
            from: PlaybackState::Idle,
            to: PlaybackState::Playing,
        };
        assert_eq!(err.code(), "invalid_transition");
        assert!(err.to_string().contains("Idle"));
    }

    #[test]
    fn leaf_errors_convert_with_message() {
        let err: TandemError = ProviderError::Construction("no mount".into()).into();
        assert_eq!(err.code(), "provider_error");
        assert!(err.to_string().contains("no mount"));

        let fs = FullscreenError::Rejected("permission".into());
        assert_eq!(fs.code(), "fullscreen_rejected");
        let err: TandemError = fs.into();
        assert_eq!(err.code(), "fullscreen_error");
    }
}
