//! Fullscreen requests.
//!
//! Hosts differ in which fullscreen API they expose, so a request walks the
//! standard API and then the vendor-prefixed ones, first for the whole document
//! and then for the player element. The fullscreen flag is never inferred from
//! a request succeeding: it only changes when the host reports a
//! `fullscreenchange` (or prefixed equivalent) notification.

use serde::Serialize;
use thiserror::Error;

use crate::host::HostDocument;

/// Fullscreen API flavours, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FullscreenApi {
    Standard,
    Webkit,
    Moz,
    Ms,
}

impl FullscreenApi {
    pub const ORDER: [Self; 4] = [Self::Standard, Self::Webkit, Self::Moz, Self::Ms];

    pub fn request_method(self) -> &'static str {
        match self {
            Self::Standard => "requestFullscreen",
            Self::Webkit => "webkitRequestFullscreen",
            Self::Moz => "mozRequestFullScreen",
            Self::Ms => "msRequestFullscreen",
        }
    }

    pub fn exit_method(self) -> &'static str {
        match self {
            Self::Standard => "exitFullscreen",
            Self::Webkit => "webkitExitFullscreen",
            Self::Moz => "mozCancelFullScreen",
            Self::Ms => "msExitFullscreen",
        }
    }
}

/// What a fullscreen request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FullscreenScope {
    /// The whole document.
    Document,
    /// The player element only.
    Player,
}

impl FullscreenScope {
    pub const ORDER: [Self; 2] = [Self::Document, Self::Player];
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FullscreenError {
    /// The host exposes no usable fullscreen API.
    #[error("fullscreen not supported by host")]
    Unsupported,

    /// The host rejected the request (e.g. not triggered by a user gesture).
    #[error("fullscreen request rejected: {0}")]
    Rejected(String),
}

/// Tracks the fullscreen flag and issues requests against a host.
#[derive(Debug, Default)]
pub struct FullscreenController {
    is_fullscreen: bool,
}

impl FullscreenController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fullscreen(&self) -> bool {
        self.is_fullscreen
    }

    /// Records a host change notification. Returns `true` if the flag changed.
    pub fn on_change(&mut self, is_fullscreen: bool) -> bool {
        let changed = self.is_fullscreen != is_fullscreen;
        self.is_fullscreen = is_fullscreen;
        changed
    }

    /// Requests fullscreen, or exits it when the host last reported fullscreen.
    ///
    /// The flag itself is left alone; it follows [`Self::on_change`].
    pub fn toggle(&self, host: &dyn HostDocument) -> Result<(), FullscreenError> {
        if self.is_fullscreen {
            self.exit(host).map(|_| ())
        } else {
            self.request(host).map(|_| ())
        }
    }

    /// Tries every scope and API in order; returns the first combination the
    /// host accepted.
    ///
    /// # Errors
    ///
    /// The last rejection if the host rejected every attempt, otherwise
    /// [`FullscreenError::Unsupported`].
    pub fn request(
        &self,
        host: &dyn HostDocument,
    ) -> Result<(FullscreenScope, FullscreenApi), FullscreenError> {
        let mut last = FullscreenError::Unsupported;
        for scope in FullscreenScope::ORDER {
            for api in FullscreenApi::ORDER {
                match host.request_fullscreen(scope, api) {
                    Ok(()) => {
                        log::debug!(
                            "[Surface] Fullscreen requested via {} on {:?}",
                            api.request_method(),
                            scope
                        );
                        return Ok((scope, api));
                    }
                    Err(FullscreenError::Unsupported) => {}
                    Err(e) => last = e,
                }
            }
        }
        Err(last)
    }

    /// Tries every exit API in order.
    ///
    /// # Errors
    ///
    /// As for [`Self::request`].
    pub fn exit(&self, host: &dyn HostDocument) -> Result<FullscreenApi, FullscreenError> {
        let mut last = FullscreenError::Unsupported;
        for api in FullscreenApi::ORDER {
            match host.exit_fullscreen(api) {
                Ok(()) => {
                    log::debug!("[Surface] Fullscreen exit via {}", api.exit_method());
                    return Ok(api);
                }
                Err(FullscreenError::Unsupported) => {}
                Err(e) => last = e,
            }
        }
        Err(last)
    }
}
