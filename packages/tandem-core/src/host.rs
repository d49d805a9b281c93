//! Host document capability.
//!
//! The control surface needs three things from whatever hosts the player:
//! whether a text input has focus (so shortcuts stay out of the way), a way to
//! ask for fullscreen, and some hints about the device. Change notifications
//! flow the other way, through
//! [`ControlSurface::on_fullscreen_change`](crate::surface::ControlSurface::on_fullscreen_change).

use crate::surface::fullscreen::{FullscreenApi, FullscreenError, FullscreenScope};
use crate::ui::DeviceHints;

/// Capabilities of the document hosting the player.
///
/// Every method has a conservative default, so a host only overrides what it
/// actually supports.
pub trait HostDocument: Send + Sync {
    /// Whether a text-input element currently has focus.
    fn text_input_focused(&self) -> bool {
        false
    }

    /// Asks for fullscreen on `scope` through `api`.
    fn request_fullscreen(
        &self,
        _scope: FullscreenScope,
        _api: FullscreenApi,
    ) -> Result<(), FullscreenError> {
        Err(FullscreenError::Unsupported)
    }

    /// Leaves fullscreen through `api`.
    fn exit_fullscreen(&self, _api: FullscreenApi) -> Result<(), FullscreenError> {
        Err(FullscreenError::Unsupported)
    }

    fn device_hints(&self) -> DeviceHints {
        DeviceHints::default()
    }
}

/// Host with no document: no focus, no fullscreen, desktop-sized.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessHost;

impl HostDocument for HeadlessHost {}
