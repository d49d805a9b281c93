//! Terminal host.
//!
//! Stands in for the document that would host the player: stdin lines become
//! key presses or commands, and fullscreen requests are accepted through the
//! standard API only. The terminal cannot actually go fullscreen, so the change
//! notification is typed in by hand (`fs on` / `fs off`).

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tandem_core::surface::{FullscreenApi, FullscreenError, FullscreenScope};
use tandem_core::{DeviceHints, HostDocument};

pub struct ConsoleHost {
    hints: Mutex<DeviceHints>,
    typing: AtomicBool,
}

impl ConsoleHost {
    pub fn new(hints: DeviceHints) -> Self {
        Self {
            hints: Mutex::new(hints),
            typing: AtomicBool::new(false),
        }
    }

    /// Simulates focus entering or leaving a text field.
    pub fn set_typing(&self, typing: bool) {
        self.typing.store(typing, Ordering::Relaxed);
    }

    /// Simulates the viewport being resized.
    pub fn set_viewport_width(&self, width: u32) {
        self.hints.lock().viewport_width = width;
    }
}

impl HostDocument for ConsoleHost {
    fn text_input_focused(&self) -> bool {
        self.typing.load(Ordering::Relaxed)
    }

    fn request_fullscreen(
        &self,
        scope: FullscreenScope,
        api: FullscreenApi,
    ) -> Result<(), FullscreenError> {
        if api != FullscreenApi::Standard {
            return Err(FullscreenError::Unsupported);
        }
        log::info!("[Console] {} on {:?}; confirm with `fs on`", api.request_method(), scope);
        Ok(())
    }

    fn exit_fullscreen(&self, api: FullscreenApi) -> Result<(), FullscreenError> {
        if api != FullscreenApi::Standard {
            return Err(FullscreenError::Unsupported);
        }
        log::info!("[Console] {}; confirm with `fs off`", api.exit_method());
        Ok(())
    }

    fn device_hints(&self) -> DeviceHints {
        self.hints.lock().clone()
    }
}

/// One parsed stdin line.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// A key name for the shortcut table.
    Key(String),
    Play,
    Pause,
    Restart,
    Volume(u8),
    /// Seek to a played fraction (0-1).
    Seek(f64),
    Load(String),
    /// Host fullscreen change notification.
    Fullscreen(bool),
    Typing(bool),
    /// New viewport width in CSS pixels.
    Resize(u32),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
keys:     space/k play-pause, f fullscreen, m mute, left/j right/l seek, , . frame step
commands: play | pause | restart | vol N | seek F | load ID | fs on|off | type on|off
          resize W | status | help | quit";

fn on_off(word: Option<&str>) -> Result<bool, String> {
    match word {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        other => Err(format!("expected on|off, got {:?}", other.unwrap_or(""))),
    }
}

/// Parses a line. `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<Input>, String> {
    // A lone space is the play/pause key, so only trim the line ending.
    let raw = line.trim_end_matches(['\r', '\n']);
    if raw == " " {
        return Ok(Some(Input::Key(" ".to_string())));
    }
    let mut words = raw.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();

    let input = match head {
        "play" => Input::Play,
        "pause" => Input::Pause,
        "restart" => Input::Restart,
        "status" => Input::Status,
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        "vol" => {
            let level = arg
                .and_then(|v| v.parse::<u8>().ok())
                .filter(|v| *v <= 100)
                .ok_or("usage: vol 0-100")?;
            Input::Volume(level)
        }
        "seek" => {
            let fraction = arg
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| (0.0..=1.0).contains(v))
                .ok_or("usage: seek 0.0-1.0")?;
            Input::Seek(fraction)
        }
        "load" => Input::Load(arg.ok_or("usage: load ID")?.to_string()),
        "fs" => Input::Fullscreen(on_off(arg)?),
        "type" => Input::Typing(on_off(arg)?),
        "resize" => {
            let width = arg
                .and_then(|v| v.parse::<u32>().ok())
                .ok_or("usage: resize WIDTH")?;
            Input::Resize(width)
        }
        "space" => Input::Key(" ".to_string()),
        "left" => Input::Key("ArrowLeft".to_string()),
        "right" => Input::Key("ArrowRight".to_string()),
        key => Input::Key(key.to_string()),
    };
    Ok(Some(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_keys() {
        assert_eq!(parse_line("vol 40\n"), Ok(Some(Input::Volume(40))));
        assert_eq!(parse_line("seek 0.5"), Ok(Some(Input::Seek(0.5))));
        assert_eq!(parse_line("load abc"), Ok(Some(Input::Load("abc".into()))));
        assert_eq!(parse_line("fs on"), Ok(Some(Input::Fullscreen(true))));
        assert_eq!(parse_line("resize 390"), Ok(Some(Input::Resize(390))));
        assert_eq!(parse_line(" \n"), Ok(Some(Input::Key(" ".into()))));
        assert_eq!(parse_line("left"), Ok(Some(Input::Key("ArrowLeft".into()))));
        assert_eq!(parse_line("k"), Ok(Some(Input::Key("k".into()))));
        assert_eq!(parse_line(""), Ok(None));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_line("vol 101").is_err());
        assert!(parse_line("seek 2").is_err());
        assert!(parse_line("fs maybe").is_err());
        assert!(parse_line("load").is_err());
        assert!(parse_line("resize wide").is_err());
    }

    #[test]
    fn host_accepts_standard_api_only() {
        let host = ConsoleHost::new(DeviceHints::default());
        assert_eq!(
            host.request_fullscreen(FullscreenScope::Document, FullscreenApi::Webkit),
            Err(FullscreenError::Unsupported)
        );
        assert!(host
            .request_fullscreen(FullscreenScope::Document, FullscreenApi::Standard)
            .is_ok());

        host.set_typing(true);
        assert!(host.text_input_focused());

        host.set_viewport_width(390);
        assert_eq!(host.device_hints().viewport_width, 390);
    }
}
