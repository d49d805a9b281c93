//! Keyboard shortcuts.
//!
//! | key                  | shortcut           |
//! |----------------------|--------------------|
//! | space, `k`           | play / pause       |
//! | `f`                  | fullscreen         |
//! | `m`                  | mute               |
//! | `←`, `j` / `→`, `l`  | seek back / ahead  |
//! | `,` / `.`            | frame back / ahead |
//!
//! Keys are matched on the host's key name (`"ArrowLeft"`, `" "`, `"k"`),
//! case-insensitively for letters.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Shortcut {
    TogglePlay,
    ToggleFullscreen,
    ToggleMute,
    SeekBackward,
    SeekForward,
    FrameBackward,
    FrameForward,
}

impl Shortcut {
    /// Maps a host key name to a shortcut.
    pub fn from_key(key: &str) -> Option<Self> {
        let shortcut = match key {
            " " | "Space" | "Spacebar" => Self::TogglePlay,
            "ArrowLeft" | "Left" => Self::SeekBackward,
            "ArrowRight" | "Right" => Self::SeekForward,
            "," => Self::FrameBackward,
            "." => Self::FrameForward,
            _ => match key.to_ascii_lowercase().as_str() {
                "k" => Self::TogglePlay,
                "f" => Self::ToggleFullscreen,
                "m" => Self::ToggleMute,
                "j" => Self::SeekBackward,
                "l" => Self::SeekForward,
                _ => return None,
            },
        };
        Some(shortcut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_documented_keys() {
        assert_eq!(Shortcut::from_key(" "), Some(Shortcut::TogglePlay));
        assert_eq!(Shortcut::from_key("K"), Some(Shortcut::TogglePlay));
        assert_eq!(Shortcut::from_key("f"), Some(Shortcut::ToggleFullscreen));
        assert_eq!(Shortcut::from_key("m"), Some(Shortcut::ToggleMute));
        assert_eq!(Shortcut::from_key("ArrowLeft"), Some(Shortcut::SeekBackward));
        assert_eq!(Shortcut::from_key("j"), Some(Shortcut::SeekBackward));
        assert_eq!(Shortcut::from_key("l"), Some(Shortcut::SeekForward));
        assert_eq!(Shortcut::from_key(","), Some(Shortcut::FrameBackward));
        assert_eq!(Shortcut::from_key("."), Some(Shortcut::FrameForward));
    }

    #[test]
    fn ignores_other_keys() {
        for key in ["a", "Enter", "Escape", "", "kk"] {
            assert_eq!(Shortcut::from_key(key), None, "{:?}", key);
        }
    }
}
