//! Keyboard translation.
//!
//! Physical keys are identified by their layout-independent code, e.g. `"KeyZ"` or
//! `"ArrowUp"`.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A logical controller button.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    Start,
    Select,
}

impl Button {
    pub const fn as_slice() -> &'static [Self] {
        &[
            Self::Up,
            Self::Down,
            Self::Left,
            Self::Right,
            Self::A,
            Self::B,
            Self::Start,
            Self::Select,
        ]
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
            Self::A => "a",
            Self::B => "b",
            Self::Start => "start",
            Self::Select => "select",
        }
    }
}

impl AsRef<str> for Button {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for Button {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl FromStr for Button {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "a" => Ok(Self::A),
            "b" => Ok(Self::B),
            "start" => Ok(Self::Start),
            "select" => Ok(Self::Select),
            _ => Err("invalid Button value. valid options: `up`, `down`, `left`, `right`, `a`, `b`, `start`, or `select`"),
        }
    }
}

/// Host actions bound to reserved keys. These are handled by the session and never reach the
/// engine as button presses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use]
pub enum Shortcut {
    TogglePause,
    Reset,
    SaveState,
    LoadState,
}

/// Binds one physical key to a controller button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct KeyBinding {
    pub key: String,
    pub button: Button,
}

impl KeyBinding {
    pub fn new(key: impl Into<String>, button: Button) -> Self {
        Self {
            key: key.into(),
            button,
        }
    }

    /// The default keyboard layout.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("ArrowUp", Button::Up),
            Self::new("ArrowDown", Button::Down),
            Self::new("ArrowLeft", Button::Left),
            Self::new("ArrowRight", Button::Right),
            Self::new("KeyZ", Button::A),
            Self::new("KeyX", Button::B),
            Self::new("KeyG", Button::Start),
            Self::new("KeyH", Button::Select),
        ]
    }
}

/// Maps physical keys to controller buttons and host shortcuts.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct InputTranslator {
    bindings: Vec<KeyBinding>,
}

impl Default for InputTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl InputTranslator {
    pub const PAUSE_KEY: &'static str = "KeyP";
    pub const RESET_KEY: &'static str = "F2";
    pub const SAVE_STATE_KEY: &'static str = "F5";
    pub const LOAD_STATE_KEY: &'static str = "F8";

    pub fn new() -> Self {
        Self::with_bindings(KeyBinding::defaults())
    }

    /// Create a translator from a custom table. Bindings on reserved shortcut keys are dropped
    /// since shortcuts are intercepted first.
    pub fn with_bindings(bindings: impl IntoIterator<Item = KeyBinding>) -> Self {
        let bindings = bindings
            .into_iter()
            .filter(|binding| {
                let reserved = Self::shortcut(&binding.key).is_some();
                if reserved {
                    tracing::warn!("ignoring binding on reserved key: {}", binding.key);
                }
                !reserved
            })
            .collect();
        Self { bindings }
    }

    #[must_use]
    pub fn bindings(&self) -> &[KeyBinding] {
        &self.bindings
    }

    /// The controller button bound to `key`, if any.
    #[must_use]
    pub fn translate(&self, key: &str) -> Option<Button> {
        self.bindings
            .iter()
            .find(|binding| binding.key == key)
            .map(|binding| binding.button)
    }

    /// The host shortcut reserved for `key`, if any.
    #[must_use]
    pub fn shortcut(key: &str) -> Option<Shortcut> {
        match key {
            Self::PAUSE_KEY => Some(Shortcut::TogglePause),
            Self::RESET_KEY => Some(Shortcut::Reset),
            Self::SAVE_STATE_KEY => Some(Shortcut::SaveState),
            Self::LOAD_STATE_KEY => Some(Shortcut::LoadState),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_default_keys() {
        let input = InputTranslator::new();
        let expected = [
            ("ArrowUp", Button::Up),
            ("ArrowDown", Button::Down),
            ("ArrowLeft", Button::Left),
            ("ArrowRight", Button::Right),
            ("KeyZ", Button::A),
            ("KeyX", Button::B),
            ("KeyG", Button::Start),
            ("KeyH", Button::Select),
        ];
        for (key, button) in expected {
            assert_eq!(input.translate(key), Some(button), "{key}");
        }
        assert_eq!(input.bindings().len(), Button::as_slice().len());
    }

    #[test]
    fn unmapped_keys_have_no_button() {
        let input = InputTranslator::new();
        assert_eq!(input.translate("KeyQ"), None);
        assert_eq!(input.translate(""), None);
        assert_eq!(input.translate("keyz"), None, "key codes are case sensitive");
        assert_eq!(input.translate(InputTranslator::PAUSE_KEY), None);
    }

    #[test]
    fn shortcuts() {
        assert_eq!(
            InputTranslator::shortcut("KeyP"),
            Some(Shortcut::TogglePause)
        );
        assert_eq!(InputTranslator::shortcut("F2"), Some(Shortcut::Reset));
        assert_eq!(InputTranslator::shortcut("F5"), Some(Shortcut::SaveState));
        assert_eq!(InputTranslator::shortcut("F8"), Some(Shortcut::LoadState));
        assert_eq!(InputTranslator::shortcut("KeyZ"), None);
    }

    #[test]
    fn reserved_keys_cannot_be_bound() {
        let input = InputTranslator::with_bindings([
            KeyBinding::new("KeyP", Button::Start),
            KeyBinding::new("Space", Button::A),
        ]);
        assert_eq!(input.translate("KeyP"), None);
        assert_eq!(input.translate("Space"), Some(Button::A));
    }

    #[test]
    fn button_from_str() {
        for button in Button::as_slice() {
            assert_eq!(button.as_str().parse::<Button>(), Ok(*button));
        }
        assert_eq!("START".parse::<Button>(), Ok(Button::Start));
        assert!("turbo".parse::<Button>().is_err());
    }
}
