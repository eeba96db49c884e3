//! Key names, hotkey bindings and chord release detection
//!
//! Bindings are written as `+`-separated key names (`rshift`, `ctrl+alt+x`).
//! Platform hooks translate their native events into [`KeyEvent`]s and feed
//! them to a [`ChordTracker`], which decides when the binding fired.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::listener::HotkeyError;

/// Physical key as reported by the platform hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    ShiftLeft,
    ShiftRight,
    ControlLeft,
    ControlRight,
    AltLeft,
    AltRight,
    MetaLeft,
    MetaRight,
    Space,
    Return,
    Tab,
    Escape,
    Backspace,
    /// Letter or digit, always lowercase
    Char(char),
    /// Function key F1-F12
    Function(u8),
    /// Any key bindings cannot name, by platform code
    Other(u32),
}

impl Key {
    /// Modifier family of this key, if it is a modifier
    pub fn modifier(self) -> Option<Modifier> {
        match self {
            Key::ShiftLeft | Key::ShiftRight => Some(Modifier::Shift),
            Key::ControlLeft | Key::ControlRight => Some(Modifier::Control),
            Key::AltLeft | Key::AltRight => Some(Modifier::Alt),
            Key::MetaLeft | Key::MetaRight => Some(Modifier::Meta),
            _ => None,
        }
    }
}

/// Modifier family, matching either physical side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Shift,
    Control,
    Alt,
    Meta,
}

/// Raw key transition delivered by a platform hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Press(Key),
    Release(Key),
}

/// One element of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySpec {
    /// Either side of a modifier (`ctrl`)
    Any(Modifier),
    /// Exactly this key (`rshift`, `x`)
    Exact(Key),
}

impl KeySpec {
    pub fn matches(self, key: Key) -> bool {
        match self {
            KeySpec::Any(modifier) => key.modifier() == Some(modifier),
            KeySpec::Exact(expected) => expected == key,
        }
    }

    /// Whether some physical key would satisfy both specs
    fn overlaps(self, other: KeySpec) -> bool {
        match (self, other) {
            (KeySpec::Any(a), KeySpec::Any(b)) => a == b,
            (KeySpec::Any(m), KeySpec::Exact(k)) | (KeySpec::Exact(k), KeySpec::Any(m)) => {
                k.modifier() == Some(m)
            }
            (KeySpec::Exact(a), KeySpec::Exact(b)) => a == b,
        }
    }

    fn parse(name: &str) -> Option<Self> {
        let spec = match name {
            "shift" => KeySpec::Any(Modifier::Shift),
            "ctrl" | "control" => KeySpec::Any(Modifier::Control),
            "alt" | "option" | "opt" => KeySpec::Any(Modifier::Alt),
            "cmd" | "command" | "meta" | "super" | "win" => KeySpec::Any(Modifier::Meta),
            "lshift" => KeySpec::Exact(Key::ShiftLeft),
            "rshift" => KeySpec::Exact(Key::ShiftRight),
            "lctrl" => KeySpec::Exact(Key::ControlLeft),
            "rctrl" => KeySpec::Exact(Key::ControlRight),
            "lalt" => KeySpec::Exact(Key::AltLeft),
            "ralt" => KeySpec::Exact(Key::AltRight),
            "lcmd" | "lmeta" => KeySpec::Exact(Key::MetaLeft),
            "rcmd" | "rmeta" => KeySpec::Exact(Key::MetaRight),
            "space" => KeySpec::Exact(Key::Space),
            "enter" | "return" => KeySpec::Exact(Key::Return),
            "tab" => KeySpec::Exact(Key::Tab),
            "esc" | "escape" => KeySpec::Exact(Key::Escape),
            "backspace" => KeySpec::Exact(Key::Backspace),
            _ => {
                if let Some(n) = name.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                    if (1..=12).contains(&n) {
                        return Some(KeySpec::Exact(Key::Function(n)));
                    }
                    return None;
                }
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphanumeric() => {
                        KeySpec::Exact(Key::Char(c.to_ascii_lowercase()))
                    }
                    _ => return None,
                }
            }
        };
        Some(spec)
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeySpec::Any(Modifier::Shift) => "shift",
            KeySpec::Any(Modifier::Control) => "ctrl",
            KeySpec::Any(Modifier::Alt) => "alt",
            KeySpec::Any(Modifier::Meta) => "cmd",
            KeySpec::Exact(Key::ShiftLeft) => "lshift",
            KeySpec::Exact(Key::ShiftRight) => "rshift",
            KeySpec::Exact(Key::ControlLeft) => "lctrl",
            KeySpec::Exact(Key::ControlRight) => "rctrl",
            KeySpec::Exact(Key::AltLeft) => "lalt",
            KeySpec::Exact(Key::AltRight) => "ralt",
            KeySpec::Exact(Key::MetaLeft) => "lcmd",
            KeySpec::Exact(Key::MetaRight) => "rcmd",
            KeySpec::Exact(Key::Space) => "space",
            KeySpec::Exact(Key::Return) => "enter",
            KeySpec::Exact(Key::Tab) => "tab",
            KeySpec::Exact(Key::Escape) => "esc",
            KeySpec::Exact(Key::Backspace) => "backspace",
            KeySpec::Exact(Key::Char(c)) => return write!(f, "{}", c),
            KeySpec::Exact(Key::Function(n)) => return write!(f, "f{}", n),
            KeySpec::Exact(Key::Other(code)) => return write!(f, "key{}", code),
        };
        f.write_str(name)
    }
}

/// A key combination that triggers one translation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBinding {
    specs: Vec<KeySpec>,
}

impl HotkeyBinding {
    pub fn specs(&self) -> &[KeySpec] {
        &self.specs
    }

    /// Whether `key` is part of this binding
    pub fn contains(&self, key: Key) -> bool {
        self.specs.iter().any(|spec| spec.matches(key))
    }
}

impl FromStr for HotkeyBinding {
    type Err = HotkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| HotkeyError::InvalidBinding {
            binding: s.to_string(),
            reason,
        };

        let mut specs: Vec<KeySpec> = Vec::new();
        for part in s.split('+') {
            let name = part.trim().to_ascii_lowercase();
            if name.is_empty() {
                return Err(invalid("empty key name".to_string()));
            }
            let spec = KeySpec::parse(&name).ok_or_else(|| invalid(format!("unknown key '{}'", name)))?;
            if specs.iter().any(|existing| existing.overlaps(spec)) {
                return Err(invalid(format!("key '{}' appears twice", name)));
            }
            specs.push(spec);
        }

        Ok(Self { specs })
    }
}

impl fmt::Display for HotkeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, spec) in self.specs.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{}", spec)?;
        }
        Ok(())
    }
}

/// Tracks held keys and reports when a binding is released
///
/// The binding fires on the release of one of its keys when every spec was
/// held right before the release, nothing else was held, and no foreign key
/// was pressed since the chord started forming.
#[derive(Debug)]
pub struct ChordTracker {
    binding: HotkeyBinding,
    pressed: HashSet<Key>,
    tainted: bool,
}

impl ChordTracker {
    pub fn new(binding: HotkeyBinding) -> Self {
        Self {
            binding,
            pressed: HashSet::new(),
            tainted: false,
        }
    }

    pub fn binding(&self) -> &HotkeyBinding {
        &self.binding
    }

    /// Feed one key transition; returns true when the binding fired
    pub fn handle(&mut self, event: KeyEvent) -> bool {
        match event {
            KeyEvent::Press(key) => {
                if !self.binding.contains(key) && self.holding_binding_key() {
                    self.tainted = true;
                }
                self.pressed.insert(key);
                false
            }
            KeyEvent::Release(key) => {
                let fired = self.binding.contains(key) && !self.tainted && self.chord_held();
                self.pressed.remove(&key);
                if self.pressed.is_empty() {
                    self.tainted = false;
                }
                fired
            }
        }
    }

    fn holding_binding_key(&self) -> bool {
        self.pressed.iter().any(|key| self.binding.contains(*key))
    }

    fn chord_held(&self) -> bool {
        let specs = self.binding.specs();
        specs
            .iter()
            .all(|spec| self.pressed.iter().any(|key| spec.matches(*key)))
            && self
                .pressed
                .iter()
                .all(|key| specs.iter().any(|spec| spec.matches(*key)))
    }
}
