//! Global input hook using `rdev`
//!
//! `rdev::listen` blocks its thread for the life of the process and only
//! returns on failure, so the hook thread is started once and never joined.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use rdev::{listen, Event, EventType};
use tracing::{error, info};

use super::keys::{Key, KeyEvent};
use super::listener::{HotkeyError, KeyEventSource, KeySink};

/// Codes for named keys without their own `Key` variant; raw scan codes
/// from `rdev::Key::Unknown` stay below this
const NAMED_KEY_BASE: u32 = 0x8000_0000;

/// How long `listen` to fail before the hook is assumed live
const STARTUP_GRACE: Duration = Duration::from_millis(250);

/// Platform input hook for X11 and Windows
pub struct SystemKeySource;

impl KeyEventSource for SystemKeySource {
    fn install(&self, sink: KeySink) -> Result<(), HotkeyError> {
        let (failed_tx, failed_rx) = mpsc::channel::<String>();

        thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("hotkey listener thread started");

                let callback = move |event: Event| {
                    let key_event = match event.event_type {
                        EventType::KeyPress(key) => Some(KeyEvent::Press(map_key(key))),
                        EventType::KeyRelease(key) => Some(KeyEvent::Release(map_key(key))),
                        _ => None,
                    };
                    if let Some(key_event) = key_event {
                        sink(key_event);
                    }
                };

                // Blocks until the hook dies
                if let Err(e) = listen(callback) {
                    error!(?e, "input hook failed");
                    let _ = failed_tx.send(format!("{:?}", e));
                }

                info!("hotkey listener thread stopped");
            })
            .map_err(|e| HotkeyError::ThreadSpawn(e.to_string()))?;

        match failed_rx.recv_timeout(STARTUP_GRACE) {
            Ok(reason) => Err(HotkeyError::BindingUnavailable(reason)),
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => Err(HotkeyError::BindingUnavailable(
                "input hook thread exited".to_string(),
            )),
        }
    }
}

fn map_key(key: rdev::Key) -> Key {
    use rdev::Key as K;

    match key {
        K::ShiftLeft => Key::ShiftLeft,
        K::ShiftRight => Key::ShiftRight,
        K::ControlLeft => Key::ControlLeft,
        K::ControlRight => Key::ControlRight,
        K::Alt => Key::AltLeft,
        K::AltGr => Key::AltRight,
        K::MetaLeft => Key::MetaLeft,
        K::MetaRight => Key::MetaRight,
        K::Space => Key::Space,
        K::Return => Key::Return,
        K::Tab => Key::Tab,
        K::Escape => Key::Escape,
        K::Backspace => Key::Backspace,
        K::F1 => Key::Function(1),
        K::F2 => Key::Function(2),
        K::F3 => Key::Function(3),
        K::F4 => Key::Function(4),
        K::F5 => Key::Function(5),
        K::F6 => Key::Function(6),
        K::F7 => Key::Function(7),
        K::F8 => Key::Function(8),
        K::F9 => Key::Function(9),
        K::F10 => Key::Function(10),
        K::F11 => Key::Function(11),
        K::F12 => Key::Function(12),
        K::KeyA => Key::Char('a'),
        K::KeyB => Key::Char('b'),
        K::KeyC => Key::Char('c'),
        K::KeyD => Key::Char('d'),
        K::KeyE => Key::Char('e'),
        K::KeyF => Key::Char('f'),
        K::KeyG => Key::Char('g'),
        K::KeyH => Key::Char('h'),
        K::KeyI => Key::Char('i'),
        K::KeyJ => Key::Char('j'),
        K::KeyK => Key::Char('k'),
        K::KeyL => Key::Char('l'),
        K::KeyM => Key::Char('m'),
        K::KeyN => Key::Char('n'),
        K::KeyO => Key::Char('o'),
        K::KeyP => Key::Char('p'),
        K::KeyQ => Key::Char('q'),
        K::KeyR => Key::Char('r'),
        K::KeyS => Key::Char('s'),
        K::KeyT => Key::Char('t'),
        K::KeyU => Key::Char('u'),
        K::KeyV => Key::Char('v'),
        K::KeyW => Key::Char('w'),
        K::KeyX => Key::Char('x'),
        K::KeyY => Key::Char('y'),
        K::KeyZ => Key::Char('z'),
        K::Num0 => Key::Char('0'),
        K::Num1 => Key::Char('1'),
        K::Num2 => Key::Char('2'),
        K::Num3 => Key::Char('3'),
        K::Num4 => Key::Char('4'),
        K::Num5 => Key::Char('5'),
        K::Num6 => Key::Char('6'),
        K::Num7 => Key::Char('7'),
        K::Num8 => Key::Char('8'),
        K::Num9 => Key::Char('9'),
        K::Unknown(code) => Key::Other(code),
        // Named keys no binding can use; they only need to count as foreign
        named => Key::Other(named_code(named)),
    }
}

/// Stable per-variant code for a named key
fn named_code(key: rdev::Key) -> u32 {
    let mut hasher = DefaultHasher::new();
    std::mem::discriminant(&key).hash(&mut hasher);
    NAMED_KEY_BASE | (hasher.finish() as u32 & !NAMED_KEY_BASE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_key() {
        assert_eq!(map_key(rdev::Key::ShiftRight), Key::ShiftRight);
        assert_eq!(map_key(rdev::Key::AltGr), Key::AltRight);
        assert_eq!(map_key(rdev::Key::KeyZ), Key::Char('z'));
        assert_eq!(map_key(rdev::Key::F12), Key::Function(12));
        assert_eq!(map_key(rdev::Key::Unknown(42)), Key::Other(42));
    }

    #[test]
    fn test_named_keys_stay_distinct() {
        let named = [
            rdev::Key::UpArrow,
            rdev::Key::DownArrow,
            rdev::Key::LeftArrow,
            rdev::Key::RightArrow,
            rdev::Key::Home,
            rdev::Key::End,
            rdev::Key::PageUp,
            rdev::Key::PageDown,
            rdev::Key::Delete,
            rdev::Key::CapsLock,
        ];
        let codes: Vec<Key> = named.iter().map(|key| map_key(*key)).collect();
        for (i, code) in codes.iter().enumerate() {
            assert!(matches!(code, Key::Other(c) if *c >= NAMED_KEY_BASE));
            assert!(!codes[i + 1..].contains(code), "{:?} shares a code", named[i]);
        }
        assert_eq!(map_key(rdev::Key::UpArrow), map_key(rdev::Key::UpArrow));
    }

    #[test]
    fn test_releasing_one_named_key_keeps_the_other_held() {
        use crate::hotkey::keys::ChordTracker;

        let mut chord = ChordTracker::new("rshift".parse().unwrap());
        chord.handle(KeyEvent::Press(map_key(rdev::Key::UpArrow)));
        chord.handle(KeyEvent::Press(map_key(rdev::Key::DownArrow)));
        chord.handle(KeyEvent::Release(map_key(rdev::Key::UpArrow)));
        chord.handle(KeyEvent::Press(Key::ShiftRight));
        // Down arrow is still held, so the chord is not clean
        assert!(!chord.handle(KeyEvent::Release(Key::ShiftRight)));
    }
}
