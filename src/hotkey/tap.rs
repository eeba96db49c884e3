//! Global input hook using macOS CGEventTap
//!
//! Monitors system-wide key down/up and modifier flag changes.
//! Runs on a dedicated thread with its own CFRunLoop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventTapProxy, CGEventType, EventField,
};
use tracing::{error, info, warn};

use super::keys::{Key, KeyEvent};
use super::listener::{HotkeyError, KeyEventSource, KeySink};

/// Device-dependent modifier bits carried in CGEventFlags (NX_DEVICE*KEYMASK)
mod device_flags {
    pub const LEFT_CONTROL: u64 = 0x0000_0001;
    pub const LEFT_SHIFT: u64 = 0x0000_0002;
    pub const RIGHT_SHIFT: u64 = 0x0000_0004;
    pub const LEFT_COMMAND: u64 = 0x0000_0008;
    pub const RIGHT_COMMAND: u64 = 0x0000_0010;
    pub const LEFT_OPTION: u64 = 0x0000_0020;
    pub const RIGHT_OPTION: u64 = 0x0000_0040;
    pub const RIGHT_CONTROL: u64 = 0x0000_2000;
}

/// Notes when macOS switches the tap off
///
/// The system disables a tap it considers slow, or on secure input, and
/// leaves it off until the owner enables it again.
#[derive(Debug, Default)]
struct TapWatchdog {
    disabled: AtomicBool,
}

impl TapWatchdog {
    /// Record `event_type`; true when it reports the tap as disabled
    fn observe(&self, event_type: CGEventType) -> bool {
        let disabled = matches!(
            event_type,
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput
        );
        if disabled {
            self.disabled.store(true, Ordering::SeqCst);
        }
        disabled
    }

    /// True once per disable notification
    fn take_disabled(&self) -> bool {
        self.disabled.swap(false, Ordering::SeqCst)
    }
}

/// Platform input hook for macOS
pub struct SystemKeySource;

impl KeyEventSource for SystemKeySource {
    fn install(&self, sink: KeySink) -> Result<(), HotkeyError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), HotkeyError>>();

        thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                info!("hotkey listener thread started");

                if let Err(e) = run_event_loop(sink, &ready_tx) {
                    error!(?e, "hotkey listener error");
                    let _ = ready_tx.send(Err(e));
                }

                info!("hotkey listener thread stopped");
            })
            .map_err(|e| HotkeyError::ThreadSpawn(e.to_string()))?;

        ready_rx.recv().map_err(|_| {
            HotkeyError::BindingUnavailable("input hook thread exited".to_string())
        })?
    }
}

/// Run the CFRunLoop with the event tap
fn run_event_loop(
    sink: KeySink,
    ready: &mpsc::Sender<Result<(), HotkeyError>>,
) -> Result<(), HotkeyError> {
    // The tap callback must be fast: hand events to the loop below
    let (callback_tx, callback_rx) = mpsc::channel::<KeyEvent>();
    let watchdog = Arc::new(TapWatchdog::default());
    let tap_watchdog = Arc::clone(&watchdog);

    let callback = move |_proxy: CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
                         -> Option<CGEvent> {
        match event_type {
            CGEventType::KeyDown | CGEventType::KeyUp | CGEventType::FlagsChanged => {
                if let Some(key_event) = translate(event_type, event) {
                    let _ = callback_tx.send(key_event);
                }
            }
            other => {
                if tap_watchdog.observe(other) {
                    warn!("event tap disabled by the system");
                }
            }
        }
        Some(event.clone())
    };

    let tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        callback,
    )
    .map_err(|_| {
        HotkeyError::BindingUnavailable(
            "failed to create event tap - check Accessibility permissions".to_string(),
        )
    })?;

    tap.enable();

    let run_loop_source = tap.mach_port.create_runloop_source(0).map_err(|_| {
        HotkeyError::BindingUnavailable("failed to create run loop source".to_string())
    })?;
    let run_loop = CFRunLoop::get_current();

    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }

    info!("event tap created and enabled");
    let _ = ready.send(Ok(()));

    loop {
        unsafe {
            CFRunLoop::run_in_mode(
                kCFRunLoopDefaultMode,
                std::time::Duration::from_millis(100),
                true,
            );
        }

        while let Ok(key_event) = callback_rx.try_recv() {
            sink(key_event);
        }

        if watchdog.take_disabled() {
            tap.enable();
            info!("event tap re-enabled");
        }
    }
}

fn translate(event_type: CGEventType, event: &CGEvent) -> Option<KeyEvent> {
    let code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
    let key = map_keycode(code);

    match event_type {
        CGEventType::KeyDown => Some(KeyEvent::Press(key)),
        CGEventType::KeyUp => Some(KeyEvent::Release(key)),
        CGEventType::FlagsChanged => {
            let mask = device_mask(key)?;
            if event.get_flags().bits() & mask != 0 {
                Some(KeyEvent::Press(key))
            } else {
                Some(KeyEvent::Release(key))
            }
        }
        _ => None,
    }
}

fn device_mask(key: Key) -> Option<u64> {
    let mask = match key {
        Key::ShiftLeft => device_flags::LEFT_SHIFT,
        Key::ShiftRight => device_flags::RIGHT_SHIFT,
        Key::ControlLeft => device_flags::LEFT_CONTROL,
        Key::ControlRight => device_flags::RIGHT_CONTROL,
        Key::AltLeft => device_flags::LEFT_OPTION,
        Key::AltRight => device_flags::RIGHT_OPTION,
        Key::MetaLeft => device_flags::LEFT_COMMAND,
        Key::MetaRight => device_flags::RIGHT_COMMAND,
        _ => return None,
    };
    Some(mask)
}

/// ANSI virtual keycodes (HIToolbox kVK_*)
fn map_keycode(code: u16) -> Key {
    match code {
        56 => Key::ShiftLeft,
        60 => Key::ShiftRight,
        59 => Key::ControlLeft,
        62 => Key::ControlRight,
        58 => Key::AltLeft,
        61 => Key::AltRight,
        55 => Key::MetaLeft,
        54 => Key::MetaRight,
        49 => Key::Space,
        36 => Key::Return,
        48 => Key::Tab,
        53 => Key::Escape,
        51 => Key::Backspace,
        0 => Key::Char('a'),
        11 => Key::Char('b'),
        8 => Key::Char('c'),
        2 => Key::Char('d'),
        14 => Key::Char('e'),
        3 => Key::Char('f'),
        5 => Key::Char('g'),
        4 => Key::Char('h'),
        34 => Key::Char('i'),
        38 => Key::Char('j'),
        40 => Key::Char('k'),
        37 => Key::Char('l'),
        46 => Key::Char('m'),
        45 => Key::Char('n'),
        31 => Key::Char('o'),
        35 => Key::Char('p'),
        12 => Key::Char('q'),
        15 => Key::Char('r'),
        1 => Key::Char('s'),
        17 => Key::Char('t'),
        32 => Key::Char('u'),
        9 => Key::Char('v'),
        13 => Key::Char('w'),
        7 => Key::Char('x'),
        16 => Key::Char('y'),
        6 => Key::Char('z'),
        29 => Key::Char('0'),
        18 => Key::Char('1'),
        19 => Key::Char('2'),
        20 => Key::Char('3'),
        21 => Key::Char('4'),
        23 => Key::Char('5'),
        22 => Key::Char('6'),
        26 => Key::Char('7'),
        28 => Key::Char('8'),
        25 => Key::Char('9'),
        122 => Key::Function(1),
        120 => Key::Function(2),
        99 => Key::Function(3),
        118 => Key::Function(4),
        96 => Key::Function(5),
        97 => Key::Function(6),
        98 => Key::Function(7),
        100 => Key::Function(8),
        101 => Key::Function(9),
        109 => Key::Function(10),
        103 => Key::Function(11),
        111 => Key::Function(12),
        other => Key::Other(other as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_keycode() {
        assert_eq!(map_keycode(60), Key::ShiftRight);
        assert_eq!(map_keycode(6), Key::Char('z'));
        assert_eq!(map_keycode(49), Key::Space);
        assert_eq!(map_keycode(10), Key::Other(10));
    }

    #[test]
    fn test_watchdog_reports_each_disable_once() {
        let watchdog = TapWatchdog::default();
        assert!(!watchdog.observe(CGEventType::KeyDown));
        assert!(!watchdog.take_disabled());

        assert!(watchdog.observe(CGEventType::TapDisabledByTimeout));
        assert!(watchdog.take_disabled());
        assert!(!watchdog.take_disabled());

        assert!(watchdog.observe(CGEventType::TapDisabledByUserInput));
        assert!(watchdog.take_disabled());
    }

    #[test]
    fn test_device_mask_only_for_modifiers() {
        assert_eq!(device_mask(Key::ShiftRight), Some(device_flags::RIGHT_SHIFT));
        assert_eq!(device_mask(Key::Char('x')), None);
    }
}
