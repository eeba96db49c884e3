//! Hotkey module for global keyboard event listening
//!
//! Uses macOS CGEventTap, or `rdev` on other platforms, to watch key
//! transitions and fire when the configured binding is released.

mod keys;
mod listener;
mod rebind;

#[cfg(not(target_os = "macos"))]
mod hook;
#[cfg(target_os = "macos")]
mod tap;

pub use listener::{HotkeyError, HotkeyListener, TriggerCallback};
pub use rebind::HotkeyBinder;

#[cfg(not(target_os = "macos"))]
pub use hook::SystemKeySource;
#[cfg(target_os = "macos")]
pub use tap::SystemKeySource;

#[cfg(test)]
pub(crate) use listener::testing;
