//! Simulated copy/paste keystrokes using enigo

use std::thread;
use std::time::Duration;

use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum KeystrokeError {
    #[error("failed to initialize keyboard simulation: {0}")]
    Init(String),

    #[error("failed to send {combo}: {reason}")]
    Send { combo: &'static str, reason: String },
}

/// Keyboard shortcuts issued to the foreground application
pub trait Keystrokes: Send + Sync {
    /// Cmd+C on macOS, Ctrl+C elsewhere
    fn copy(&self) -> Result<(), KeystrokeError>;

    /// Cmd+V on macOS, Ctrl+V elsewhere
    fn paste(&self) -> Result<(), KeystrokeError>;
}

#[derive(Debug, Default)]
pub struct SystemKeystrokes;

impl SystemKeystrokes {
    /// Get the platform-specific modifier key (Cmd on macOS, Ctrl elsewhere)
    pub fn modifier_key() -> Key {
        #[cfg(target_os = "macos")]
        {
            Key::Meta
        }
        #[cfg(not(target_os = "macos"))]
        {
            Key::Control
        }
    }

    fn send_combo(combo: &'static str, letter: char) -> Result<(), KeystrokeError> {
        let failed = |e: enigo::InputError| KeystrokeError::Send {
            combo,
            reason: e.to_string(),
        };

        let mut enigo =
            Enigo::new(&Settings::default()).map_err(|e| KeystrokeError::Init(e.to_string()))?;
        let modifier = Self::modifier_key();

        enigo.key(modifier, Direction::Press).map_err(failed)?;

        // Small delay for modifier to register
        thread::sleep(Duration::from_millis(10));

        let clicked = enigo.key(Key::Unicode(letter), Direction::Click).map_err(failed);

        thread::sleep(Duration::from_millis(20));

        // Always release the modifier so it doesn't stay stuck
        let released = enigo.key(modifier, Direction::Release).map_err(failed);
        clicked.and(released)
    }
}

impl Keystrokes for SystemKeystrokes {
    fn copy(&self) -> Result<(), KeystrokeError> {
        Self::send_combo("copy shortcut", 'c')
    }

    fn paste(&self) -> Result<(), KeystrokeError> {
        Self::send_combo("paste shortcut", 'v')
    }
}
