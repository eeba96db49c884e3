//! Desktop collaborators: the shared clipboard and simulated keystrokes
//!
//! Both are OS-global and synchronous; callers on the async runtime go
//! through `spawn_blocking`.

mod clipboard;
mod keystrokes;

pub use clipboard::{Clipboard, ClipboardError, SystemClipboard};
pub use keystrokes::{KeystrokeError, Keystrokes, SystemKeystrokes};
