//! Waiting for the clipboard to catch up
//!
//! A simulated keystroke or a clipboard write lands asynchronously and the
//! OS gives no completion signal. `Fixed` sleeps out the whole window;
//! `Poll` re-reads until the expected content shows up, bounded by the same
//! window, and falls back to whatever is there when the window closes.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::config::{SettleMode, Timings};
use crate::desktop::{Clipboard, ClipboardError, KeystrokeError, Keystrokes};

#[derive(Debug, Clone, Copy)]
pub struct Settle {
    mode: SettleMode,
    window: Duration,
    interval: Duration,
}

impl Settle {
    pub fn from_timings(timings: &Timings) -> Self {
        Self {
            mode: timings.settle,
            window: timings.copy_settle(),
            interval: timings.poll_interval(),
        }
    }

    /// Wait until the clipboard satisfies `landed`, then return its content
    pub async fn until(
        &self,
        clipboard: &Arc<dyn Clipboard>,
        landed: impl Fn(&str) -> bool,
    ) -> Result<String, ClipboardError> {
        match self.mode {
            SettleMode::Fixed => return self.full_window(clipboard).await,
            SettleMode::Poll => {
                let deadline = Instant::now() + self.window;
                loop {
                    if let Ok(text) = read_clipboard(clipboard).await {
                        if landed(&text) {
                            return Ok(text);
                        }
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    sleep(self.interval.min(deadline - now)).await;
                }
            }
        }
        read_clipboard(clipboard).await
    }

    /// Sleep out the whole window, then read
    pub async fn full_window(&self, clipboard: &Arc<dyn Clipboard>) -> Result<String, ClipboardError> {
        sleep(self.window).await;
        read_clipboard(clipboard).await
    }
}

pub async fn read_clipboard(clipboard: &Arc<dyn Clipboard>) -> Result<String, ClipboardError> {
    let clipboard = Arc::clone(clipboard);
    tokio::task::spawn_blocking(move || clipboard.read())
        .await
        .unwrap_or_else(|e| Err(ClipboardError::Read(format!("clipboard task failed: {}", e))))
}

pub async fn write_clipboard(
    clipboard: &Arc<dyn Clipboard>,
    text: String,
) -> Result<(), ClipboardError> {
    let clipboard = Arc::clone(clipboard);
    tokio::task::spawn_blocking(move || clipboard.write(&text))
        .await
        .unwrap_or_else(|e| Err(ClipboardError::Write(format!("clipboard task failed: {}", e))))
}

#[derive(Debug, Clone, Copy)]
pub enum Shortcut {
    Copy,
    Paste,
}

pub async fn press(keys: &Arc<dyn Keystrokes>, shortcut: Shortcut) -> Result<(), KeystrokeError> {
    let keys = Arc::clone(keys);
    tokio::task::spawn_blocking(move || match shortcut {
        Shortcut::Copy => keys.copy(),
        Shortcut::Paste => keys.paste(),
    })
    .await
    .unwrap_or_else(|e| Err(KeystrokeError::Init(format!("keystroke task failed: {}", e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::testing::FakeDesktop;

    fn settle(mode: SettleMode, window_ms: u64) -> Settle {
        Settle::from_timings(&Timings {
            settle: mode,
            copy_settle_ms: window_ms,
            poll_interval_ms: 5,
            ..Timings::default()
        })
    }

    #[tokio::test]
    async fn test_poll_returns_as_soon_as_content_lands() {
        let desktop = FakeDesktop::new(Some("old"), Some("fresh"));
        desktop.set_copy_lag(Duration::from_millis(30));
        let clipboard: Arc<dyn Clipboard> = Arc::new(desktop.clone());
        desktop.copy_now();

        let started = std::time::Instant::now();
        let text = settle(SettleMode::Poll, 2000)
            .until(&clipboard, |text| text != "old")
            .await
            .unwrap();

        assert_eq!(text, "fresh");
        assert!(started.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_poll_gives_up_after_window() {
        let desktop = FakeDesktop::new(Some("same"), None);
        let clipboard: Arc<dyn Clipboard> = Arc::new(desktop);

        let started = std::time::Instant::now();
        let text = settle(SettleMode::Poll, 40)
            .until(&clipboard, |text| text != "same")
            .await
            .unwrap();

        assert_eq!(text, "same");
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_fixed_misses_a_late_copy() {
        let desktop = FakeDesktop::new(Some(""), Some("late"));
        desktop.set_copy_lag(Duration::from_millis(300));
        let clipboard: Arc<dyn Clipboard> = Arc::new(desktop.clone());
        desktop.copy_now();

        let text = settle(SettleMode::Fixed, 10)
            .until(&clipboard, |text| !text.is_empty())
            .await
            .unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_full_window_waits_for_a_late_copy() {
        let desktop = FakeDesktop::new(Some("old"), Some("fresh"));
        desktop.set_copy_lag(Duration::from_millis(20));
        let clipboard: Arc<dyn Clipboard> = Arc::new(desktop.clone());
        desktop.copy_now();

        let text = settle(SettleMode::Poll, 200).full_window(&clipboard).await.unwrap();
        assert_eq!(text, "fresh");
    }
}
