//! In-memory desktop and translator used by the orchestrator tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::desktop::{Clipboard, ClipboardError, KeystrokeError, Keystrokes};
use crate::translate::{TranslateError, Translator};

#[derive(Debug, Default)]
struct DesktopState {
    /// `None` reads as an error
    clipboard: Option<String>,
    /// Highlighted text in the foreground app; pasting replaces it
    selection: Option<String>,
    writes: Vec<String>,
    pastes: usize,
    copy_lag: Option<Duration>,
    fail_write_of: Option<String>,
    fail_paste: bool,
    failing_reads: usize,
}

/// Clipboard plus foreground application, sharing one state
#[derive(Debug, Clone, Default)]
pub struct FakeDesktop {
    state: Arc<Mutex<DesktopState>>,
}

impl FakeDesktop {
    pub fn new(clipboard: Option<&str>, selection: Option<&str>) -> Self {
        let desktop = Self::default();
        {
            let mut state = desktop.state();
            state.clipboard = clipboard.map(str::to_string);
            state.selection = selection.map(str::to_string);
        }
        desktop
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DesktopState> {
        self.state.lock().unwrap()
    }

    pub fn set_copy_lag(&self, lag: Duration) {
        self.state().copy_lag = Some(lag);
    }

    pub fn fail_write_of(&self, text: &str) {
        self.state().fail_write_of = Some(text.to_string());
    }

    /// Make the next `count` reads fail even though the clipboard holds text
    pub fn fail_reads(&self, count: usize) {
        self.state().failing_reads = count;
    }

    pub fn fail_paste(&self) {
        self.state().fail_paste = true;
    }

    pub fn copy_now(&self) {
        Keystrokes::copy(self).unwrap();
    }

    pub fn clipboard(&self) -> Option<String> {
        self.state().clipboard.clone()
    }

    pub fn selection(&self) -> Option<String> {
        self.state().selection.clone()
    }

    /// Every successful clipboard write, in order
    pub fn writes(&self) -> Vec<String> {
        self.state().writes.clone()
    }

    pub fn pastes(&self) -> usize {
        self.state().pastes
    }
}

impl Clipboard for FakeDesktop {
    fn read(&self) -> Result<String, ClipboardError> {
        let mut state = self.state();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(ClipboardError::Read("clipboard is busy".to_string()));
        }
        state
            .clipboard
            .clone()
            .ok_or_else(|| ClipboardError::Read("clipboard holds no text".to_string()))
    }

    fn write(&self, text: &str) -> Result<(), ClipboardError> {
        let mut state = self.state();
        if state.fail_write_of.as_deref() == Some(text) {
            return Err(ClipboardError::Write("clipboard is locked".to_string()));
        }
        state.clipboard = Some(text.to_string());
        state.writes.push(text.to_string());
        Ok(())
    }
}

impl Keystrokes for FakeDesktop {
    fn copy(&self) -> Result<(), KeystrokeError> {
        let (selection, lag) = {
            let state = self.state();
            (state.selection.clone(), state.copy_lag)
        };
        let Some(selection) = selection else {
            return Ok(());
        };

        match lag {
            Some(lag) => {
                let state = Arc::clone(&self.state);
                std::thread::spawn(move || {
                    std::thread::sleep(lag);
                    state.lock().unwrap().clipboard = Some(selection);
                });
            }
            None => self.state().clipboard = Some(selection),
        }
        Ok(())
    }

    fn paste(&self) -> Result<(), KeystrokeError> {
        let mut state = self.state();
        if state.fail_paste {
            return Err(KeystrokeError::Send {
                combo: "paste shortcut",
                reason: "no focused window".to_string(),
            });
        }
        state.selection = state.clipboard.clone();
        state.pastes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Behavior {
    /// Look the selection up in the reply table
    Answer,
    Fail(TranslateError),
    /// Never return
    Hang,
    /// Answer after a delay
    Slow(Duration),
}

/// Translator answering from a fixed table keyed by selection text
#[derive(Debug)]
pub struct FakeTranslator {
    replies: HashMap<String, String>,
    behavior: Behavior,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    last_api_key: Mutex<Option<String>>,
}

impl FakeTranslator {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            replies: HashMap::new(),
            behavior,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
            last_api_key: Mutex::new(None),
        }
    }

    pub fn reply(mut self, selection: &str, translation: &str) -> Self {
        self.replies.insert(selection.to_string(), translation.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }

    pub fn last_api_key(&self) -> Option<String> {
        self.last_api_key.lock().unwrap().clone()
    }

    fn answer(&self, prompt: &str) -> Result<String, TranslateError> {
        self.replies
            .iter()
            .find(|(selection, _)| prompt.ends_with(&format!("\n\n{}", selection)))
            .map(|(_, translation)| translation.clone())
            .ok_or(TranslateError::Empty)
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn generate(&self, api_key: &str, _model: &str, prompt: &str) -> Result<String, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_api_key.lock().unwrap() = Some(api_key.to_string());
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());

        match &self.behavior {
            Behavior::Answer => self.answer(prompt),
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::Hang => std::future::pending().await,
            Behavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                self.answer(prompt)
            }
        }
    }
}
