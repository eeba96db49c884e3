//! The capture → translate → replace → restore sequence

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::gate::RunGate;
use super::settle::{press, read_clipboard, write_clipboard, Settle, Shortcut};
use crate::config::{Settings, SettingsStore};
use crate::desktop::{Clipboard, ClipboardError, KeystrokeError, Keystrokes};
use crate::events::RunEvent;
use crate::translate::{TranslateError, TranslationRequest, Translator};

/// Why a run stopped before replacing the selection
#[derive(Debug, Error)]
pub enum RunError {
    #[error("copy keystroke failed: {0}")]
    Capture(KeystrokeError),

    #[error("could not read the selection: {0}")]
    SelectionRead(ClipboardError),

    #[error("nothing selected")]
    EmptySelection,

    #[error("translation timed out after {0:?}")]
    TranslationTimeout(Duration),

    #[error("translation failed: {0}")]
    TranslationCall(TranslateError),

    #[error("could not put the translation on the clipboard: {0}")]
    ClipboardWrite(ClipboardError),

    #[error("paste keystroke failed: {0}")]
    Paste(KeystrokeError),
}

/// Result of one trigger
#[derive(Debug)]
pub enum RunOutcome {
    Completed { translated: String },
    Aborted(RunError),
    /// Another run held the clipboard
    Dropped,
}

/// Clipboard content from before the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardSnapshot {
    /// Possibly empty; restoring an empty capture clears the clipboard
    Captured(String),
    /// The read failed; restoring leaves the clipboard alone
    Unavailable,
}

impl ClipboardSnapshot {
    pub fn text(&self) -> Option<&str> {
        match self {
            ClipboardSnapshot::Captured(text) => Some(text),
            ClipboardSnapshot::Unavailable => None,
        }
    }
}

#[derive(Debug, Default)]
struct RunStats {
    completed: AtomicU64,
    nothing_selected: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    active: AtomicU64,
}

/// Counters reported over IPC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatsSnapshot {
    pub completed: u64,
    pub nothing_selected: u64,
    pub failed: u64,
    pub dropped: u64,
    pub active: u64,
}

pub struct Orchestrator {
    clipboard: Arc<dyn Clipboard>,
    keys: Arc<dyn Keystrokes>,
    translator: Arc<dyn Translator>,
    settings: Arc<SettingsStore>,
    gate: RunGate,
    events: broadcast::Sender<RunEvent>,
    stats: RunStats,
    next_run: AtomicU64,
}

impl Orchestrator {
    pub fn new(
        clipboard: Arc<dyn Clipboard>,
        keys: Arc<dyn Keystrokes>,
        translator: Arc<dyn Translator>,
        settings: Arc<SettingsStore>,
        events: broadcast::Sender<RunEvent>,
    ) -> Self {
        Self {
            clipboard,
            keys,
            translator,
            settings,
            gate: RunGate::new(),
            events,
            stats: RunStats::default(),
            next_run: AtomicU64::new(1),
        }
    }

    /// Start a run on `runtime` without waiting for it
    ///
    /// Safe to call from the hook thread; the task is never joined.
    pub fn trigger(self: &Arc<Self>, runtime: &Handle) {
        let this = Arc::clone(self);
        runtime.spawn(async move {
            this.run().await;
        });
    }

    pub fn stats(&self) -> RunStatsSnapshot {
        RunStatsSnapshot {
            completed: self.stats.completed.load(Ordering::SeqCst),
            nothing_selected: self.stats.nothing_selected.load(Ordering::SeqCst),
            failed: self.stats.failed.load(Ordering::SeqCst),
            dropped: self.stats.dropped.load(Ordering::SeqCst),
            active: self.stats.active.load(Ordering::SeqCst),
        }
    }

    /// One full orchestration run, reading settings fresh
    pub async fn run(&self) -> RunOutcome {
        let settings = self.settings.snapshot().await;

        let Some(_permit) = self.gate.admit(settings.overlap).await else {
            info!("trigger dropped: a run is already active");
            self.stats.dropped.fetch_add(1, Ordering::SeqCst);
            self.emit(RunEvent::RunDropped);
            return RunOutcome::Dropped;
        };

        let run_id = self.next_run.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        self.stats.active.fetch_add(1, Ordering::SeqCst);
        info!(run_id, model = %settings.model, "run started");
        self.emit(RunEvent::RunStarted { run_id });

        let result = self.execute(run_id, &settings).await;
        self.stats.active.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(translated) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                let chars = translated.chars().count();
                info!(run_id, duration_ms, chars, "selection replaced");
                self.stats.completed.fetch_add(1, Ordering::SeqCst);
                self.emit(RunEvent::Replaced {
                    run_id,
                    duration_ms,
                    chars,
                });
                RunOutcome::Completed { translated }
            }
            Err(e) => {
                self.report_failure(run_id, &e);
                RunOutcome::Aborted(e)
            }
        }
    }

    fn report_failure(&self, run_id: u64, e: &RunError) {
        let reason = e.to_string();
        let event = match e {
            RunError::EmptySelection => {
                info!(run_id, "nothing selected");
                self.stats.nothing_selected.fetch_add(1, Ordering::SeqCst);
                self.emit(RunEvent::NothingSelected { run_id });
                return;
            }
            RunError::Capture(_) | RunError::SelectionRead(_) => {
                RunEvent::CaptureFailed { run_id, reason }
            }
            RunError::TranslationTimeout(_) | RunError::TranslationCall(_) => {
                RunEvent::TranslationFailed { run_id, reason }
            }
            RunError::ClipboardWrite(_) | RunError::Paste(_) => {
                RunEvent::ReplaceFailed { run_id, reason }
            }
        };

        warn!(run_id, error = %e, "run aborted");
        self.stats.failed.fetch_add(1, Ordering::SeqCst);
        self.emit(event);
    }

    async fn execute(&self, run_id: u64, settings: &Settings) -> Result<String, RunError> {
        let snapshot = match read_clipboard(&self.clipboard).await {
            Ok(text) => ClipboardSnapshot::Captured(text),
            Err(e) => {
                warn!(run_id, error = %e, "clipboard snapshot unreadable, continuing without restore");
                ClipboardSnapshot::Unavailable
            }
        };

        let result = self.replace_selection(run_id, settings, &snapshot).await;

        // Restore on every path, including failures after the copy
        self.restore(run_id, snapshot).await;
        result
    }

    async fn replace_selection(
        &self,
        run_id: u64,
        settings: &Settings,
        snapshot: &ClipboardSnapshot,
    ) -> Result<String, RunError> {
        let settle = Settle::from_timings(&settings.timings);

        let selection = self.capture(run_id, &settle, snapshot).await?;
        if selection.trim().is_empty() {
            return Err(RunError::EmptySelection);
        }
        debug!(run_id, chars = selection.chars().count(), "selection captured");

        let request = TranslationRequest::new(
            &settings.api_key,
            &settings.model,
            settings.resolve_prompt(),
            selection,
        );
        let translated = self
            .translate(&request, settings.timings.translate_timeout())
            .await?;

        write_clipboard(&self.clipboard, translated.clone())
            .await
            .map_err(RunError::ClipboardWrite)?;
        if let Err(e) = settle.until(&self.clipboard, |text| text == translated).await {
            debug!(run_id, error = %e, "clipboard not readable after write, pasting anyway");
        }

        press(&self.keys, Shortcut::Paste)
            .await
            .map_err(RunError::Paste)?;
        tokio::time::sleep(settings.timings.paste_settle()).await;

        Ok(translated)
    }

    /// Copy the selection and read it back once it lands
    async fn capture(
        &self,
        run_id: u64,
        settle: &Settle,
        snapshot: &ClipboardSnapshot,
    ) -> Result<String, RunError> {
        // Clear a readable clipboard first so an empty selection reads as
        // empty instead of as the stale content
        let baseline = match snapshot.text() {
            Some("") => Some(String::new()),
            Some(previous) => match write_clipboard(&self.clipboard, String::new()).await {
                Ok(()) => Some(String::new()),
                Err(e) => {
                    debug!(run_id, error = %e, "could not clear clipboard before copy");
                    Some(previous.to_string())
                }
            },
            None => None,
        };

        press(&self.keys, Shortcut::Copy)
            .await
            .map_err(RunError::Capture)?;

        // Without a baseline there is no change to poll for
        let selection = match baseline {
            Some(before) => settle.until(&self.clipboard, |text| text != before).await,
            None => settle.full_window(&self.clipboard).await,
        };
        selection.map_err(RunError::SelectionRead)
    }

    async fn translate(
        &self,
        request: &TranslationRequest,
        timeout: Duration,
    ) -> Result<String, RunError> {
        let prompt = request.compose();
        let call = self
            .translator
            .generate(request.api_key(), request.model(), &prompt);

        let text = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(TranslateError::Timeout)) => return Err(RunError::TranslationTimeout(timeout)),
            Ok(Err(e)) => return Err(RunError::TranslationCall(e)),
            Err(_) => return Err(RunError::TranslationTimeout(timeout)),
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(RunError::TranslationCall(TranslateError::Empty));
        }
        Ok(text.to_string())
    }

    async fn restore(&self, run_id: u64, snapshot: ClipboardSnapshot) {
        match snapshot {
            ClipboardSnapshot::Captured(previous) => {
                if let Err(e) = write_clipboard(&self.clipboard, previous).await {
                    warn!(run_id, error = %e, "failed to restore clipboard");
                } else {
                    debug!(run_id, "clipboard restored");
                }
            }
            ClipboardSnapshot::Unavailable => {
                debug!(run_id, "no snapshot, clipboard left as is");
            }
        }
    }

    fn emit(&self, event: RunEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
