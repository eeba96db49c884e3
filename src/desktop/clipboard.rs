//! System clipboard access
//!
//! On X11 the clipboard content is served by the handle that set it, so the
//! daemon keeps one `arboard` handle alive on a dedicated thread and sends it
//! every read and write.

use std::sync::mpsc;
use std::thread;

use arboard::Clipboard as Arboard;
use thiserror::Error;
use tracing::{debug, info};

/// Clipboard errors
#[derive(Debug, Clone, Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read clipboard: {0}")]
    Read(String),

    #[error("failed to write clipboard: {0}")]
    Write(String),
}

/// Process-wide text clipboard
///
/// An empty clipboard reads as `""`; writing `""` clears it.
pub trait Clipboard: Send + Sync {
    fn read(&self) -> Result<String, ClipboardError>;

    fn write(&self, text: &str) -> Result<(), ClipboardError>;
}

/// The operations the clipboard thread needs from its handle
trait Backend {
    fn get_text(&mut self) -> Result<String, ClipboardError>;

    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError>;

    fn clear(&mut self) -> Result<(), ClipboardError>;
}

impl Backend for Arboard {
    fn get_text(&mut self) -> Result<String, ClipboardError> {
        match Arboard::get_text(self) {
            Ok(text) => Ok(text),
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            Err(e) => Err(ClipboardError::Read(e.to_string())),
        }
    }

    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        Arboard::set_text(self, text).map_err(|e| ClipboardError::Write(e.to_string()))
    }

    fn clear(&mut self) -> Result<(), ClipboardError> {
        Arboard::clear(self).map_err(|e| ClipboardError::Write(e.to_string()))
    }
}

enum Op {
    Read(mpsc::Sender<Result<String, ClipboardError>>),
    Write(String, mpsc::Sender<Result<(), ClipboardError>>),
}

/// Clipboard backed by one long-lived `arboard` handle
///
/// The handle lives on its own thread until this value is dropped.
pub struct SystemClipboard {
    ops: mpsc::Sender<Op>,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, ClipboardError> {
        Self::spawn(|| Arboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string())))
    }

    fn spawn<B, F>(open: F) -> Result<Self, ClipboardError>
    where
        B: Backend,
        F: FnOnce() -> Result<B, ClipboardError> + Send + 'static,
    {
        let (ops, rx) = mpsc::channel::<Op>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), ClipboardError>>();

        thread::Builder::new()
            .name("clipboard".to_string())
            .spawn(move || {
                let mut backend = match open() {
                    Ok(backend) => backend,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                info!("clipboard thread started");

                for op in rx {
                    match op {
                        Op::Read(reply) => {
                            let _ = reply.send(backend.get_text());
                        }
                        Op::Write(text, reply) => {
                            let result = if text.is_empty() {
                                backend.clear()
                            } else {
                                backend.set_text(&text)
                            };
                            let _ = reply.send(result);
                        }
                    }
                }

                debug!("clipboard thread stopped");
            })
            .map_err(|e| ClipboardError::Unavailable(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| ClipboardError::Unavailable("clipboard thread exited".to_string()))??;

        Ok(Self { ops })
    }

    fn gone() -> ClipboardError {
        ClipboardError::Unavailable("clipboard thread exited".to_string())
    }
}

impl Clipboard for SystemClipboard {
    fn read(&self) -> Result<String, ClipboardError> {
        let (reply, rx) = mpsc::channel();
        self.ops.send(Op::Read(reply)).map_err(|_| Self::gone())?;
        rx.recv().map_err(|_| Self::gone())?
    }

    fn write(&self, text: &str) -> Result<(), ClipboardError> {
        let (reply, rx) = mpsc::channel();
        self.ops
            .send(Op::Write(text.to_string(), reply))
            .map_err(|_| Self::gone())?;
        rx.recv().map_err(|_| Self::gone())?
    }
}
