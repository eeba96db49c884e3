//! Unix domain socket server for IPC
//!
//! Provides request-response control of the running daemon and pushes run
//! events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, Prompt, SettingsStore, DEFAULT_PROMPT_TITLE};
use crate::events::RunEvent;
use crate::hotkey::HotkeyBinder;
use crate::orchestrator::Orchestrator;

use super::protocol::{DaemonStatus, Notification, Request, Response};

const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Everything a request may read or change
#[derive(Clone)]
pub struct Context {
    pub store: Arc<SettingsStore>,
    pub binder: Arc<HotkeyBinder>,
    pub orchestrator: Arc<Orchestrator>,
    pub events: broadcast::Sender<RunEvent>,
    started: Instant,
    /// Held across a hotkey swap and its save
    rebinding: Arc<Mutex<()>>,
}

impl Context {
    pub fn new(
        store: Arc<SettingsStore>,
        binder: Arc<HotkeyBinder>,
        orchestrator: Arc<Orchestrator>,
        events: broadcast::Sender<RunEvent>,
    ) -> Self {
        Self {
            store,
            binder,
            orchestrator,
            events,
            started: Instant::now(),
            rebinding: Arc::new(Mutex::new(())),
        }
    }
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    context: Context,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket, replacing a stale one
    pub fn new(socket_path: &Path, context: Context) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only (0600)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            context,
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = self.context.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, context) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Disconnect clients and remove the socket file
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Serve one client until it disconnects
///
/// Requests are read on a separate task so a frame is never abandoned
/// half-read when an event is pushed.
async fn handle_client(stream: UnixStream, context: Context) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let (request_tx, mut request_rx) = mpsc::channel::<Request>(8);

    let read_task = tokio::spawn(async move {
        loop {
            match read_message(&mut reader).await {
                Ok(Some(request)) => {
                    if request_tx.send(request).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("client disconnected");
                    break;
                }
                Err(e) => {
                    warn!(?e, "failed to read request");
                    break;
                }
            }
        }
    });

    let mut events: Option<broadcast::Receiver<RunEvent>> = None;

    let result = loop {
        tokio::select! {
            request = request_rx.recv() => {
                let Some(request) = request else { break Ok(()) };
                debug!(?request, "received request");

                if request == Request::Subscribe && events.is_none() {
                    events = Some(context.events.subscribe());
                    debug!("client subscribed to notifications");
                }

                let response = process_request(request, &context).await;
                if let Err(e) = send_message(&mut writer, &response).await {
                    break Err(e);
                }
            }
            event = next_event(&mut events) => {
                match event {
                    Ok(event) => {
                        let note = Notification::Event { event };
                        if let Err(e) = send_message(&mut writer, &note).await {
                            break Err(e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        events = None;
                    }
                }
            }
        }
    };

    read_task.abort();
    result
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<RunEvent>>,
) -> Result<RunEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read one length-prefixed JSON message; `None` on a clean disconnect
async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: serde::de::DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("message too large ({} bytes)", len);
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;

    let message = serde_json::from_slice(&msg_buf).context("failed to parse message")?;
    Ok(Some(message))
}

/// Send a length-prefixed JSON message
async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

/// Process a request and return a response
async fn process_request(request: Request, context: &Context) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::GetStatus => Response::Status(status(context).await),

        Request::Subscribe => Response::Subscribed,

        Request::Trigger => {
            info!("run triggered via IPC");
            context.orchestrator.trigger(&Handle::current());
            Response::Ok
        }

        Request::Rebind { hotkey } => rebind(context, hotkey).await,

        Request::SetModel { model } => {
            let model = model.trim().to_string();
            let result = context
                .store
                .update(|settings| {
                    if model.is_empty() {
                        return Err(ConfigError::MissingModel);
                    }
                    settings.model = model.clone();
                    Ok(())
                })
                .await;
            if result.is_ok() {
                info!(%model, "model changed via IPC");
            }
            respond(result)
        }

        Request::SetApiKey { api_key } => {
            let api_key = api_key.trim().to_string();
            let result = context
                .store
                .update(|settings| {
                    if api_key.is_empty() {
                        return Err(ConfigError::MissingApiKey);
                    }
                    settings.api_key = api_key;
                    Ok(())
                })
                .await;
            if result.is_ok() {
                info!("API key changed via IPC");
            }
            respond(result)
        }

        Request::ListPrompts => {
            let settings = context.store.snapshot().await;
            Response::Prompts {
                prompts: settings.prompt_titles(),
                selected: settings.selected_prompt,
            }
        }

        Request::SelectPrompt { index } => {
            respond(context.store.update(|settings| settings.select_prompt(index)).await)
        }

        Request::AddPrompt { title, text } => {
            let result = context
                .store
                .update(|settings| Ok(settings.add_prompt(Prompt::new(title, text)?)))
                .await;
            match result {
                Ok(index) => {
                    info!(index, "prompt added");
                    Response::Ok
                }
                Err(e) => e.into(),
            }
        }

        Request::UpdatePrompt { index, title, text } => respond(
            context
                .store
                .update(|settings| settings.update_prompt(index, Prompt::new(title, text)?))
                .await,
        ),

        Request::DeletePrompt { index } => {
            let result = context.store.update(|settings| settings.delete_prompt(index)).await;
            match result {
                Ok(prompt) => {
                    info!(index, title = %prompt.title, "prompt deleted");
                    Response::Ok
                }
                Err(e) => e.into(),
            }
        }
    }
}

fn respond(result: Result<(), ConfigError>) -> Response {
    match result {
        Ok(()) => Response::Ok,
        Err(e) => e.into(),
    }
}

async fn status(context: &Context) -> DaemonStatus {
    let settings = context.store.snapshot().await;
    let selected_prompt = settings
        .prompt_titles()
        .into_iter()
        .nth(settings.selected_prompt)
        .unwrap_or_else(|| DEFAULT_PROMPT_TITLE.to_string());

    DaemonStatus {
        hotkey: context
            .binder
            .current()
            .map(|binding| binding.to_string())
            .unwrap_or_default(),
        hotkey_registered: context.binder.is_bound(),
        model: settings.model,
        selected_prompt,
        uptime_secs: context.started.elapsed().as_secs(),
        runs: context.orchestrator.stats(),
        ..DaemonStatus::default()
    }
}

/// Swap the hotkey and persist it as one transition
///
/// If the save fails the previous binding is put back, so the live hotkey
/// always matches the settings file.
async fn rebind(context: &Context, hotkey: String) -> Response {
    let _transition = context.rebinding.lock().await;
    let previous = context.binder.current();

    let binder = Arc::clone(&context.binder);
    let bound = tokio::task::spawn_blocking(move || binder.rebind(&hotkey)).await;
    let binding = match bound {
        Ok(Ok(binding)) => binding,
        Ok(Err(e)) => return e.into(),
        Err(e) => return Response::error("binding_unavailable", e.to_string()),
    };
    let hotkey = binding.to_string();

    let saved = context
        .store
        .update(|settings| {
            settings.hotkey = hotkey.clone();
            Ok(())
        })
        .await;

    if let Err(e) = saved {
        warn!(%hotkey, ?e, "hotkey not saved, restoring previous binding");
        let binder = Arc::clone(&context.binder);
        let restored = tokio::task::spawn_blocking(move || match previous {
            Some(previous) => binder.rebind(&previous.to_string()).map(|_| ()),
            None => {
                binder.unbind();
                Ok(())
            }
        })
        .await;
        if !matches!(restored, Ok(Ok(()))) {
            error!(?restored, "failed to restore previous hotkey");
        }
        return e.into();
    }

    let _ = context.events.send(RunEvent::BindingChanged { hotkey });
    Response::Ok
}
