//! selection-translator: translate highlighted text in place
//!
//! This daemon runs in the background and provides:
//! - A global hotkey (CGEventTap on macOS, rdev elsewhere)
//! - Capture of the current selection through the clipboard
//! - Translation through the Gemini API, pasted over the selection
//! - IPC server for settings, prompts and run events

mod config;
mod desktop;
mod events;
mod hotkey;
mod ipc;
mod lifecycle;
mod orchestrator;
mod translate;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, SettingsStore};
use crate::desktop::{SystemClipboard, SystemKeystrokes};
use crate::events::RunEvent;
use crate::hotkey::{HotkeyBinder, HotkeyListener, SystemKeySource, TriggerCallback};
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::orchestrator::Orchestrator;
use crate::translate::GeminiClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "selection-translator starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.settings_path, "configuration loaded");

    let store = Arc::new(SettingsStore::load(&config.settings_path)?);
    let settings = store.snapshot().await;
    settings
        .validate()
        .with_context(|| format!("edit {}", store.path().display()))?;

    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;

    // Orchestrator -> IPC subscribers and the log
    let (event_tx, _event_rx) = broadcast::channel::<RunEvent>(64);

    let translator = GeminiClient::new(&settings.api_base, settings.timings.translate_timeout())?;
    let clipboard = SystemClipboard::new().context("failed to open the clipboard")?;

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(clipboard),
        Arc::new(SystemKeystrokes),
        Arc::new(translator),
        Arc::clone(&store),
        event_tx.clone(),
    ));

    // Runs on the hook thread; only spawns
    let on_trigger: TriggerCallback = {
        let orchestrator = Arc::clone(&orchestrator);
        let runtime = Handle::current();
        Arc::new(move || orchestrator.trigger(&runtime))
    };

    let binder = Arc::new(HotkeyBinder::new(
        HotkeyListener::new(Arc::new(SystemKeySource)),
        on_trigger,
    ));
    let binding = binder
        .rebind(&settings.hotkey)
        .context("failed to register hotkey - check Accessibility/Input Monitoring permissions")?;
    info!(%binding, model = %settings.model, "hotkey listener started");

    let server = Server::new(
        &config.socket_path,
        ipc::Context::new(
            Arc::clone(&store),
            Arc::clone(&binder),
            Arc::clone(&orchestrator),
            event_tx.clone(),
        ),
    )?;

    let mut log_rx = event_tx.subscribe();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Surface run failures in the log
        _ = async {
            loop {
                match log_rx.recv().await {
                    Ok(event) if event.is_failure() => warn!(%event, "run failed"),
                    Ok(event) => info!(%event, "run event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("event logger exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    // In-flight runs are not joined
    info!("shutting down...");

    binder.unbind();
    server.shutdown().await;

    info!("selection-translator stopped");

    Ok(())
}
