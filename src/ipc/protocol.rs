//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::events::RunEvent;
use crate::hotkey::HotkeyError;
use crate::orchestrator::RunStatsSnapshot;

/// Requests from a control client to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Subscribe to run event notifications
    Subscribe,

    /// Start a run as if the hotkey had been pressed
    Trigger,

    /// Listen for a different key combination
    Rebind { hotkey: String },

    SetModel { model: String },

    /// Replace the Gemini credential; the next run uses it
    SetApiKey { api_key: String },

    ListPrompts,

    /// 0 selects the built-in prompt
    SelectPrompt { index: usize },

    AddPrompt { title: String, text: String },

    UpdatePrompt {
        index: usize,
        title: String,
        text: String,
    },

    DeletePrompt { index: usize },
}

/// Responses from the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Subscription confirmed
    Subscribed,

    /// Prompt titles in display order, the built-in one first
    Prompts { prompts: Vec<String>, selected: usize },

    Ok,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<ConfigError> for Response {
    fn from(e: ConfigError) -> Self {
        let code = match &e {
            ConfigError::ImmutablePrompt => "immutable_prompt",
            ConfigError::InvalidIndex(_) => "invalid_index",
            ConfigError::InvalidPrompt(_) => "invalid_prompt",
            ConfigError::MissingApiKey | ConfigError::MissingModel => "invalid_settings",
            ConfigError::Io { .. } | ConfigError::Parse { .. } => "settings_io",
        };
        Response::error(code, e.to_string())
    }
}

impl From<HotkeyError> for Response {
    fn from(e: HotkeyError) -> Self {
        let code = match &e {
            HotkeyError::InvalidBinding { .. } => "invalid_binding",
            _ => "binding_unavailable",
        };
        Response::error(code, e.to_string())
    }
}

/// Push notification to subscribed clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Event { event: RunEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Bound key combination, empty when nothing is bound
    pub hotkey: String,

    /// Whether hotkey is registered
    pub hotkey_registered: bool,

    pub model: String,

    /// Title of the prompt the next run will use
    pub selected_prompt: String,

    /// Uptime in seconds
    pub uptime_secs: u64,

    pub runs: RunStatsSnapshot,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            hotkey: String::new(),
            hotkey_registered: false,
            model: String::new(),
            selected_prompt: String::new(),
            uptime_secs: 0,
            runs: RunStatsSnapshot::default(),
        }
    }
}
