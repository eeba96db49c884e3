//! Configuration loading and management
//!
//! [`Config`] holds the runtime paths derived from the environment;
//! [`Settings`] is the user-editable JSON file (API key, model, hotkey,
//! prompts, timings) kept behind a [`SettingsStore`].

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::translate::GEMINI_API_BASE;

pub const DEFAULT_PROMPT_TITLE: &str = "Default";

pub const DEFAULT_PROMPT_TEXT: &str = "Translate this text to English and fix any grammar or spelling errors.
If the text is already in English, just correct any errors.
If it's in Armenian (including transliterated Armenian), translate to English.
Return only the corrected/translated text without any additional comments or explanations.";

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_HOTKEY: &str = "rshift";

const APP_DIR: &str = "selection-translator";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the JSON settings file
    pub settings_path: PathBuf,

    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = PathBuf::from(std::env::var("HOME")?);
        let data_dir = home.join(".local").join("share").join(APP_DIR);

        let settings_path = match std::env::var_os("SELECTION_TRANSLATOR_CONFIG") {
            Some(path) => PathBuf::from(path),
            None => {
                let config_home = std::env::var_os("XDG_CONFIG_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| home.join(".config"));
                config_home.join(APP_DIR).join("settings.json")
            }
        };

        let socket_path = data_dir.join("translator.sock");

        Ok(Self {
            settings_path,
            socket_path,
            data_dir,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no API key configured - set api_key in the settings file or GEMINI_API_KEY")]
    MissingApiKey,

    #[error("no model configured")]
    MissingModel,

    #[error("invalid prompt: {0}")]
    InvalidPrompt(&'static str),

    #[error("no prompt at index {0}")]
    InvalidIndex(usize),

    #[error("the default prompt cannot be changed")]
    ImmutablePrompt,
}

/// A user-defined prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub title: String,
    pub text: String,
}

impl Prompt {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Result<Self, ConfigError> {
        let prompt = Self {
            title: title.into().trim().to_string(),
            text: text.into().trim().to_string(),
        };
        if prompt.title.is_empty() {
            return Err(ConfigError::InvalidPrompt("title is required"));
        }
        if prompt.text.is_empty() {
            return Err(ConfigError::InvalidPrompt("prompt text is required"));
        }
        Ok(prompt)
    }
}

/// What to do with a trigger that arrives while a run is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Ignore the new trigger
    #[default]
    Drop,
    /// Start it once the active run finishes
    Queue,
    /// Run concurrently; clipboard is last-write-wins
    Allow,
}

/// How to wait for the clipboard to catch up with a keystroke or write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettleMode {
    /// Sleep for the whole settle window
    Fixed,
    /// Poll for the expected change, bounded by the settle window
    #[default]
    Poll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub settle: SettleMode,
    /// Settle window after the copy keystroke and after writing the result
    pub copy_settle_ms: u64,
    pub poll_interval_ms: u64,
    /// Wait after the paste keystroke before restoring
    pub paste_settle_ms: u64,
    pub translate_timeout_secs: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle: SettleMode::Poll,
            copy_settle_ms: 150,
            poll_interval_ms: 15,
            paste_settle_ms: 100,
            translate_timeout_secs: 20,
        }
    }
}

impl Timings {
    pub fn copy_settle(&self) -> Duration {
        Duration::from_millis(self.copy_settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn paste_settle(&self) -> Duration {
        Duration::from_millis(self.paste_settle_ms)
    }

    pub fn translate_timeout(&self) -> Duration {
        Duration::from_secs(self.translate_timeout_secs.max(1))
    }
}

/// User settings persisted as JSON
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_key: String,
    pub model: String,
    pub hotkey: String,
    pub prompts: Vec<Prompt>,
    /// 0 is the built-in default; `i` selects `prompts[i - 1]`
    pub selected_prompt: usize,
    pub api_base: String,
    pub overlap: OverlapPolicy,
    pub timings: Timings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            hotkey: DEFAULT_HOTKEY.to_string(),
            prompts: Vec::new(),
            selected_prompt: 0,
            api_base: GEMINI_API_BASE.to_string(),
            overlap: OverlapPolicy::default(),
            timings: Timings::default(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("hotkey", &self.hotkey)
            .field("prompts", &self.prompts.len())
            .field("selected_prompt", &self.selected_prompt)
            .field("api_base", &self.api_base)
            .field("overlap", &self.overlap)
            .field("timings", &self.timings)
            .finish()
    }
}

impl Settings {
    /// Check the values a run cannot do without
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingModel);
        }
        Ok(())
    }

    /// Prompt text for the selected index, falling back to the default
    pub fn resolve_prompt(&self) -> &str {
        self.prompt_at(self.selected_prompt)
            .map(|prompt| prompt.text.as_str())
            .unwrap_or(DEFAULT_PROMPT_TEXT)
    }

    fn prompt_at(&self, index: usize) -> Option<&Prompt> {
        index.checked_sub(1).and_then(|i| self.prompts.get(i))
    }

    /// All prompts by index, the default first
    pub fn prompt_titles(&self) -> Vec<String> {
        std::iter::once(DEFAULT_PROMPT_TITLE.to_string())
            .chain(self.prompts.iter().map(|p| p.title.clone()))
            .collect()
    }

    pub fn select_prompt(&mut self, index: usize) -> Result<(), ConfigError> {
        if index > self.prompts.len() {
            return Err(ConfigError::InvalidIndex(index));
        }
        self.selected_prompt = index;
        Ok(())
    }

    /// Append a prompt, returning its index
    pub fn add_prompt(&mut self, prompt: Prompt) -> usize {
        self.prompts.push(prompt);
        self.prompts.len()
    }

    pub fn update_prompt(&mut self, index: usize, prompt: Prompt) -> Result<(), ConfigError> {
        let slot = self.user_prompt_mut(index)?;
        *slot = prompt;
        Ok(())
    }

    /// Remove a prompt, keeping the selection on the same prompt when it
    /// survives and falling back to the default when it doesn't
    pub fn delete_prompt(&mut self, index: usize) -> Result<Prompt, ConfigError> {
        self.user_prompt_mut(index)?;
        let removed = self.prompts.remove(index - 1);

        if self.selected_prompt == index {
            self.selected_prompt = 0;
        } else if self.selected_prompt > index {
            self.selected_prompt -= 1;
        }
        Ok(removed)
    }

    fn user_prompt_mut(&mut self, index: usize) -> Result<&mut Prompt, ConfigError> {
        if index == 0 {
            return Err(ConfigError::ImmutablePrompt);
        }
        self.prompts
            .get_mut(index - 1)
            .ok_or(ConfigError::InvalidIndex(index))
    }
}

/// Settings file plus the in-memory copy every run reads from
pub struct SettingsStore {
    path: PathBuf,
    settings: RwLock<Settings>,
    /// The key came from GEMINI_API_KEY and must not be written to disk
    env_api_key: AtomicBool,
}

impl SettingsStore {
    /// Read the settings file, creating it with defaults when missing or empty
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = match std::fs::read_to_string(path) {
            Ok(contents) if !contents.trim().is_empty() => serde_json::from_str::<Settings>(&contents)
                .map_err(|source| ConfigError::Parse {
                    path: path.to_owned(),
                    source,
                })?,
            Ok(_) => Self::create_default(path)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::create_default(path)?,
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_owned(),
                    source,
                })
            }
        };

        let mut env_api_key = false;
        if settings.api_key.trim().is_empty() {
            if let Ok(key) = std::env::var("GEMINI_API_KEY") {
                settings.api_key = key;
                env_api_key = true;
            }
        }

        info!(?path, ?settings, "settings loaded");

        Ok(Self {
            path: path.to_owned(),
            settings: RwLock::new(settings),
            env_api_key: AtomicBool::new(env_api_key),
        })
    }

    /// Wrap settings that already exist in memory
    pub fn new(path: &Path, settings: Settings) -> Self {
        Self {
            path: path.to_owned(),
            settings: RwLock::new(settings),
            env_api_key: AtomicBool::new(false),
        }
    }

    fn create_default(path: &Path) -> Result<Settings, ConfigError> {
        let settings = Settings::default();
        write_settings(path, &settings)?;
        info!(?path, "default settings written");
        Ok(settings)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cloned view for one run
    pub async fn snapshot(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Apply `change` to a draft and persist it; nothing changes if either fails
    pub async fn update<T>(
        &self,
        change: impl FnOnce(&mut Settings) -> Result<T, ConfigError>,
    ) -> Result<T, ConfigError> {
        let mut settings = self.settings.write().await;
        let mut draft = settings.clone();
        let out = change(&mut draft)?;

        // A key set through `update` belongs in the file
        let from_env = self.env_api_key.load(Ordering::SeqCst) && draft.api_key == settings.api_key;
        let mut on_disk = draft.clone();
        if from_env {
            on_disk.api_key.clear();
        }
        if let Err(e) = write_settings(&self.path, &on_disk) {
            warn!(?e, "failed to save settings");
            return Err(e);
        }

        self.env_api_key.store(from_env, Ordering::SeqCst);
        *settings = draft;
        Ok(out)
    }
}

fn write_settings(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_owned(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })?;
    std::fs::write(path, json).map_err(io_err)
}
