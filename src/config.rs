//! Application configuration and the store-identifier collaborator.
//!
//! `AppConfig` carries the OAuth client settings plus the two knobs that
//! historically varied between builds: optional API-key initialization and
//! the event read window. The spreadsheet identifier itself lives behind the
//! `ConfigStore` trait so it can be persisted externally (JSON file) or
//! pinned in memory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// OAuth scopes requested at sign-in: identity, profile, spreadsheet
/// read/write, and file creation.
pub const DEFAULT_SCOPES: &[&str] = &[
    "openid",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.file",
];

/// Config-file key holding the active spreadsheet identifier.
pub const SPREADSHEET_ID_KEY: &str = "spreadsheet_id";

/// Which columns the event read fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventWindow {
    /// Read columns A:B only (timestamp + first free-text column),
    /// regardless of the actual schema width. Matches the historical
    /// behavior; columns beyond the second are not fetched.
    TwoColumn,
    /// Read the whole sheet and map every schema column.
    FullSchema,
}

impl Default for EventWindow {
    fn default() -> Self {
        Self::TwoColumn
    }
}

/// Static application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// OAuth client identifier. Empty means the client is unconfigured and
    /// the session moves to `ConfigInvalid`.
    pub client_id: String,
    /// Scopes requested during token acquisition.
    pub scopes: Vec<String>,
    /// Optional API key appended to every store call as the `key` query
    /// parameter. Most deployments leave this unset.
    pub api_key: Option<String>,
    /// Event read window, see [`EventWindow`].
    pub event_window: EventWindow,
}

impl AppConfig {
    /// Build a config with the default scopes and read window.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            api_key: None,
            event_window: EventWindow::default(),
        }
    }

    /// Set an API key (builder pattern).
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the event read window (builder pattern).
    pub fn with_event_window(mut self, window: EventWindow) -> Self {
        self.event_window = window;
        self
    }

    /// Whether the config is usable at all.
    pub fn is_valid(&self) -> bool {
        !self.client_id.trim().is_empty()
    }
}

/// Errors from the config store.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(String),

    #[error("failed to write config file: {0}")]
    Write(String),

    #[error("config file is not valid JSON: {0}")]
    Parse(String),
}

/// Persistence seam for the store identifier.
///
/// Implementations are read once at startup and written whenever the user
/// changes the identifier.
pub trait ConfigStore: Send + Sync {
    /// The configured spreadsheet identifier, if any.
    fn get(&self) -> Option<String>;

    /// Persist a new spreadsheet identifier.
    fn set(&self, value: &str) -> Result<(), ConfigError>;
}

/// JSON-file config store under the user config directory.
///
/// The file is a flat string map so unrelated keys written by other versions
/// survive a round-trip.
pub struct JsonFileConfigStore {
    path: PathBuf,
}

impl JsonFileConfigStore {
    /// Store backed by an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location, `<config dir>/sheetlog/config.json`.
    /// `None` when the platform has no config directory.
    pub fn default_location() -> Option<Self> {
        dirs::config_dir().map(|dir| Self::at(dir.join("sheetlog").join("config.json")))
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, ConfigError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::Read(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn save(&self, map: &HashMap<String, String>) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write(e.to_string()))?;
        }
        let raw = serde_json::to_string_pretty(map).map_err(|e| ConfigError::Write(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| ConfigError::Write(e.to_string()))
    }
}

impl ConfigStore for JsonFileConfigStore {
    fn get(&self) -> Option<String> {
        match self.load() {
            Ok(map) => map.get(SPREADSHEET_ID_KEY).cloned().filter(|v| !v.is_empty()),
            Err(e) => {
                crate::warn!("Failed to load config file: {}", e);
                None
            }
        }
    }

    fn set(&self, value: &str) -> Result<(), ConfigError> {
        let mut map = self.load().unwrap_or_default();
        map.insert(SPREADSHEET_ID_KEY.to_string(), value.to_string());
        self.save(&map)
    }
}

/// In-memory config store, used by tests and by builds that pin a fixed
/// spreadsheet identifier.
#[derive(Default)]
pub struct MemoryConfigStore {
    value: parking_lot::Mutex<Option<String>>,
}

impl MemoryConfigStore {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            value: parking_lot::Mutex::new(initial),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self) -> Option<String> {
        self.value.lock().clone()
    }

    fn set(&self, value: &str) -> Result<(), ConfigError> {
        *self.value.lock() = Some(value.to_string());
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
