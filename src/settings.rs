use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_FILE: &str = "settings.json";
const APP_DIR: &str = "valorant-rpc";

/// Discord application that owns the VALORANT artwork
const DEFAULT_DISCORD_APP_ID: i64 = 803787465726623754;

const MIN_REQUEST_TIMEOUT_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Riot Client lockfile; defaults to the standard install location
    pub lockfile_path: Option<PathBuf>,
    pub poll_interval_secs: u64,
    /// Timeout for every request to the local client
    pub request_timeout_ms: u64,
    /// Re-resolve on websocket pushes instead of only on the poll timer
    pub live_updates: bool,
    pub discord_app_id: i64,
    /// Riot product whose presence is published
    pub product: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            lockfile_path: None,
            poll_interval_secs: 20,
            request_timeout_ms: 2000,
            live_updates: true,
            discord_app_id: DEFAULT_DISCORD_APP_ID,
            product: "valorant".to_string(),
        }
    }
}

impl AppSettings {
    pub fn lockfile_path(&self) -> PathBuf {
        self.lockfile_path
            .clone()
            .unwrap_or_else(default_lockfile_path)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(MIN_REQUEST_TIMEOUT_MS))
    }
}

/// `%LOCALAPPDATA%\Riot Games\Riot Client\Config\lockfile` on Windows
pub fn default_lockfile_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Riot Games")
        .join("Riot Client")
        .join("Config")
        .join("lockfile")
}

fn get_settings_path() -> Result<PathBuf, String> {
    let config_dir = dirs::config_dir().ok_or("Failed to get config directory")?;
    Ok(config_dir.join(APP_DIR).join(SETTINGS_FILE))
}

pub fn load_settings() -> Result<AppSettings, String> {
    let path = get_settings_path()?;
    load_settings_from(&path)
}

fn load_settings_from(path: &Path) -> Result<AppSettings, String> {
    tracing::debug!("Loading settings from {}", path.display());

    if !path.exists() {
        return Ok(AppSettings::default());
    }

    let contents =
        fs::read_to_string(path).map_err(|e| format!("Failed to read settings file: {}", e))?;

    serde_json::from_str(&contents).map_err(|e| format!("Failed to parse settings: {}", e))
}
