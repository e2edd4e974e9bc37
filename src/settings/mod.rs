use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR: &str = "ecotrack";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Where the token pair is persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorageKind {
    #[default]
    Keyring,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub timezone: String, // IANA zone sent with new reminders
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timezone: "Europe/Paris".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthSettings {
    pub token_storage: TokenStorageKind,
    /// How long a request parked behind an in-flight refresh may wait.
    /// `None` waits until the refresh settles.
    pub refresh_wait_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushSettings {
    pub frontend_base_url: String,
    pub vapid_public_key: Option<String>,
    pub default_icon: String,
    pub default_badge: String,
    pub default_tag: String,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            frontend_base_url: "http://localhost:4200".to_string(),
            vapid_public_key: None,
            default_icon: "/assets/icons/icon-192x192.png".to_string(),
            default_badge: "/assets/icons/badge-72x72.png".to_string(),
            default_tag: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClientSettings {
    pub api: ApiSettings,
    pub auth: AuthSettings,
    pub push: PushSettings,
}

/// Per-user directory holding settings and file-backed storage.
pub fn data_dir() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"));
    config_dir.join(APP_DIR)
}

fn get_settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

pub fn load_settings() -> Result<ClientSettings, SettingsError> {
    let mut settings = load_settings_from(&get_settings_path())?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

pub fn load_settings_from(path: &Path) -> Result<ClientSettings, SettingsError> {
    if !path.exists() {
        return Ok(ClientSettings::default());
    }

    let contents = std::fs::read_to_string(path)?;
    let settings = serde_json::from_str(&contents)?;
    Ok(settings)
}

pub fn save_settings(settings: &ClientSettings) -> Result<(), SettingsError> {
    save_settings_to(&get_settings_path(), settings)
}

pub fn save_settings_to(path: &Path, settings: &ClientSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, contents)?;

    log::info!("Settings saved to {:?}", path);
    Ok(())
}

/// `ECOTRACK_API_URL` and `ECOTRACK_FRONTEND_URL` win over the file.
fn apply_env_overrides(settings: &mut ClientSettings) {
    if let Ok(url) = std::env::var("ECOTRACK_API_URL") {
        if !url.trim().is_empty() {
            settings.api.base_url = url;
        }
    }
    if let Ok(url) = std::env::var("ECOTRACK_FRONTEND_URL") {
        if !url.trim().is_empty() {
            settings.push.frontend_base_url = url;
        }
    }
}
