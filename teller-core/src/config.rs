//! Configuration management
//!
//! Settings live in `settings.json` inside the teller directory:
//! ```json
//! {
//!   "app": { "backend": "local", "selectedAccount": "..." },
//!   "hosted": { "url": "https://...", "apiKey": "..." }
//! }
//! ```
//! Keys the CLI does not manage are preserved on save.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{Error, Result as CoreResult};

pub const SETTINGS_FILE: &str = "settings.json";

/// Which backend serves identity and data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Hosted,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Local => "local",
            BackendKind::Hosted => "hosted",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "hosted" => Ok(BackendKind::Hosted),
            other => Err(Error::Config(format!(
                "unknown backend '{}' (expected 'local' or 'hosted')",
                other
            ))),
        }
    }
}

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    app: AppSettings,
    #[serde(default)]
    hosted: HostedSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    backend: Option<BackendKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selected_account: Option<Uuid>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostedSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Teller configuration (settings file plus environment overrides)
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub backend: BackendKind,
    pub hosted_url: Option<String>,
    pub hosted_api_key: Option<String>,
    /// Account to select after the session is restored
    pub selected_account: Option<Uuid>,
    // Values as read from the file, so env overrides are never written back
    _raw_settings: SettingsFile,
}

impl Config {
    /// Load config from the teller directory
    ///
    /// `TELLER_BACKEND`, `TELLER_URL` and `TELLER_API_KEY` override the file.
    pub fn load(teller_dir: &Path) -> Result<Self> {
        Self::load_with_env(teller_dir, |key| std::env::var(key).ok())
    }

    /// Load config, resolving overrides through `env`
    pub fn load_with_env(teller_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let settings_path = teller_dir.join(SETTINGS_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            SettingsFile::default()
        };

        let backend = match env("TELLER_BACKEND").filter(|v| !v.is_empty()) {
            Some(value) => value.parse::<BackendKind>()?,
            None => raw.app.backend.unwrap_or_default(),
        };
        let hosted_url = env("TELLER_URL")
            .filter(|v| !v.is_empty())
            .or_else(|| raw.hosted.url.clone());
        let hosted_api_key = env("TELLER_API_KEY")
            .filter(|v| !v.is_empty())
            .or_else(|| raw.hosted.api_key.clone());

        Ok(Self {
            backend,
            hosted_url,
            hosted_api_key,
            selected_account: raw.app.selected_account,
            _raw_settings: raw,
        })
    }

    /// Save config to the teller directory
    ///
    /// Writes the remembered selection and any backend change made through
    /// [`Config::set_backend`]; other settings are preserved.
    pub fn save(&self, teller_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(teller_dir)?;
        let settings_path = teller_dir.join(SETTINGS_FILE);

        // Re-read so keys written by others since load are kept
        let mut settings = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str::<SettingsFile>(&content).unwrap_or_default()
        } else {
            SettingsFile::default()
        };

        settings.app.backend = self._raw_settings.app.backend;
        settings.app.selected_account = self.selected_account;
        settings.hosted.url = self._raw_settings.hosted.url.clone();
        settings.hosted.api_key = self._raw_settings.hosted.api_key.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    /// Switch backends; persisted by the next [`Config::save`]
    pub fn set_backend(&mut self, backend: BackendKind, url: Option<String>, api_key: Option<String>) {
        self.backend = backend;
        self._raw_settings.app.backend = Some(backend);
        if url.is_some() {
            self.hosted_url = url.clone();
            self._raw_settings.hosted.url = url;
        }
        if api_key.is_some() {
            self.hosted_api_key = api_key.clone();
            self._raw_settings.hosted.api_key = api_key;
        }
    }

    /// URL and API key of the hosted backend
    pub fn hosted_credentials(&self) -> CoreResult<(&str, &str)> {
        match (self.hosted_url.as_deref(), self.hosted_api_key.as_deref()) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => Ok((url, key)),
            _ => Err(Error::Config(
                "hosted backend needs a URL and an API key (settings.json or TELLER_URL / TELLER_API_KEY)"
                    .to_string(),
            )),
        }
    }
}
