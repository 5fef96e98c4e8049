use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::session::ClientCredentials;

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// client_id = "..."
/// client_secret = "..."
/// username = "me@example.com"
/// refresh_token = "..."
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// App id from https://dev.netatmo.com/apps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Account used by the password grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Last refresh token handed out by the API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Config {
    /// App credentials, or an error explaining how to configure them.
    pub fn credentials(&self) -> Result<ClientCredentials> {
        match (non_empty(&self.client_id), non_empty(&self.client_secret)) {
            (Some(id), Some(secret)) => Ok(ClientCredentials::new(id, secret)),
            _ => Err(anyhow!(
                "No app credentials configured.\n\
                 Hint: run `netatmo configure` and enter your client id and secret."
            )),
        }
    }

    pub fn set_credentials(&mut self, client_id: String, client_secret: String) {
        self.client_id = Some(client_id);
        self.client_secret = Some(client_secret);
    }

    /// Persisted refresh token, if any.
    pub fn refresh_token(&self) -> Option<&str> {
        non_empty(&self.refresh_token)
    }

    /// Remember the latest refresh token. Returns `true` if it changed.
    pub fn store_refresh_token(&mut self, token: Option<String>) -> bool {
        let token = token.filter(|t| !t.is_empty());
        if token.is_none() || token == self.refresh_token {
            return false;
        }
        self.refresh_token = token;
        true
    }

    /// Load config from the platform config dir, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    /// Load config from an explicit file, or return an empty default if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to the platform config dir, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "netatmo", "netatmo-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}
