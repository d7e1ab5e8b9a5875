use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::errors::{SyncError, SyncResult};

const APP_DIR: &str = "oncall-calendar-sync";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub xmatters: XmattersConfig,
    #[serde(default)]
    pub google_calendar: GoogleCalendarConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct XmattersConfig {
    /// Instance host, e.g. "acme.xmatters.com"
    pub domain: String,
    pub api_key: String,
    pub api_secret: String,
    /// Your xMatters user id; matched against member external keys
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GoogleCalendarConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Display name of the calendar that mirrors the rotation
    pub calendar_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// How many months of rotation to mirror
    pub horizon_months: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for GoogleCalendarConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:8080/auth/callback".to_string(),
            calendar_name: "On Call".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { horizon_months: 3 }
    }
}

impl Config {
    /// Load from the standard location, writing defaults on first run
    pub async fn load() -> Result<Config> {
        let config_path = Self::get_config_path()?;
        let mut config = Self::load_from(&config_path).await?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub async fn load_from(config_path: &Path) -> Result<Config> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .await
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let config: Config = toml::from_str(&content)
                .map_err(SyncError::from)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            debug!("Loaded configuration from {:?}", config_path);
            Ok(config)
        } else {
            info!("Config file not found, creating default configuration");
            let default_config = Config::default();
            default_config.save_to(config_path).await?;
            Ok(default_config)
        }
    }

    /// Environment values win over the file for anything secret or per-host
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides: [(&str, &mut String); 6] = [
            ("XMATTERS_DOMAIN", &mut self.xmatters.domain),
            ("XMATTERS_API_KEY", &mut self.xmatters.api_key),
            ("XMATTERS_API_SECRET", &mut self.xmatters.api_secret),
            ("XMATTERS_USERNAME", &mut self.xmatters.username),
            ("GOOGLE_CLIENT_ID", &mut self.google_calendar.client_id),
            ("GOOGLE_CLIENT_SECRET", &mut self.google_calendar.client_secret),
        ];

        for (key, slot) in overrides {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                debug!("Using {} from environment", key);
                *slot = value.trim().to_string();
            }
        }
    }

    pub async fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path).await
    }

    pub async fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, content)
            .await
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR);

        Ok(config_dir.join("config.toml"))
    }

    pub fn get_data_dir() -> Result<PathBuf> {
        let base = dirs::data_local_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local/share")))
            .context("Failed to get data directory")?;

        Ok(base.join(APP_DIR))
    }

    /// Check everything the schedule client needs before any request is made
    pub fn validate_xmatters(&self) -> SyncResult<()> {
        require("xmatters.domain", &self.xmatters.domain)?;
        require("xmatters.api_key", &self.xmatters.api_key)?;
        require("xmatters.api_secret", &self.xmatters.api_secret)?;
        require("xmatters.username", &self.xmatters.username)
    }

    pub fn validate_google(&self) -> SyncResult<()> {
        require("google_calendar.client_id", &self.google_calendar.client_id)?;
        require("google_calendar.client_secret", &self.google_calendar.client_secret)?;
        require("google_calendar.calendar_name", &self.google_calendar.calendar_name)
    }

    /// Months of rotation to mirror; never less than one
    pub fn get_horizon(&self) -> u32 {
        self.sync.horizon_months.max(1)
    }
}

fn require(field: &str, value: &str) -> SyncResult<()> {
    if value.trim().is_empty() {
        Err(SyncError::missing(field))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete_config() -> Config {
        let mut config = Config::default();
        config.xmatters = XmattersConfig {
            domain: "acme.xmatters.com".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            username: "alice".to_string(),
        };
        config.google_calendar.client_id = "client.apps.googleusercontent.com".to_string();
        config.google_calendar.client_secret = "shh".to_string();
        config
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
[xmatters]
domain = "acme.xmatters.com"
username = "alice"
"#,
        )
        .unwrap();

        assert_eq!(config.xmatters.domain, "acme.xmatters.com");
        assert_eq!(config.google_calendar.calendar_name, "On Call");
        assert_eq!(config.sync.horizon_months, 3);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_validate_reports_first_missing_field() {
        let mut config = complete_config();
        assert!(config.validate_xmatters().is_ok());
        assert!(config.validate_google().is_ok());

        config.xmatters.api_secret = "  ".to_string();
        assert_eq!(
            config.validate_xmatters(),
            Err(SyncError::missing("xmatters.api_secret"))
        );

        config.google_calendar.client_id.clear();
        assert_eq!(
            config.validate_google(),
            Err(SyncError::missing("google_calendar.client_id"))
        );
    }

    #[test]
    fn test_environment_overrides_secrets() {
        let env: HashMap<&str, &str> = [
            ("XMATTERS_API_SECRET", "from-env"),
            ("GOOGLE_CLIENT_ID", " id-from-env "),
            ("XMATTERS_USERNAME", ""),
        ]
        .into_iter()
        .collect();

        let mut config = complete_config();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.xmatters.api_secret, "from-env");
        assert_eq!(config.google_calendar.client_id, "id-from-env");
        // blank values never clobber the file
        assert_eq!(config.xmatters.username, "alice");
    }

    #[test]
    fn test_horizon_is_at_least_one_month() {
        let mut config = complete_config();
        config.sync.horizon_months = 0;
        assert_eq!(config.get_horizon(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).await.unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = complete_config();
        config.sync.horizon_months = 6;
        config.save_to(&path).await.unwrap();

        let loaded = Config::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
    }
}
