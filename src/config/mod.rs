pub mod connection_config;

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::config::connection_config::{ConnectionConfig, TimingConfig};
use crate::core::camera::ScanParams;
use crate::utils::ensure_directory_exists;

const CONFIG_DIR_NAME: &str = "camera-remote-bridge";
const CONFIG_FILE_NAME: &str = "config.json";

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Maximum level: error, warn, info, debug or trace
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan: ScanParams,
    pub connection: ConnectionConfig,
    pub timing: TimingConfig,
    pub logging: LogConfig,
}

impl AppConfig {
    /// `<config dir>/camera-remote-bridge/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Loads the config from a configuration file, or the defaults if there is none.
    pub async fn load_config(file_path: &Path) -> Result<Self> {
        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Loads the config, writing the defaults first if the file does not exist yet.
    pub async fn load_or_create(file_path: &Path) -> Result<Self> {
        if file_path.exists() {
            return Self::load_config(file_path).await;
        }

        let config = Self::default();
        if let Err(e) = config.save_config(file_path).await {
            warn!("Could not write default config to {:?}: {}", file_path, e);
        }
        Ok(config)
    }

    /// Saves the current config to a configuration file.
    pub async fn save_config(&self, file_path: &Path) -> Result<()> {
        if let Some(config_dir) = file_path.parent() {
            ensure_directory_exists(config_dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;
        info!("Config saved to {:?}.", file_path);
        Ok(())
    }
}
