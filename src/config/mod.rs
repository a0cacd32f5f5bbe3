//! Configuration management for Hydra

pub mod schema;

pub use schema::Config;

use crate::error::{HydraError, HydraResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

impl Config {
    /// Resolve the binary cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| ConfigManager::state_dir().join("cache"))
    }

    /// Resolve the plugin directory
    pub fn plugin_dir(&self) -> PathBuf {
        self.plugins
            .dir
            .clone()
            .unwrap_or_else(ConfigManager::default_plugin_dir)
    }

    /// Resolve the root directory for devnet homes
    pub fn devnets_dir(&self) -> PathBuf {
        self.devnet
            .home_root
            .clone()
            .unwrap_or_else(|| ConfigManager::state_dir().join("devnets"))
    }
}

/// Configuration manager
///
/// Loads and saves the on-disk config file. Provided for the CLI layer;
/// the core only ever receives the resulting `Config` value.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a manager for the default config location
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a manager reading and writing an explicit path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Default config file location
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hydra")
            .join("config.toml")
    }

    /// Root of hydra's state directory
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hydra")
    }

    /// Plugin directory scanned when the config does not override it
    pub fn default_plugin_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hydra")
            .join("plugins")
    }

    /// Load the config, falling back to defaults when the file is absent
    pub async fn load(&self) -> HydraResult<Config> {
        if !self.config_path.exists() {
            debug!("No config at {}, using defaults", self.config_path.display());
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Parse a config file at an explicit path
    pub async fn load_from_file(&self, path: &Path) -> HydraResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| HydraError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| HydraError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Write the config to its on-disk location
    pub async fn save(&self, config: &Config) -> HydraResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HydraError::io("creating config directory", e))?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, &content).await.map_err(|e| {
            HydraError::io(format!("writing {}", self.config_path.display()), e)
        })?;

        info!("Saved config to {}", self.config_path.display());
        Ok(())
    }

    /// The path this manager reads and writes
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
