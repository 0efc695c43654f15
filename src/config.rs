use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::document::{MonitorConfig, DEFAULT_STREAMING_THRESHOLD, GB, MB};
use crate::replace::ReplaceOptions;

/// Configuration for ooxml-replace
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub replace: ReplaceConfig,
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaceConfig {
    /// Files at or above this many bytes are streamed
    pub streaming_threshold: u64,
    pub force_streaming: bool,
    /// 0 uses every available core
    pub max_workers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enable_monitor: bool,
    pub warning_threshold: u64,
    pub critical_threshold: u64,
    pub check_interval_ms: u64,
}

impl Default for ReplaceConfig {
    fn default() -> Self {
        ReplaceConfig {
            streaming_threshold: DEFAULT_STREAMING_THRESHOLD,
            force_streaming: false,
            max_workers: 0,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            enable_monitor: false,
            warning_threshold: 500 * MB,
            critical_threshold: GB,
            check_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Load config from the config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        if let Some(config_path) = Self::get_config_path() {
            if config_path.exists() {
                return Self::load_from(&config_path);
            }
        }

        Ok(Config::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to the config directory
    pub fn save(&self) -> Result<()> {
        if let Some(config_path) = Self::get_config_path() {
            self.save_to(&config_path)?;
        }

        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ooxml-replace").join("config.toml"))
    }

    /// Write the default config file
    pub fn init_default() -> Result<()> {
        Config::default().save()
    }
}

impl From<&MemoryConfig> for MonitorConfig {
    fn from(config: &MemoryConfig) -> Self {
        MonitorConfig {
            warning_threshold: config.warning_threshold,
            critical_threshold: config.critical_threshold,
            check_interval: Duration::from_millis(config.check_interval_ms.max(1)),
        }
    }
}

impl From<&Config> for ReplaceOptions {
    fn from(config: &Config) -> Self {
        ReplaceOptions {
            streaming_threshold: config.replace.streaming_threshold,
            force_streaming: config.replace.force_streaming,
            max_workers: config.replace.max_workers,
            enable_monitor: config.memory.enable_monitor,
            monitor: config
                .memory
                .enable_monitor
                .then(|| MonitorConfig::from(&config.memory)),
        }
    }
}
