//! Rig configuration, read once at startup from a TOML file.
//!
//! Every section has defaults matching the three-board, 36-sipper rig, so an
//! empty file (or a missing one, which is created with the defaults) is a
//! valid configuration.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::sensor::mpr121::ELECTRODES;

const CONFIG_DIR: &str = ".config/sipper-logger";
const CONFIG_FILE: &str = "config.toml";
const CONFIG_ENV: &str = "SIPPER_LOGGER_CONFIG";
const LOG_DIR: &str = "sipper_logs";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("No touch controller addresses configured")]
    NoControllers,

    #[error("pads_per_controller must be within 1..={max}, got {0}", max = ELECTRODES)]
    PadCount(usize),

    #[error("poll_interval_ms must be greater than zero")]
    PollInterval,

    #[error("Log file extension must not be empty")]
    Extension,

    #[error("Duplicate controller address 0x{0:02X}")]
    DuplicateAddress(u16),
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub sensors: SensorConfig,
    pub debounce: DebounceConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub clock: ClockConfig,
    pub logging: LoggingConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    pub i2c_bus: u8,
    // Bus order defines the controller index and therefore the sipper ids
    pub addresses: Vec<u16>,
    pub pads_per_controller: usize,
    // Lower values increase sensitivity
    pub touch_threshold: u8,
    pub release_threshold: u8,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            addresses: vec![0x5A, 0x5B, 0x5C],
            pads_per_controller: ELECTRODES,
            touch_threshold: 120,
            release_threshold: 120,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct DebounceConfig {
    // Minimum time since touch start before a release is accepted
    pub on_ms: u64,
    // Minimum time since the last release before a new touch is accepted
    pub off_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            on_ms: 40,
            off_ms: 40,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub poll_interval_ms: u64,
    // BCM numbering, active low with internal pull-up
    pub trigger_pin: u8,
    pub trigger_poll_ms: u64,
    pub settle_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 20,
            trigger_pin: 5,
            trigger_poll_ms: 10,
            settle_ms: 300,
        }
    }
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn trigger_poll(&self) -> Duration {
        Duration::from_millis(self.trigger_poll_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub log_dir: PathBuf,
    pub extension: String,
    // fsync after every appended line
    pub sync_each_write: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_dir: get_home_dir().join(LOG_DIR),
            extension: "csv".to_string(),
            sync_each_write: true,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClockSource {
    #[default]
    System,
    Pcf8523,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ClockConfig {
    pub source: ClockSource,
    pub i2c_bus: u8,
    pub address: u16,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            source: ClockSource::System,
            i2c_bus: 1,
            address: 0x68,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> tracing::Level {
        self.level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level '{}', using info", self.level);
            tracing::Level::INFO
        })
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensors.addresses.is_empty() {
            return Err(ConfigError::NoControllers);
        }
        for (i, address) in self.sensors.addresses.iter().enumerate() {
            if self.sensors.addresses[..i].contains(address) {
                return Err(ConfigError::DuplicateAddress(*address));
            }
        }
        if !(1..=ELECTRODES).contains(&self.sensors.pads_per_controller) {
            return Err(ConfigError::PadCount(self.sensors.pads_per_controller));
        }
        if self.session.poll_interval_ms == 0 {
            return Err(ConfigError::PollInterval);
        }
        if self.storage.extension.trim().is_empty() {
            return Err(ConfigError::Extension);
        }
        Ok(())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| eyre!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration, writing the defaults first if no file exists.
    pub async fn load() -> Result<Self> {
        let path = config_path();
        ensure_default_config(&path).await?;

        debug!("Reading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

pub fn config_path() -> PathBuf {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => PathBuf::from(path),
        None => get_home_dir().join(CONFIG_DIR).join(CONFIG_FILE),
    }
}

pub async fn ensure_default_config(path: &Path) -> Result<()> {
    if tokio::fs::try_exists(path)
        .await
        .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
    {
        return Ok(());
    }

    info!("Creating default configuration at {}", path.display());
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
    }

    let content = toml::to_string_pretty(&Config::default())
        .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| eyre!("Failed to write default config file: {}", e))?;
    Ok(())
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}
