//! Configuration file handling.
//!
//! Settings are read from `meter2car.toml` (by default in
//! `$XDG_CONFIG_HOME/meter2car/`). Every field has a default, so an empty file
//! or no file at all is valid. The decryption key and charger URL can also be
//! supplied through `METER2CAR_KEY` and `METER2CAR_URL`.
//!
//! # Format
//!
//! ```toml
//! [meter]
//! device = "/dev/serial0"
//! trigger_pin = 2
//! key = "00112233445566778899aabbccddeeff"
//!
//! [charger]
//! url = "http://192.168.1.50/"
//! max_ampere = 14
//!
//! [control]
//! turn_on_threshold_w = 1500
//! turn_off_threshold_w = 1200
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{KEY_ENV, URL_ENV};
use crate::key::{DecryptionKey, KeyError};
use crate::meter::ReadingLayout;
use crate::paths;

/// Lowest charging current the IEC 61851 pilot signal can request.
pub const MIN_CHARGING_AMPERE: u8 = 6;

/// Errors that can occur when loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config file '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("no meter key configured; set {} or meter.key", KEY_ENV)]
  MissingKey,

  #[error("invalid meter key: {0}")]
  InvalidKey(#[from] KeyError),

  #[error("invalid configuration: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
  pub meter: MeterConfig,
  pub charger: ChargerConfig,
  pub control: ControlConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeterConfig {
  /// Serial device of the customer interface.
  pub device: String,
  pub baud_rate: u32,
  /// Read timeout; a reading fails if the meter stays silent this long.
  pub timeout_secs: u64,
  /// BCM number of the data-request line, if wired.
  pub trigger_pin: Option<u8>,
  /// Hex-encoded decryption key.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub key: Option<String>,
  pub import_index: usize,
  pub export_index: usize,
}

impl Default for MeterConfig {
  fn default() -> Self {
    let layout = ReadingLayout::default();
    Self {
      device: "/dev/serial0".to_string(),
      baud_rate: 115_200,
      timeout_secs: 10,
      trigger_pin: Some(2),
      key: None,
      import_index: layout.import_index,
      export_index: layout.export_index,
    }
  }
}

impl MeterConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  pub fn layout(&self) -> ReadingLayout {
    ReadingLayout {
      import_index: self.import_index,
      export_index: self.export_index,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChargerConfig {
  /// Base URL of the go-e charger, e.g. `http://192.168.1.50/`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,
  pub min_ampere: u8,
  pub max_ampere: u8,
  pub timeout_secs: u64,
}

impl Default for ChargerConfig {
  fn default() -> Self {
    Self {
      url: None,
      min_ampere: MIN_CHARGING_AMPERE,
      max_ampere: 14,
      timeout_secs: 10,
    }
  }
}

impl ChargerConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlConfig {
  /// Averaged surplus per phase above which charging starts.
  pub turn_on_threshold_w: i64,
  /// Averaged power available to the car per phase below which charging stops.
  pub turn_off_threshold_w: i64,
  pub volts_per_phase: i64,
  /// Cycles between two checks of the turn-off condition.
  pub turn_off_after_cycles: u32,
  pub interval_secs: u64,
  /// Pause between setting the current and releasing the charge.
  pub enable_delay_secs: u64,
}

impl Default for ControlConfig {
  fn default() -> Self {
    Self {
      turn_on_threshold_w: 1500,
      turn_off_threshold_w: 1200,
      volts_per_phase: 230,
      turn_off_after_cycles: 4,
      interval_secs: 60,
      enable_delay_secs: 5,
    }
  }
}

impl ControlConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs)
  }

  pub fn enable_delay(&self) -> Duration {
    Duration::from_secs(self.enable_delay_secs)
  }
}

impl Config {
  /// Load and validate a config file, applying environment overrides.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let mut config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = %path.display(), "loaded config file");

    config.apply_env();
    config.validate()?;
    Ok(config)
  }

  /// Load the config from the default location, falling back to defaults
  /// when there is no file.
  pub fn load_default() -> Result<Self, ConfigError> {
    match paths::config_file() {
      Some(path) if path.exists() => Self::load(&path),
      _ => {
        debug!("no config file found, using defaults");
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
      }
    }
  }

  /// Override file settings with `METER2CAR_KEY` and `METER2CAR_URL`.
  pub fn apply_env(&mut self) {
    if let Some(key) = std::env::var(KEY_ENV).ok().filter(|k| !k.is_empty()) {
      self.meter.key = Some(key);
    }
    if let Some(url) = std::env::var(URL_ENV).ok().filter(|u| !u.is_empty()) {
      self.charger.url = Some(url);
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if let Some(url) = &self.charger.url {
      url::Url::parse(url).map_err(|e| ConfigError::Invalid(format!("charger.url '{}': {}", url, e)))?;
    }
    if self.charger.min_ampere < MIN_CHARGING_AMPERE {
      return Err(ConfigError::Invalid(format!(
        "charger.min_ampere must be at least {}",
        MIN_CHARGING_AMPERE
      )));
    }
    if self.charger.min_ampere > self.charger.max_ampere {
      return Err(ConfigError::Invalid(
        "charger.min_ampere must not exceed charger.max_ampere".to_string(),
      ));
    }
    if self.control.turn_off_threshold_w > self.control.turn_on_threshold_w {
      return Err(ConfigError::Invalid(
        "control.turn_off_threshold_w must not exceed control.turn_on_threshold_w".to_string(),
      ));
    }
    if self.control.volts_per_phase <= 0 {
      return Err(ConfigError::Invalid("control.volts_per_phase must be positive".to_string()));
    }
    if self.control.interval_secs == 0 {
      return Err(ConfigError::Invalid("control.interval_secs must be positive".to_string()));
    }
    if self.meter.import_index == self.meter.export_index {
      return Err(ConfigError::Invalid(
        "meter.import_index and meter.export_index must differ".to_string(),
      ));
    }
    Ok(())
  }

  /// The meter key, parsed.
  pub fn decryption_key(&self) -> Result<DecryptionKey, ConfigError> {
    let key = self.meter.key.as_deref().ok_or(ConfigError::MissingKey)?;
    Ok(key.parse()?)
  }
}
