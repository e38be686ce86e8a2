//! Configuration management for ridelog.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::telemetry::OrientationMode;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "ridelog";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "sessions.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `RIDELOG_`, sections split on `__`)
/// 2. TOML config file at `~/.config/ridelog/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sampling, thresholds and display tuning.
    pub telemetry: TelemetryConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Identity used when saving sessions.
    pub rider: RiderConfig,
}

/// Telemetry sampler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Roll readings are clamped to `±max_roll_angle` degrees.
    pub max_roll_angle: f64,
    /// Speeds strictly above this (km/h) are hazardous.
    pub danger_speed_kmh: u32,
    /// Roll magnitudes strictly above this (degrees) are hazardous.
    pub danger_roll_deg: u32,
    /// How the phone is mounted.
    pub orientation_mode: OrientationMode,
    /// Accelerometer sample interval in milliseconds.
    pub orientation_interval_ms: u64,
    /// Minimum time between location fixes in milliseconds.
    pub location_interval_ms: u64,
    /// Minimum distance between location fixes in meters.
    pub location_distance_m: f64,
    /// Upper end of the speed gauge.
    pub speed_gauge_max_kmh: f64,
    /// Duration of the roll dial animation in milliseconds.
    pub roll_animation_ms: u64,
    /// Duration of the speed bar animation in milliseconds.
    pub speed_animation_ms: u64,
    /// Sound resource played while a hazard is latched.
    pub alert_sound: String,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/ridelog/sessions.db`
    pub database_path: Option<PathBuf>,
    /// Maximum age of stored sessions in days.
    /// Set to 0 for unlimited.
    pub max_age_days: u32,
}

/// Rider identity configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiderConfig {
    /// Identifier attached to saved sessions. No rider means saves are refused.
    pub user_id: Option<String>,
    /// Whether the rider's email has been verified.
    pub email_verified: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_roll_angle: 50.0,
            danger_speed_kmh: 120,
            danger_roll_deg: 35,
            orientation_mode: OrientationMode::Portrait,
            orientation_interval_ms: 100,
            location_interval_ms: 1000,
            location_distance_m: 3.0,
            speed_gauge_max_kmh: 160.0,
            roll_animation_ms: 100,
            speed_animation_ms: 300,
            alert_sound: "beep.mp3".to_string(),
        }
    }
}

impl Default for RiderConfig {
    fn default() -> Self {
        Self {
            user_id: Some("local-rider".to_string()),
            email_verified: true,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        // Later providers override earlier ones
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("RIDELOG_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        self.telemetry.validate()
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the max session age as a Duration.
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        if self.storage.max_age_days == 0 {
            None
        } else {
            Some(Duration::from_secs(
                u64::from(self.storage.max_age_days) * 24 * 60 * 60,
            ))
        }
    }
}

impl TelemetryConfig {
    /// Check that thresholds and gauge ranges are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] naming the first bad value.
    pub fn validate(&self) -> Result<()> {
        // NaN fails every comparison, so check it first
        if self.max_roll_angle.is_nan() || self.max_roll_angle <= 0.0 || self.max_roll_angle > 90.0
        {
            return Err(Error::ConfigValidation {
                message: format!(
                    "max_roll_angle ({}) must be within (0, 90]",
                    self.max_roll_angle
                ),
            });
        }

        if f64::from(self.danger_roll_deg) >= self.max_roll_angle {
            return Err(Error::ConfigValidation {
                message: format!(
                    "danger_roll_deg ({}) must be below max_roll_angle ({})",
                    self.danger_roll_deg, self.max_roll_angle
                ),
            });
        }

        if self.orientation_interval_ms == 0 || self.location_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "sample intervals must be greater than 0".to_string(),
            });
        }

        if self.speed_gauge_max_kmh.is_nan() || self.speed_gauge_max_kmh <= 0.0 {
            return Err(Error::ConfigValidation {
                message: "speed_gauge_max_kmh must be greater than 0".to_string(),
            });
        }

        if self.location_distance_m.is_nan() || self.location_distance_m < 0.0 {
            return Err(Error::ConfigValidation {
                message: "location_distance_m cannot be negative".to_string(),
            });
        }

        Ok(())
    }

    /// Accelerometer sample interval.
    #[must_use]
    pub fn orientation_interval(&self) -> Duration {
        Duration::from_millis(self.orientation_interval_ms)
    }

    /// Minimum time between location fixes.
    #[must_use]
    pub fn location_interval(&self) -> Duration {
        Duration::from_millis(self.location_interval_ms)
    }

    /// Roll dial animation length.
    #[must_use]
    pub fn roll_animation(&self) -> Duration {
        Duration::from_millis(self.roll_animation_ms)
    }

    /// Speed bar animation length.
    #[must_use]
    pub fn speed_animation(&self) -> Duration {
        Duration::from_millis(self.speed_animation_ms)
    }
}
