//! Configuration management for noisemap
//!
//! Settings are stored as pretty JSON in `~/.noisemap/config.json` with a
//! schema version and sequential migrations. Every section defaults field by
//! field, so a partial file is valid. The loaded `Config` is passed to
//! whatever needs it; there is no global instance.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::{LoudnessCalibration, DEFAULT_FRAME_SIZE};
use crate::feed::RetryPolicy;
use crate::geocoding::GeocodingSettings;
use crate::geolocation::DEFAULT_FALLBACK;
use crate::heat::HeatLayerOptions;
use crate::markers::MarkerStyle;
use crate::sample::LatLng;
use crate::sampler::{LoudnessOffload, SamplerSettings};
use crate::store::{RecentQuery, DEFAULT_RECENT_LIMIT};
use crate::viewport::ZoomLimits;

/// Current config schema version
pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHomeDirectory,

    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown config version: {0}")]
    UnknownVersion(u32),
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations
    pub version: u32,
    pub audio: AudioConfig,
    pub smoothing: SmoothingConfig,
    pub heat: HeatLayerOptions,
    pub markers: MarkerStyle,
    pub map: MapConfig,
    pub feed: FeedConfig,
    pub geocoding: GeocodingSettings,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            audio: AudioConfig::default(),
            smoothing: SmoothingConfig::default(),
            heat: HeatLayerOptions::default(),
            markers: MarkerStyle::default(),
            map: MapConfig::default(),
            feed: FeedConfig::default(),
            geocoding: GeocodingSettings::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Microphone and loudness estimate settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Selected input device ID (None for system default)
    pub device_id: Option<String>,
    /// Samples per analysed frame
    pub frame_size: usize,
    /// Milliseconds between loudness readings
    pub tick_interval_ms: u64,
    /// Decibel offset and clamp range; heuristic, not an SPL calibration
    pub calibration: LoudnessCalibration,
    pub offload: LoudnessOffload,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            frame_size: DEFAULT_FRAME_SIZE,
            tick_interval_ms: 500,
            calibration: LoudnessCalibration::default(),
            offload: LoudnessOffload::default(),
        }
    }
}

impl AudioConfig {
    pub fn sampler_settings(&self) -> SamplerSettings {
        SamplerSettings {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            calibration: self.calibration,
            offload: self.offload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Debounce window for the displayed value
    pub window_ms: u64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self { window_ms: 500 }
    }
}

impl SmoothingConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Centre used when the device location is unavailable
    pub fallback_center: LatLng,
    pub initial_zoom: f64,
    pub zoom: ZoomLimits,
    /// Render surface size in pixels
    pub width: u32,
    pub height: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            fallback_center: DEFAULT_FALLBACK,
            initial_zoom: 15.0,
            zoom: ZoomLimits::default(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Most samples fetched per refresh
    pub recent_limit: usize,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            recent_limit: DEFAULT_RECENT_LIMIT,
            max_attempts: retry.max_attempts,
            retry_delay_ms: retry.delay_ms,
        }
    }
}

impl FeedConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay_ms: self.retry_delay_ms,
        }
    }

    pub fn recent_query(&self) -> RecentQuery {
        RecentQuery::with_limit(self.recent_limit)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file; None for `~/.noisemap/noisemap.db`
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Also append logs to `~/.noisemap/logs/noisemap.log`
    pub log_to_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
        }
    }
}

/// Get the path to the config directory (~/.noisemap)
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".noisemap"))
        .ok_or(ConfigError::NoHomeDirectory)
}

/// Get the path to the config file (~/.noisemap/config.json)
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    Ok(get_config_dir()?.join("config.json"))
}

/// Load configuration from `path`, migrating (and re-saving) older schemas.
/// A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("Config file not found at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&contents)?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;
    if migrated.version != original_version {
        save_config(path, &migrated)?;
    }

    tracing::debug!("Config loaded from {:?}", path);
    Ok(migrated)
}

/// Like `load_config`, but any failure falls back to the defaults.
pub fn load_or_default(path: &Path) -> Config {
    load_config(path).unwrap_or_else(|e| {
        tracing::error!("Failed to load config, using defaults: {}", e);
        Config::default()
    })
}

/// Save configuration to `path`, creating its directory if needed
pub fn save_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }

    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents)?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}

/// Migrate configuration from older schema versions
pub fn migrate_config(mut config: Config) -> Result<Config, ConfigError> {
    let original_version = config.version;

    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }
    if config.version > CURRENT_VERSION {
        return Err(ConfigError::UnknownVersion(config.version));
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
    }
    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config, ConfigError> {
    match config.version {
        // 0 -> 1: first versioned layout; sections already default per field
        0 => Ok(Config {
            version: 1,
            ..config
        }),
        v => Err(ConfigError::UnknownVersion(v)),
    }
}
