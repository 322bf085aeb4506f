//! INI configuration file.
//!
//! # Layout
//!
//! ```ini
//! [api]
//! base_url = http://127.0.0.1:8000/api/v1
//!
//! [fetch]
//! timeout_ms = 30000
//! heavy_timeout_ms = 180000
//! max_retries = 3
//! retry_delay_ms = 3000
//! backoff_multiplier = 2.0
//! max_delay_ms = 60000
//!
//! [pins]
//! directory = ~/.local/share/agrowatch/pins
//! quota_bytes = 5242880
//!
//! [ui]
//! debounce_ms = 300
//! throttle_ms = 300
//!
//! [animation]
//! interval_ms = 1500
//! ```
//!
//! Missing keys keep their defaults; a missing file is all defaults.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;
use tracing::debug;

use crate::animation::DEFAULT_INTERVAL_MS;
use crate::fetch::{
    FetchConfig, RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_HEAVY_TIMEOUT_MS,
    DEFAULT_MAX_DELAY_SECS, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_MS,
};
use crate::pins::DEFAULT_QUOTA_BYTES;
use crate::query::DEFAULT_BASE_URL;
use crate::schedule::{DEFAULT_DEBOUNCE_MS, DEFAULT_THROTTLE_MS};

/// Errors loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl From<ini::Error> for ConfigError {
    fn from(e: ini::Error) -> Self {
        match e {
            ini::Error::Io(e) => ConfigError::Io(e),
            ini::Error::Parse(e) => ConfigError::Parse(e.to_string()),
        }
    }
}

/// Application configuration directory (`<config dir>/agrowatch`).
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agrowatch")
}

/// Path of the configuration file.
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.ini")
}

/// Default directory for persisted pins.
pub fn default_pins_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agrowatch")
        .join("pins")
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    pub timeout_ms: u64,
    pub heavy_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PinSettings {
    /// `None` uses [`default_pins_dir`].
    pub directory: Option<PathBuf>,
    pub quota_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UiSettings {
    pub debounce_ms: u64,
    pub throttle_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationSettings {
    pub interval_ms: u64,
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub api: ApiSettings,
    pub fetch: FetchSettings,
    pub pins: PinSettings,
    pub ui: UiSettings,
    pub animation: AnimationSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            api: ApiSettings {
                base_url: DEFAULT_BASE_URL.to_string(),
            },
            fetch: FetchSettings {
                timeout_ms: DEFAULT_TIMEOUT_MS,
                heavy_timeout_ms: DEFAULT_HEAVY_TIMEOUT_MS,
                max_retries: DEFAULT_MAX_RETRIES,
                retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
                backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
                max_delay_ms: DEFAULT_MAX_DELAY_SECS * 1000,
            },
            pins: PinSettings {
                directory: None,
                quota_bytes: DEFAULT_QUOTA_BYTES,
            },
            ui: UiSettings {
                debounce_ms: DEFAULT_DEBOUNCE_MS,
                throttle_ms: DEFAULT_THROTTLE_MS,
            },
            animation: AnimationSettings {
                interval_ms: DEFAULT_INTERVAL_MS,
            },
        }
    }
}

impl ConfigFile {
    /// Load from [`config_file_path`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
    }

    /// Parse from INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Save to [`config_file_path`].
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        Ok(())
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini
    }

    /// Fetch core settings.
    pub fn fetch_config(&self) -> FetchConfig {
        let fetch = &self.fetch;
        let retry = RetryPolicy::exponential(
            fetch.max_retries,
            Duration::from_millis(fetch.retry_delay_ms),
        )
        .with_multiplier(fetch.backoff_multiplier)
        .with_max_delay(Duration::from_millis(fetch.max_delay_ms));

        FetchConfig::default()
            .with_timeout(Duration::from_millis(fetch.timeout_ms))
            .with_heavy_timeout(Duration::from_millis(fetch.heavy_timeout_ms))
            .with_retry(retry)
    }

    /// Pin directory, resolved against the default.
    pub fn pins_dir(&self) -> PathBuf {
        self.pins.directory.clone().unwrap_or_else(default_pins_dir)
    }
}

/// A settable configuration key, written `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    ApiBaseUrl,
    FetchTimeoutMs,
    FetchHeavyTimeoutMs,
    FetchMaxRetries,
    FetchRetryDelayMs,
    FetchBackoffMultiplier,
    FetchMaxDelayMs,
    PinsDirectory,
    PinsQuotaBytes,
    UiDebounceMs,
    UiThrottleMs,
    AnimationIntervalMs,
}

impl ConfigKey {
    /// Every key in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::ApiBaseUrl,
            ConfigKey::FetchTimeoutMs,
            ConfigKey::FetchHeavyTimeoutMs,
            ConfigKey::FetchMaxRetries,
            ConfigKey::FetchRetryDelayMs,
            ConfigKey::FetchBackoffMultiplier,
            ConfigKey::FetchMaxDelayMs,
            ConfigKey::PinsDirectory,
            ConfigKey::PinsQuotaBytes,
            ConfigKey::UiDebounceMs,
            ConfigKey::UiThrottleMs,
            ConfigKey::AnimationIntervalMs,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::ApiBaseUrl => "api",
            ConfigKey::FetchTimeoutMs
            | ConfigKey::FetchHeavyTimeoutMs
            | ConfigKey::FetchMaxRetries
            | ConfigKey::FetchRetryDelayMs
            | ConfigKey::FetchBackoffMultiplier
            | ConfigKey::FetchMaxDelayMs => "fetch",
            ConfigKey::PinsDirectory | ConfigKey::PinsQuotaBytes => "pins",
            ConfigKey::UiDebounceMs | ConfigKey::UiThrottleMs => "ui",
            ConfigKey::AnimationIntervalMs => "animation",
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::ApiBaseUrl => "base_url",
            ConfigKey::FetchTimeoutMs => "timeout_ms",
            ConfigKey::FetchHeavyTimeoutMs => "heavy_timeout_ms",
            ConfigKey::FetchMaxRetries => "max_retries",
            ConfigKey::FetchRetryDelayMs => "retry_delay_ms",
            ConfigKey::FetchBackoffMultiplier => "backoff_multiplier",
            ConfigKey::FetchMaxDelayMs => "max_delay_ms",
            ConfigKey::PinsDirectory => "directory",
            ConfigKey::PinsQuotaBytes => "quota_bytes",
            ConfigKey::UiDebounceMs => "debounce_ms",
            ConfigKey::UiThrottleMs => "throttle_ms",
            ConfigKey::AnimationIntervalMs => "interval_ms",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::ApiBaseUrl => config.api.base_url.clone(),
            ConfigKey::FetchTimeoutMs => config.fetch.timeout_ms.to_string(),
            ConfigKey::FetchHeavyTimeoutMs => config.fetch.heavy_timeout_ms.to_string(),
            ConfigKey::FetchMaxRetries => config.fetch.max_retries.to_string(),
            ConfigKey::FetchRetryDelayMs => config.fetch.retry_delay_ms.to_string(),
            ConfigKey::FetchBackoffMultiplier => config.fetch.backoff_multiplier.to_string(),
            ConfigKey::FetchMaxDelayMs => config.fetch.max_delay_ms.to_string(),
            ConfigKey::PinsDirectory => config
                .pins
                .directory
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            ConfigKey::PinsQuotaBytes => config.pins.quota_bytes.to_string(),
            ConfigKey::UiDebounceMs => config.ui.debounce_ms.to_string(),
            ConfigKey::UiThrottleMs => config.ui.throttle_ms.to_string(),
            ConfigKey::AnimationIntervalMs => config.animation.interval_ms.to_string(),
        }
    }

    /// Parse `value` and store it.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        match self {
            ConfigKey::ApiBaseUrl => {
                if value.is_empty() {
                    return Err(self.invalid(value, "must not be empty"));
                }
                config.api.base_url = value.to_string();
            }
            ConfigKey::FetchTimeoutMs => config.fetch.timeout_ms = self.positive(value)?,
            ConfigKey::FetchHeavyTimeoutMs => {
                config.fetch.heavy_timeout_ms = self.positive(value)?
            }
            ConfigKey::FetchMaxRetries => config.fetch.max_retries = self.parse(value)?,
            ConfigKey::FetchRetryDelayMs => config.fetch.retry_delay_ms = self.parse(value)?,
            ConfigKey::FetchBackoffMultiplier => {
                let multiplier: f64 = self.parse(value)?;
                if !multiplier.is_finite() || multiplier < 1.0 {
                    return Err(self.invalid(value, "must be at least 1.0"));
                }
                config.fetch.backoff_multiplier = multiplier;
            }
            ConfigKey::FetchMaxDelayMs => config.fetch.max_delay_ms = self.parse(value)?,
            ConfigKey::PinsDirectory => {
                config.pins.directory = if value.is_empty() {
                    None
                } else {
                    Some(expand_home(value))
                };
            }
            ConfigKey::PinsQuotaBytes => config.pins.quota_bytes = self.positive(value)?,
            ConfigKey::UiDebounceMs => config.ui.debounce_ms = self.parse(value)?,
            ConfigKey::UiThrottleMs => config.ui.throttle_ms = self.parse(value)?,
            ConfigKey::AnimationIntervalMs => {
                config.animation.interval_ms = self.positive(value)?
            }
        }
        Ok(())
    }

    fn parse<T>(&self, value: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        value
            .parse()
            .map_err(|e: T::Err| self.invalid(value, &e.to_string()))
    }

    fn positive(&self, value: &str) -> Result<u64, ConfigError> {
        match self.parse::<u64>(value)? {
            0 => Err(self.invalid(value, "must be greater than 0")),
            n => Ok(n),
        }
    }

    fn invalid(&self, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::Parse(format!("unknown configuration key '{}'", s)))
    }
}

fn expand_home(value: &str) -> PathBuf {
    match value.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(value)),
        None => PathBuf::from(value),
    }
}
