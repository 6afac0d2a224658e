use serde::Deserialize;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "eink-frame.toml";

/// one year
pub const MAX_CLEAR_AFTER_HOURS: u64 = 24 * 365;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where the running configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub debug: bool,
    /// hours without a new image before the panel is cleared
    pub clear_after: u64,
    pub api: ApiConfig,
    pub panel: PanelConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub endpoint: String,
    /// minutes between polls
    pub frequency: u32,
    pub startup_attempts: u32,
    pub startup_backoff_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PanelConfig {
    /// set to false to run headless even on a Pi
    pub enabled: bool,
    pub spi_device: PathBuf,
    pub spi_hz: u32,
    pub dc_pin: u64,
    pub cs_pin: u64,
    pub rst_pin: u64,
    pub busy_pin: u64,
    pub busy_poll_ms: u64,
    pub busy_timeout_secs: u64,
    pub reset_settle_ms: u64,
    pub refresh_settle_ms: u64,
    pub sleep_settle_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            debug: false,
            clear_after: 12,
            api: ApiConfig::default(),
            panel: PanelConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            endpoint: "https://paperframes.net/api".to_string(),
            frequency: 10,
            startup_attempts: 7,
            startup_backoff_secs: 10,
        }
    }
}

impl Default for PanelConfig {
    fn default() -> Self {
        PanelConfig {
            enabled: true,
            spi_device: PathBuf::from("/dev/spidev0.0"),
            spi_hz: 4_000_000,
            dc_pin: 25,
            cs_pin: 8,
            rst_pin: 17,
            busy_pin: 24,
            busy_poll_ms: 100,
            busy_timeout_secs: 60,
            reset_settle_ms: 200,
            refresh_settle_ms: 5_000,
            sleep_settle_ms: 2_000,
        }
    }
}

impl Config {
    /// Loads the first configuration found: `explicit` (which must exist),
    /// then `/etc`, then the user's home directory. Falls back to defaults
    /// when no file exists.
    pub fn load(explicit: Option<&Path>) -> Result<(Config, ConfigSource), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, ConfigSource::File(path.to_path_buf())));
        }
        for path in Self::search_paths() {
            if path.is_file() {
                let config = Self::from_file(&path)?;
                return Ok((config, ConfigSource::File(path)));
            }
        }
        Ok((Config::default(), ConfigSource::Defaults))
    }

    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![Path::new("/etc").join(CONFIG_FILE_NAME)];
        if let Some(home) = env::var_os("HOME") {
            paths.push(PathBuf::from(home).join(".eink-frame").join(CONFIG_FILE_NAME));
        }
        paths
    }

    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.frequency == 0 {
            return Err(ConfigError::Invalid("api.frequency must be at least 1 minute".into()));
        }
        if !(1..=MAX_CLEAR_AFTER_HOURS).contains(&self.clear_after) {
            return Err(ConfigError::Invalid(format!(
                "clear_after must be between 1 and {} hours",
                MAX_CLEAR_AFTER_HOURS
            )));
        }
        if self.panel.busy_poll_ms == 0 {
            return Err(ConfigError::Invalid("panel.busy_poll_ms must be positive".into()));
        }
        if self.panel.busy_timeout_secs == 0 {
            return Err(ConfigError::Invalid("panel.busy_timeout_secs must be positive".into()));
        }
        if self.api.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("api.endpoint is empty".into()));
        }
        Ok(())
    }

    pub fn clear_after(&self) -> Duration {
        Duration::from_secs(self.clear_after.saturating_mul(60 * 60))
    }
}

impl ApiConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.frequency) * 60)
    }

    pub fn startup_backoff(&self) -> Duration {
        Duration::from_secs(self.startup_backoff_secs)
    }
}
