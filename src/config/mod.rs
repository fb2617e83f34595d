//! Configuration loading, validation and defaults.
//!
//! The top-level `Config` aggregates logging, sender and indicator settings.
//! It is read from a TOML file once per scheduled run and stays immutable
//! for the rest of the run.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::{indicators::IndicatorsConfig, logger::LoggerConfig, sender::SenderConfig};

pub mod indicators;
pub mod logger;
pub mod sender;

/// Environment variable pointing at the configuration file.
pub const CONFIG_ENV: &str = "ZABBIX_INDICATORS_CONFIG";

/// Fallback location when the environment variable is not set.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/zabbix-indicators/config.toml";

/// Timestamped console lines for the phase before the tracing subscriber exists
/// (configuration loading, logger setup).
#[doc(hidden)]
#[macro_export]
macro_rules! __print_stamped {
    ($label:expr, $($arg:tt)*) => {{
        let stamp = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        eprintln!("{}  {} {}", console::style(stamp).dim(), $label, format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        $crate::__print_stamped!(console::style("INFO").green(), $($arg)*)
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        $crate::__print_stamped!(console::style("WARN").yellow(), $($arg)*)
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        $crate::__print_stamped!(console::style("ERROR").red(), $($arg)*)
    };
}

/// Errors that can occur during configuration loading, parsing or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Generic configuration-related error with a descriptive message.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error while accessing configuration files.
    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// Failure to parse the TOML configuration file.
    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    /// Validation failure after successful parsing.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Top-level application configuration.
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Logging subsystem configuration.
    #[validate(nested)]
    pub logger: LoggerConfig,

    /// External sender invocation.
    #[validate(nested)]
    pub sender: SenderConfig,

    /// Acquisition settings and site facts.
    #[validate(nested)]
    pub indicators: IndicatorsConfig,
}

impl Config {
    /// Locates and loads the configuration file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configuration file cannot be found,
    /// read, parsed, or validated.
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Self::load(&config_path)
    }

    /// Determines the configuration file path.
    ///
    /// Priority:
    /// 1. `ZABBIX_INDICATORS_CONFIG` environment variable
    /// 2. `/etc/zabbix-indicators/config.toml`
    fn get_config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(config_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(config_path);
            print_info!("Using config from {}: {}", CONFIG_ENV, path.display());
            return Ok(path);
        }

        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Ok(fallback.to_path_buf());
        }

        Err(ConfigError::Config(
            "No configuration file found.".to_string(),
        ))
    }

    /// Loads and validates configuration from the specified path.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        print_info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::Config(path.to_string_lossy().to_string()));
        }

        let config_str = fs::read_to_string(path)?;
        let config = Self::from_toml(&config_str)?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml(text: &str) -> Result<Config, ConfigError> {
        let config: Config =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(config)
    }

    /// Host name metrics are filed under.
    pub fn monitored_host(&self) -> String {
        self.sender
            .resolved_hostname(&self.indicators.site.hostname())
    }
}
