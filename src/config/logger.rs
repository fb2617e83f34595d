//! Logging configuration and its validation rules.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Console output formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Top-level logging configuration.
///
/// A scheduled run usually logs to the console of the cron job; journald is
/// available for hosts that run the tiers as systemd timers.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggerConfig {
    /// Global log level: trace, debug, info, warn or error (case-insensitive).
    /// `RUST_LOG` overrides it when set.
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,

    #[validate(nested)]
    pub console: Option<ConsoleConfig>,

    #[validate(nested)]
    pub journald: Option<JournaldConfig>,
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_log_level");
            err.message = Some(format!("Invalid log level: {}", level).into());
            Err(err)
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: "info".to_string(),
            console: Some(ConsoleConfig::default()),
            journald: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    /// Include the module path of each event.
    pub show_target: bool,
    pub show_thread_ids: bool,
    /// Emit span close events (per indicator timing).
    pub show_spans: bool,
    pub ansi_colors: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            enabled: true,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_ids: false,
            show_spans: false,
            ansi_colors: false,
        }
    }
}

/// systemd journald output.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct JournaldConfig {
    pub enabled: bool,

    /// Syslog identifier of journal entries. Must be non-empty.
    #[validate(length(min = 1))]
    pub identifier: String,
}

impl Default for JournaldConfig {
    fn default() -> Self {
        JournaldConfig {
            enabled: false,
            identifier: "zabbix-indicators".to_string(),
        }
    }
}
