//! Configuration of the external metric sender.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SenderConfig {
    /// Sender executable.
    #[validate(length(min = 1, message = "Sender command must not be empty"))]
    pub command: String,

    /// Monitoring server address.
    #[validate(length(min = 1, message = "Monitoring server must be set"))]
    pub server: String,

    /// Server trapper port, sender default when absent.
    #[validate(range(min = 1, max = 65535))]
    pub port: Option<u32>,

    /// Host name the metrics are filed under. Derived from the site URL when absent.
    pub hostname: Option<String>,

    /// Log every sender output at info level instead of debug.
    pub verbose: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            command: "/usr/bin/zabbix_sender".to_string(),
            server: String::new(),
            port: None,
            hostname: None,
            verbose: false,
        }
    }
}

impl SenderConfig {
    /// Configured host name, or `fallback` when none is set.
    pub fn resolved_hostname(&self, fallback: &str) -> String {
        match self.hostname.as_deref().map(str::trim) {
            Some(h) if !h.is_empty() => h.to_string(),
            _ => fallback.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_is_required() {
        let cfg = SenderConfig::default();
        assert!(cfg.validate().is_err());

        let cfg = SenderConfig {
            server: "zabbix.example.org".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn port_range_is_checked() {
        let cfg = SenderConfig {
            server: "zabbix".into(),
            port: Some(70000),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn hostname_falls_back_when_blank() {
        let mut cfg = SenderConfig::default();
        assert_eq!(cfg.resolved_hostname("learn.example.org"), "learn.example.org");
        cfg.hostname = Some("  ".into());
        assert_eq!(cfg.resolved_hostname("learn.example.org"), "learn.example.org");
        cfg.hostname = Some("lms-prod".into());
        assert_eq!(cfg.resolved_hostname("learn.example.org"), "lms-prod");
    }
}
