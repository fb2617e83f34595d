//! Configuration for indicator acquisition.
//!
//! Covers the site facts indicators need (URL, temp dir, local host id, admins,
//! auth plugins) and the knobs that shape acquisition: key prefix, strict mode,
//! disabled indicators, cron lateness tolerance and entity discovery.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Facts about the monitored site.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SiteConfig {
    /// Public site URL. Used to derive the monitored host name.
    #[validate(length(min = 1, message = "Site wwwroot must not be empty"))]
    pub wwwroot: String,

    /// Temporary directory of the site; backups in progress live under `<tempdir>/backup`.
    pub tempdir: String,

    /// Host id of local (non-networked) user accounts.
    pub mnet_localhost_id: i64,

    /// User ids with site administration rights.
    pub site_admins: Vec<i64>,

    /// Enabled authentication plugins, in site order.
    pub auth: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig {
            wwwroot: "http://localhost".to_string(),
            tempdir: "/var/lib/moodledata/temp".to_string(),
            mnet_localhost_id: 1,
            site_admins: vec![2],
            auth: vec!["manual".to_string()],
        }
    }
}

impl SiteConfig {
    /// `wwwroot` without its protocol.
    pub fn hostname(&self) -> String {
        self.wwwroot
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string()
    }
}

/// Runtime entity discovery feeding templated submodes.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Emit per top-category families.
    pub top_categories: bool,

    /// Course ids watched individually. Empty disables the per-course family.
    #[validate(custom(function = "validate_course_ids"))]
    pub courses_of_interest: Vec<i64>,
}

fn validate_course_ids(ids: &[i64]) -> Result<(), ValidationError> {
    if ids.iter().any(|id| *id <= 0) {
        let mut err = ValidationError::new("invalid_course_id");
        err.message = Some("Course ids must be positive".into());
        return Err(err);
    }
    Ok(())
}

/// Acquisition settings shared by every indicator of a run.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct IndicatorsConfig {
    /// Leading namespace of every metric key.
    #[validate(length(min = 1, message = "Key prefix must not be empty"))]
    pub key_prefix: String,

    /// Abort the run on the first acquisition failure instead of zero-filling.
    pub strict: bool,

    /// Indicator names that are never loaded.
    pub disabled: Vec<String>,

    /// Minutes after which the cron is considered overdue.
    #[validate(range(min = 1, message = "Allowed cron period must be at least 1 minute"))]
    pub allowed_cron_period: i64,

    /// Declares the site as in production regardless of activity.
    pub tell_it_has_started: bool,

    /// Query returning a `started` column, consulted when the flag above is off.
    pub tell_it_has_started_sql: Option<String>,

    /// Role policy name: `standard` (role assignments) or `ent` (profile fields).
    #[validate(custom(function = "validate_role_policy"))]
    pub role_policy: String,

    #[validate(nested)]
    pub discovery: DiscoveryConfig,

    #[validate(nested)]
    pub site: SiteConfig,
}

fn validate_role_policy(name: &str) -> Result<(), ValidationError> {
    match name {
        "standard" | "ent" => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_role_policy");
            err.message = Some(format!("Unknown role policy: {}", name).into());
            Err(err)
        }
    }
}

impl Default for IndicatorsConfig {
    fn default() -> Self {
        IndicatorsConfig {
            key_prefix: "moodle".to_string(),
            strict: false,
            disabled: Vec::new(),
            allowed_cron_period: 60,
            tell_it_has_started: false,
            tell_it_has_started_sql: None,
            role_policy: "standard".to_string(),
            discovery: DiscoveryConfig::default(),
            site: SiteConfig::default(),
        }
    }
}

impl IndicatorsConfig {
    /// Full metric key for an indicator namespace, e.g. `courses` -> `moodle.courses`.
    pub fn key(&self, namespace: &str) -> String {
        format!("{}.{}", self.key_prefix, namespace)
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_strips_protocol() {
        let site = SiteConfig {
            wwwroot: "https://learn.example.org/".into(),
            ..Default::default()
        };
        assert_eq!(site.hostname(), "learn.example.org");
    }

    #[test]
    fn default_config_validates() {
        assert!(IndicatorsConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_unknown_role_policy_and_bad_course_ids() {
        let mut cfg = IndicatorsConfig {
            role_policy: "ldap".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        cfg.role_policy = "ent".into();
        assert!(cfg.validate().is_ok());
        cfg.discovery.courses_of_interest = vec![4, 0];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn key_and_disabled_lookup() {
        let cfg = IndicatorsConfig {
            key_prefix: "lms".into(),
            disabled: vec!["coursetop".into()],
            ..Default::default()
        };
        assert_eq!(cfg.key("users"), "lms.users");
        assert!(cfg.is_disabled("coursetop"));
        assert!(!cfg.is_disabled("coursecount"));
    }
}
