use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::IndicatorError;

/// Result alias used throughout the indicator engine.
pub type IndicatorResult<T> = std::result::Result<T, IndicatorError>;

/// Schedule tier an indicator belongs to.
///
/// The numeric code is the one stored in custom measurement rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rate {
    Instant,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Rate {
    pub const ALL: [Rate; 5] = [
        Rate::Instant,
        Rate::Hourly,
        Rate::Daily,
        Rate::Weekly,
        Rate::Monthly,
    ];

    pub fn code(self) -> i64 {
        match self {
            Rate::Instant => 0,
            Rate::Hourly => 1,
            Rate::Daily => 2,
            Rate::Weekly => 3,
            Rate::Monthly => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Rate> {
        Rate::ALL.into_iter().find(|r| r.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rate::Instant => "instant",
            Rate::Hourly => "hourly",
            Rate::Daily => "daily",
            Rate::Weekly => "weekly",
            Rate::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rate {
    type Err = IndicatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rate::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| IndicatorError::Config(format!("Invalid rate: {}", s)))
    }
}

/// Wire datatype declared by an indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Numeric,
    Text,
}

/// One submode that could not be acquired or emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmodeFailure {
    pub indicator: String,
    pub submode: String,
    pub error: String,
}

impl SubmodeFailure {
    pub fn new(indicator: &str, submode: &str, error: impl fmt::Display) -> Self {
        SubmodeFailure {
            indicator: indicator.to_string(),
            submode: submode.to_string(),
            error: error.to_string(),
        }
    }
}

/// Outcome of emitting one or more submodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SendReport {
    pub sent: usize,
    pub suppressed: usize,
    pub failures: Vec<SubmodeFailure>,
}

impl SendReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn merge(&mut self, other: SendReport) {
        self.sent += other.sent;
        self.suppressed += other.suppressed;
        self.failures.extend(other.failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_codes_round_trip() {
        for rate in Rate::ALL {
            assert_eq!(Rate::from_code(rate.code()), Some(rate));
        }
        assert_eq!(Rate::from_code(9), None);
    }

    #[test]
    fn rate_parses_case_insensitively() {
        assert_eq!("Daily".parse::<Rate>().unwrap(), Rate::Daily);
        assert_eq!(" weekly ".parse::<Rate>().unwrap(), Rate::Weekly);
        assert!(matches!(
            "fortnightly".parse::<Rate>(),
            Err(IndicatorError::Config(_))
        ));
    }

    #[test]
    fn send_reports_merge() {
        let mut total = SendReport {
            sent: 2,
            ..Default::default()
        };
        total.merge(SendReport {
            sent: 1,
            suppressed: 3,
            failures: vec![SubmodeFailure::new("coursecount", "all", "no value")],
        });
        assert_eq!((total.sent, total.suppressed, total.failed()), (3, 3, 1));
    }
}
