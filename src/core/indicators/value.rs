//! Scalar values held by indicators between acquisition and emission.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use super::types::DataType;

/// One acquired sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Numeric(f64),
    Text(String),
}

impl Value {
    /// Numeric reading of the value, accepting numeric-looking text.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Numeric(n) => Some(*n),
            Value::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    t.parse::<f64>().ok().filter(|n| n.is_finite())
                }
            }
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_number()
            .filter(|n| n.fract() == 0.0)
            .map(|n| n as i64)
    }

    /// Exactly zero. Empty text is not zero.
    pub fn is_zero(&self) -> bool {
        self.as_number() == Some(0.0)
    }

    /// Zero-equivalent used when an acquisition fails.
    pub fn empty_for(datatype: DataType) -> Value {
        match datatype {
            DataType::Numeric => Value::Numeric(0.0),
            DataType::Text => Value::Text(String::new()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Numeric(n) => f.write_str(&format_number(*n)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Numeric(v as f64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Numeric(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Numeric(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Numeric(if v { 1.0 } else { 0.0 })
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Renders integral numbers without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// `n` rounded to `places` decimals.
pub fn round_to(n: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (n * scale).round() / scale
}

/// `part / whole` rounded to `places` decimals, 0 when `whole` is 0.
pub fn ratio(part: f64, whole: f64, places: i32) -> f64 {
    if whole == 0.0 {
        return 0.0;
    }
    round_to(part / whole, places)
}

/// Encoded form handed to the monitoring sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Numeric(String),
    Text(String),
}

impl Payload {
    /// Numeric encoding only when the indicator declares numeric data and the
    /// value actually reads as a number.
    pub fn encode(datatype: DataType, value: &Value) -> Payload {
        match (datatype, value.as_number()) {
            (DataType::Numeric, Some(n)) => Payload::Numeric(format_number(n)),
            _ => Payload::Text(value.to_string()),
        }
    }

    /// Raw argument passed to the sender.
    pub fn as_arg(&self) -> &str {
        match self {
            Payload::Numeric(s) | Payload::Text(s) => s,
        }
    }

    /// Command-line rendering used in logs: text is single-quoted.
    pub fn to_shell(&self) -> String {
        match self {
            Payload::Numeric(s) => s.clone(),
            Payload::Text(s) => format!("'{}'", s.replace('\'', r"'\''")),
        }
    }
}

/// Per-indicator value store keyed by concrete submode.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValueBag {
    values: BTreeMap<String, Value>,
}

impl ValueBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, submode: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(submode.into(), value.into());
    }

    pub fn get(&self, submode: &str) -> Option<&Value> {
        self.values.get(submode)
    }

    pub fn contains(&self, submode: &str) -> bool {
        self.values.contains_key(submode)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_numbers_render_without_fraction() {
        assert_eq!(Value::from(5).to_string(), "5");
        assert_eq!(Value::Numeric(2.5).to_string(), "2.5");
        assert_eq!(Value::Numeric(-3.0).to_string(), "-3");
    }

    #[test]
    fn ratios_are_rounded_and_safe_on_empty_totals() {
        assert_eq!(ratio(1.0, 3.0, 2), 0.33);
        assert_eq!(ratio(2.0, 3.0, 1), 0.7);
        assert_eq!(ratio(5.0, 0.0, 2), 0.0);
        assert_eq!(round_to(12.345, 1), 12.3);
    }

    #[test]
    fn zero_detection() {
        assert!(Value::from(0).is_zero());
        assert!(Value::from("0").is_zero());
        assert!(Value::from("0.0").is_zero());
        assert!(!Value::from("").is_zero());
        assert!(!Value::from("none").is_zero());
        assert!(!Value::Numeric(0.1).is_zero());
    }

    #[test]
    fn payload_follows_datatype_and_value() {
        assert_eq!(
            Payload::encode(DataType::Numeric, &Value::from(7)),
            Payload::Numeric("7".into())
        );
        assert_eq!(
            Payload::encode(DataType::Numeric, &Value::from("12")),
            Payload::Numeric("12".into())
        );
        assert_eq!(
            Payload::encode(DataType::Numeric, &Value::from("4.1 (Build 20230101)")),
            Payload::Text("4.1 (Build 20230101)".into())
        );
        assert_eq!(
            Payload::encode(DataType::Text, &Value::from(2023)),
            Payload::Text("2023".into())
        );
    }

    #[test]
    fn text_payload_is_shell_quoted_in_logs() {
        let p = Payload::Text("it's 4.1".into());
        assert_eq!(p.to_shell(), r"'it'\''s 4.1'");
        assert_eq!(p.as_arg(), "it's 4.1");
    }

    #[test]
    fn value_bag_overwrites_and_clears() {
        let mut bag = ValueBag::new();
        bag.set("all", 10);
        bag.set("all", 11);
        bag.set("visible", 7);
        assert_eq!(bag.len(), 2);
        assert_eq!(bag.get("all"), Some(&Value::Numeric(11.0)));
        bag.clear();
        assert!(bag.is_empty());
    }
}
