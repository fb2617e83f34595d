//! Data access capability consumed by indicators.
//!
//! The host application owns the database. Indicators only see this trait:
//! counts, single fields, and record sets, with `{table}` style SQL and either
//! positional (`?`) or named (`:name`) placeholders.

use std::collections::{BTreeMap, HashMap};

use super::indicators::{error::IndicatorError, types::IndicatorResult, value::Value};

/// Query parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Params {
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Params::Named(vec![(name.into(), value.into())])
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Params::None => true,
            Params::Positional(v) => v.is_empty(),
            Params::Named(v) => v.is_empty(),
        }
    }
}

/// Equality conditions for the table-level helpers.
pub type Conditions<'a> = &'a [(&'a str, Value)];

/// One result row, column name to value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    columns: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_number)
    }

    pub fn get_str(&self, column: &str) -> Option<String> {
        self.get(column).map(|v| v.to_string())
    }

    /// Integer column or a `Query` error naming the missing column.
    pub fn require_i64(&self, column: &str, operation: &str) -> IndicatorResult<i64> {
        self.get_i64(column).ok_or_else(|| {
            IndicatorError::query(operation, format!("missing integer column '{}'", column))
        })
    }

    pub fn require_str(&self, column: &str, operation: &str) -> IndicatorResult<String> {
        self.get_str(column).ok_or_else(|| {
            IndicatorError::query(operation, format!("missing column '{}'", column))
        })
    }
}

/// Keys a result set by `column`, rendered as an entity id string.
/// Later rows win on duplicate ids.
pub fn index_by(records: Vec<Record>, column: &str) -> HashMap<String, Record> {
    records
        .into_iter()
        .filter_map(|r| {
            let id = r.get(column)?.to_string();
            Some((id, r))
        })
        .collect()
}

#[async_trait::async_trait]
pub trait DataStore: Send + Sync {
    async fn count_records(&self, table: &str, conditions: Conditions<'_>) -> IndicatorResult<i64>;

    async fn count_records_select(
        &self,
        table: &str,
        select: &str,
        params: &Params,
    ) -> IndicatorResult<i64>;

    async fn count_records_sql(&self, sql: &str, params: &Params) -> IndicatorResult<i64>;

    async fn get_field(
        &self,
        table: &str,
        field: &str,
        conditions: Conditions<'_>,
    ) -> IndicatorResult<Option<Value>>;

    async fn get_record_sql(&self, sql: &str, params: &Params) -> IndicatorResult<Option<Record>>;

    async fn get_records_sql(&self, sql: &str, params: &Params) -> IndicatorResult<Vec<Record>>;

    async fn get_records_select(
        &self,
        table: &str,
        select: &str,
        params: &Params,
        sort: &str,
        fields: &str,
    ) -> IndicatorResult<Vec<Record>>;
}
