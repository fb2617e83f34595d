//! In-memory collaborators for unit tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{
    context::RunContext,
    emitter::{Metric, MonitoringSink},
    indicators::{
        error::IndicatorError,
        types::{IndicatorResult, Rate},
        value::Value,
    },
    roles::{Archetype, RolePolicy},
    store::{Conditions, DataStore, Params, Record},
};
use crate::config::indicators::IndicatorsConfig;

/// Run clock of indicator tests: 2023-11-14 22:13:20 UTC.
pub const NOW: i64 = 1_700_000_000;

/// Context at `NOW` over `store`, with no role assignments.
pub fn run_context(rate: Rate, store: StubStore, config: IndicatorsConfig) -> RunContext {
    run_context_with(
        rate,
        Arc::new(store),
        Arc::new(StaticRolePolicy::default()),
        config,
    )
}

pub fn run_context_with(
    rate: Rate,
    store: Arc<StubStore>,
    roles: Arc<dyn RolePolicy>,
    config: IndicatorsConfig,
) -> RunContext {
    let now = OffsetDateTime::from_unix_timestamp(NOW).unwrap();
    RunContext::new(rate, store, roles, Arc::new(config)).at(now)
}

enum Answer {
    Count(i64),
    Field(Option<Value>),
    Record(Option<Record>),
    Records(Vec<Record>),
    Fail(String),
}

/// DataStore answering by SQL fragment.
///
/// Every call is rendered to a statement (table helpers as `{table}` SQL) and
/// the first rule whose fragment it contains decides the answer. A `fail` rule
/// matches any operation; other rules only match their own operation kind.
/// Table helpers without conditions render `WHERE 1 = 1`. Unmatched calls
/// answer 0, `None` or no rows.
#[derive(Default)]
pub struct StubStore {
    rules: Vec<(String, Answer)>,
    calls: Mutex<Vec<(String, Params)>>,
}

impl StubStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_count(mut self, fragment: &str, count: i64) -> Self {
        self.rules.push((fragment.to_string(), Answer::Count(count)));
        self
    }

    pub fn on_field(mut self, fragment: &str, value: impl Into<Value>) -> Self {
        self.rules
            .push((fragment.to_string(), Answer::Field(Some(value.into()))));
        self
    }

    pub fn on_record(mut self, fragment: &str, record: Record) -> Self {
        self.rules
            .push((fragment.to_string(), Answer::Record(Some(record))));
        self
    }

    pub fn on_records(mut self, fragment: &str, records: Vec<Record>) -> Self {
        self.rules.push((fragment.to_string(), Answer::Records(records)));
        self
    }

    pub fn fail(mut self, fragment: &str, reason: &str) -> Self {
        self.rules
            .push((fragment.to_string(), Answer::Fail(reason.to_string())));
        self
    }

    /// Statements issued so far, with their parameters.
    pub fn calls(&self) -> Vec<(String, Params)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, fragment: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(sql, _)| sql.contains(fragment))
            .count()
    }

    fn record_call(&self, sql: &str, params: &Params) {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.clone()));
    }

    fn answer<T>(
        &self,
        sql: &str,
        params: &Params,
        pick: impl Fn(&Answer) -> Option<T>,
    ) -> IndicatorResult<Option<T>> {
        self.record_call(sql, params);
        for (fragment, answer) in &self.rules {
            if !sql.contains(fragment.as_str()) {
                continue;
            }
            if let Answer::Fail(reason) = answer {
                return Err(IndicatorError::query(fragment.clone(), reason));
            }
            if let Some(found) = pick(answer) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

fn render_conditions(conditions: Conditions<'_>) -> String {
    if conditions.is_empty() {
        return "1 = 1".to_string();
    }
    conditions
        .iter()
        .map(|(column, value)| format!("{} = {}", column, value))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn count(answer: &Answer) -> Option<i64> {
    match answer {
        Answer::Count(n) => Some(*n),
        _ => None,
    }
}

#[async_trait]
impl DataStore for StubStore {
    async fn count_records(&self, table: &str, conditions: Conditions<'_>) -> IndicatorResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {{{}}} WHERE {}",
            table,
            render_conditions(conditions)
        );
        Ok(self.answer(&sql, &Params::None, count)?.unwrap_or(0))
    }

    async fn count_records_select(
        &self,
        table: &str,
        select: &str,
        params: &Params,
    ) -> IndicatorResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {{{}}} WHERE {}", table, select);
        Ok(self.answer(&sql, params, count)?.unwrap_or(0))
    }

    async fn count_records_sql(&self, sql: &str, params: &Params) -> IndicatorResult<i64> {
        Ok(self.answer(sql, params, count)?.unwrap_or(0))
    }

    async fn get_field(
        &self,
        table: &str,
        field: &str,
        conditions: Conditions<'_>,
    ) -> IndicatorResult<Option<Value>> {
        let sql = format!(
            "SELECT {} FROM {{{}}} WHERE {}",
            field,
            table,
            render_conditions(conditions)
        );
        let found = self.answer(&sql, &Params::None, |a| match a {
            Answer::Field(v) => Some(v.clone()),
            _ => None,
        })?;
        Ok(found.flatten())
    }

    async fn get_record_sql(&self, sql: &str, params: &Params) -> IndicatorResult<Option<Record>> {
        let found = self.answer(sql, params, |a| match a {
            Answer::Record(r) => Some(r.clone()),
            _ => None,
        })?;
        Ok(found.flatten())
    }

    async fn get_records_sql(&self, sql: &str, params: &Params) -> IndicatorResult<Vec<Record>> {
        let found = self.answer(sql, params, |a| match a {
            Answer::Records(r) => Some(r.clone()),
            _ => None,
        })?;
        Ok(found.unwrap_or_default())
    }

    async fn get_records_select(
        &self,
        table: &str,
        select: &str,
        params: &Params,
        sort: &str,
        fields: &str,
    ) -> IndicatorResult<Vec<Record>> {
        let sql = format!(
            "SELECT {} FROM {{{}}} WHERE {} ORDER BY {}",
            fields, table, select, sort
        );
        let found = self.answer(&sql, params, |a| match a {
            Answer::Records(r) => Some(r.clone()),
            _ => None,
        })?;
        Ok(found.unwrap_or_default())
    }
}

/// Sink keeping every dispatched metric.
#[derive(Default)]
pub struct RecordingSink {
    metrics: Mutex<Vec<Metric>>,
}

impl RecordingSink {
    pub fn metrics(&self) -> Vec<Metric> {
        self.metrics.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.metrics().into_iter().map(|m| m.key).collect()
    }

    /// Raw payload sent for `key`, if any.
    pub fn value_of(&self, key: &str) -> Option<String> {
        self.metrics()
            .into_iter()
            .find(|m| m.key == key)
            .map(|m| m.payload.as_arg().to_string())
    }
}

#[async_trait]
impl MonitoringSink for RecordingSink {
    async fn dispatch(&self, metric: &Metric) -> IndicatorResult<()> {
        self.metrics.lock().unwrap().push(metric.clone());
        Ok(())
    }
}

/// Sink rejecting metrics whose key contains a fragment, recording the rest.
pub struct FailingSink {
    fragment: String,
    pub accepted: Arc<RecordingSink>,
}

impl FailingSink {
    pub fn new(fragment: &str) -> Self {
        FailingSink {
            fragment: fragment.to_string(),
            accepted: Arc::new(RecordingSink::default()),
        }
    }
}

#[async_trait]
impl MonitoringSink for FailingSink {
    async fn dispatch(&self, metric: &Metric) -> IndicatorResult<()> {
        if metric.key.contains(&self.fragment) {
            return Err(IndicatorError::Dispatch {
                key: metric.key.clone(),
                status: 2,
                output: "processed: 0; failed: 1".to_string(),
            });
        }
        self.accepted.dispatch(metric).await
    }
}

/// Role policy backed by a fixed user to archetype table.
#[derive(Default)]
pub struct StaticRolePolicy {
    users: HashMap<i64, Archetype>,
}

impl StaticRolePolicy {
    pub fn with(mut self, user_id: i64, archetype: Archetype) -> Self {
        self.users.insert(user_id, archetype);
        self
    }
}

#[async_trait]
impl RolePolicy for StaticRolePolicy {
    async fn match_policy(&self, user_id: i64, archetype: Archetype) -> IndicatorResult<bool> {
        Ok(self.users.get(&user_id) == Some(&archetype))
    }

    async fn count_users(&self, archetype: Archetype) -> IndicatorResult<i64> {
        Ok(self.users.values().filter(|a| **a == archetype).count() as i64)
    }
}
