use std::io::ErrorKind;

use tracing::trace;

use super::{
    error::IndicatorError,
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate},
    value::Value,
};
use crate::{
    config::indicators::IndicatorsConfig,
    core::{context::RunContext, store::Params},
    register_indicator,
};

const SUBMODES: &str = "instance,started,cronstate,backupsinprogress,cronfailed";

/// Site liveness flags sampled on every instant run.
///
/// Zero suppression stays off: these are trigger inputs, and a trigger only
/// recovers when the zero actually reaches the server.
pub struct StatefullIndicator {
    core: IndicatorCore,
}

impl StatefullIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        StatefullIndicator {
            core: IndicatorCore::new("statefull", Rate::Instant, config.key("general"))
                .suppressing_zeros(false),
        }
    }

    /// 1 once the site is declared in production, by flag or by query.
    async fn started(ctx: &RunContext) -> IndicatorResult<i64> {
        if ctx.config.tell_it_has_started {
            return Ok(1);
        }
        let Some(sql) = ctx.config.tell_it_has_started_sql.as_deref() else {
            return Ok(0);
        };
        let state = ctx.store.get_record_sql(sql, &Params::None).await?;
        Ok(state.and_then(|r| r.get_i64("started")).unwrap_or(0))
    }

    /// 1 when the last cron run is older than the allowed period.
    async fn cron_overdue(ctx: &RunContext) -> IndicatorResult<bool> {
        let last_cron = ctx
            .store
            .get_field(
                "config_plugins",
                "value",
                &[
                    ("plugin", Value::from("report_zabbix")),
                    ("name", Value::from("lastcron")),
                ],
            )
            .await?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let horizon = ctx.horizon(60 * ctx.config.allowed_cron_period);
        trace!("Last cron at {}, late horizon {}", last_cron, horizon);
        Ok(last_cron < horizon)
    }

    /// Directories under `<tempdir>/backup`, one per backup being built.
    async fn backups_in_progress(ctx: &RunContext) -> IndicatorResult<i64> {
        let path = format!("{}/backup", ctx.config.site.tempdir.trim_end_matches('/'));
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(IndicatorError::query(path, e)),
        };

        let mut count = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| IndicatorError::query(path.clone(), e))?
        {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| IndicatorError::query(path.clone(), e))?;
            if file_type.is_dir() {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait::async_trait]
impl Indicator for StatefullIndicator {
    fn core(&self) -> &IndicatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut IndicatorCore {
        &mut self.core
    }

    async fn submodes(&mut self, _ctx: &RunContext) -> IndicatorResult<Vec<Submode>> {
        Submode::parse_list(SUBMODES)
    }

    async fn acquire_submode(&mut self, ctx: &RunContext, submode: &Submode) -> IndicatorResult<()> {
        let value = match submode.radical() {
            "instance" => Value::from(1),
            "started" => Value::from(Self::started(ctx).await?),
            "cronstate" => Value::from(Self::cron_overdue(ctx).await?),
            "backupsinprogress" => Value::from(Self::backups_in_progress(ctx).await?),
            "cronfailed" => Value::from(
                ctx.store
                    .count_records_select("task_scheduled", "faildelay > 0", &Params::None)
                    .await?,
            ),
            _ => return Err(unhandled(&self.core, submode)),
        };
        self.core.set(submode, value);
        Ok(())
    }
}

register_indicator!(StatefullIndicator, "statefull", Rate::Instant);
