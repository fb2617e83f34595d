use time::{format_description::well_known::Rfc2822, OffsetDateTime};

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

const SUBMODES: &str = "<areatype>areassize,storedbackupsize,logsize,oldestlog";

/// File area types of the `<areatype>` family.
const AREA_TYPES: [&str; 2] = ["draft", "stored"];

const AREA_SIZES_SQL: &str = "
    SELECT
        SUM(CASE WHEN filearea = ? THEN filesize ELSE 0 END) AS draftareassize,
        SUM(CASE WHEN filearea != ? THEN filesize ELSE 0 END) AS storedareassize
    FROM
        {files}
";

const BACKUP_SIZE_SQL: &str = "
    SELECT
        SUM(filesize) AS size
    FROM
        {files}
    WHERE
        filesize != 0 AND
        (component = 'backup' OR (component = 'user' AND filearea = 'backup'))
";

const LOG_SIZE_SQL: &str = "
    SELECT
        COUNT(*)
    FROM
        {logstore_standard_log}
";

const OLDEST_LOG_SQL: &str = "
    SELECT
        MIN(timecreated) AS oldestlog
    FROM
        {logstore_standard_log}
";

/// File storage usage and log retention.
///
/// Both area sizes come from a single aggregate over the files table.
pub struct HourlyStorageIndicator {
    core: IndicatorCore,
}

impl HourlyStorageIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        HourlyStorageIndicator {
            core: IndicatorCore::new("hourly_storage", Rate::Hourly, config.key("storage")),
        }
    }

    async fn area_sizes(&mut self, ctx: &RunContext, submode: &Submode) -> IndicatorResult<()> {
        let sizes = ctx
            .store
            .get_record_sql(AREA_SIZES_SQL, &Params::positional(["draft", "draft"]))
            .await?
            .unwrap_or_default();

        let area_types: Vec<String> = AREA_TYPES.iter().map(|a| a.to_string()).collect();
        self.core.remember_entities("areatype", area_types.clone());
        self.core.distribute(submode, &area_types, |area| {
            sizes.get(&format!("{}{}", area, submode.radical())).cloned()
        });
        Ok(())
    }

    /// RFC 2822 date of the oldest standard log entry, empty without logs.
    async fn oldest_log(ctx: &RunContext) -> IndicatorResult<Value> {
        let oldest = ctx
            .store
            .get_record_sql(OLDEST_LOG_SQL, &Params::None)
            .await?
            .and_then(|r| r.get_i64("oldestlog"));
        let Some(timestamp) = oldest else {
            return Ok(Value::Text(String::new()));
        };
        let date = OffsetDateTime::from_unix_timestamp(timestamp)
            .map_err(|e| IndicatorError::query("oldestlog", e))?
            .format(&Rfc2822)
            .map_err(|e| IndicatorError::query("oldestlog", e))?;
        Ok(Value::Text(date))
    }
}

#[async_trait::async_trait]
impl Indicator for HourlyStorageIndicator {
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
        let value = match submode.key().as_str() {
            "<areatype>areassize" => return self.area_sizes(ctx, submode).await,
            "storedbackupsize" => ctx
                .store
                .get_record_sql(BACKUP_SIZE_SQL, &Params::None)
                .await?
                .and_then(|r| r.get("size").cloned())
                .unwrap_or(Value::Numeric(0.0)),
            "logsize" => Value::from(ctx.store.count_records_sql(LOG_SIZE_SQL, &Params::None).await?),
            "oldestlog" => Self::oldest_log(ctx).await?,
            _ => return Err(unhandled(&self.core, submode)),
        };
        self.core.set(submode, value);
        Ok(())
    }
}

register_indicator!(HourlyStorageIndicator, "hourly_storage", Rate::Hourly);
