use super::{
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate},
    value::{round_to, Value},
};
use crate::{
    config::indicators::IndicatorsConfig,
    core::{context::RunContext, store::Params},
    register_indicator,
};

const SUBMODES: &str = "dailymodulescompletions,dailydistinctmodulescompleted,\
                        dailycoursecompletions,dailyavgtimetocompletefromstart,\
                        dailyavgtimetocompletefromenrol";

const DAY: i64 = 24 * 3600;

const MODULE_COMPLETIONS_SQL: &str = "
    SELECT
        COUNT(*)
    FROM
        {course_modules_completion} ccm,
        {course_modules} cm
    WHERE
        ccm.coursemoduleid = cm.id AND
        (cm.deletioninprogress IS NULL OR cm.deletioninprogress = 0) AND
        ccm.completionstate = 1 AND
        ccm.timemodified >= ?
";

const DISTINCT_MODULES_SQL: &str = "
    SELECT
        COUNT(DISTINCT ccm.coursemoduleid)
    FROM
        {course_modules_completion} ccm,
        {course_modules} cm
    WHERE
        ccm.coursemoduleid = cm.id AND
        (cm.deletioninprogress IS NULL OR cm.deletioninprogress = 0) AND
        ccm.completionstate = 1 AND
        ccm.timemodified >= ?
";

/// Average course completion delay in days, measured from `since_column`.
async fn average_days_from(ctx: &RunContext, since_column: &str) -> IndicatorResult<f64> {
    let sql = format!(
        "
        SELECT
            AVG(timecompleted - {}) AS measurement
        FROM
            {{course_completions}}
        WHERE
            timecompleted >= ?
        ",
        since_column
    );
    let row = ctx
        .store
        .get_record_sql(&sql, &Params::positional([ctx.horizon(DAY)]))
        .await?;
    let seconds = row.and_then(|r| r.get_f64("measurement")).unwrap_or(0.0);
    Ok(round_to(seconds / DAY as f64, 2))
}

/// Activity and course completions over the last day.
pub struct DailyCompletionIndicator {
    core: IndicatorCore,
}

impl DailyCompletionIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        DailyCompletionIndicator {
            core: IndicatorCore::new("daily_completion", Rate::Daily, config.key("completion")),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for DailyCompletionIndicator {
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
        let since = Params::positional([ctx.horizon(DAY)]);
        let value = match submode.radical() {
            "dailymodulescompletions" => {
                Value::from(ctx.store.count_records_sql(MODULE_COMPLETIONS_SQL, &since).await?)
            }
            "dailydistinctmodulescompleted" => {
                Value::from(ctx.store.count_records_sql(DISTINCT_MODULES_SQL, &since).await?)
            }
            "dailycoursecompletions" => Value::from(
                ctx.store
                    .count_records_select("course_completions", "timecompleted >= ?", &since)
                    .await?,
            ),
            "dailyavgtimetocompletefromstart" => Value::from(average_days_from(ctx, "timestarted").await?),
            "dailyavgtimetocompletefromenrol" => Value::from(average_days_from(ctx, "timeenrolled").await?),
            _ => return Err(unhandled(&self.core, submode)),
        };
        self.core.set(submode, value);
        Ok(())
    }
}

register_indicator!(DailyCompletionIndicator, "daily_completion", Rate::Daily);
