use super::{
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate},
};
use crate::{
    config::indicators::IndicatorsConfig,
    core::{context::RunContext, store::Params},
    register_indicator,
};

const SUBMODES: &str = "dailycreated,dailyvisited";

const DAY: i64 = 24 * 3600;

const CREATED_SQL: &str = "
    SELECT
        COUNT(DISTINCT c.id)
    FROM
        {course} c
    WHERE
        c.timecreated > ?
";

const VISITED_SQL: &str = "
    SELECT
        COUNT(DISTINCT courseid)
    FROM
        {user_lastaccess}
    WHERE
        timeaccess > ?
";

/// Courses created and courses visited over the last day.
pub struct DailyCoursecountIndicator {
    core: IndicatorCore,
}

impl DailyCoursecountIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        DailyCoursecountIndicator {
            core: IndicatorCore::new("daily_coursecount", Rate::Daily, config.key("courses")),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for DailyCoursecountIndicator {
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
        let sql = match submode.radical() {
            "dailycreated" => CREATED_SQL,
            "dailyvisited" => VISITED_SQL,
            _ => return Err(unhandled(&self.core, submode)),
        };
        let count = ctx
            .store
            .count_records_sql(sql, &Params::positional([ctx.horizon(DAY)]))
            .await?;
        self.core.set(submode, count);
        Ok(())
    }
}

register_indicator!(DailyCoursecountIndicator, "daily_coursecount", Rate::Daily);
