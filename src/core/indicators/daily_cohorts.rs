use super::{
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

const SUBMODES: &str = "cohorts,empty,unenroled,system";

/// Context id of the system context.
const SYSTEM_CONTEXT: i64 = 1;

const EMPTY_SQL: &str = "
    SELECT
        COUNT(c.id) AS ecc
    FROM
        {cohort} c
    LEFT JOIN
        {cohort_members} cm
    ON
        cm.cohortid = c.id
    WHERE
        cm.cohortid IS NULL
";

const UNENROLED_SQL: &str = "
    SELECT
        COUNT(c.id) AS uec
    FROM
        {cohort} c
    LEFT JOIN
        {enrol} e
    ON
        e.enrol = 'cohort' AND
        e.customint1 = c.id
    WHERE
        e.customint1 IS NULL
";

/// Cohort totals, with the empty ones and those not used by any enrolment.
pub struct DailyCohortsIndicator {
    core: IndicatorCore,
}

impl DailyCohortsIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        DailyCohortsIndicator {
            core: IndicatorCore::new("daily_cohorts", Rate::Daily, config.key("cohort")),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for DailyCohortsIndicator {
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
        let count = match submode.radical() {
            "cohorts" => ctx.store.count_records("cohort", &[]).await?,
            "system" => {
                ctx.store
                    .count_records("cohort", &[("contextid", Value::from(SYSTEM_CONTEXT))])
                    .await?
            }
            "empty" => ctx.store.count_records_sql(EMPTY_SQL, &Params::None).await?,
            "unenroled" => ctx.store.count_records_sql(UNENROLED_SQL, &Params::None).await?,
            _ => return Err(unhandled(&self.core, submode)),
        };
        self.core.set(submode, count);
        Ok(())
    }
}

register_indicator!(DailyCohortsIndicator, "daily_cohorts", Rate::Daily);
