use super::{
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{DataType, IndicatorResult, Rate},
};
use crate::{
    config::indicators::IndicatorsConfig,
    core::{
        context::RunContext,
        store::{Params, Record},
    },
    register_indicator,
};

const SUBMODES: &str = "top3";

const WINDOW: i64 = 30 * 24 * 3600;

const TOP_COURSES_SQL: &str = "
    SELECT
        c.id,
        c.shortname,
        c.fullname,
        COUNT(*) AS logs
    FROM
        {logstore_standard_log} l,
        {course} c
    WHERE
        c.id = l.courseid AND
        l.origin = 'web' AND
        l.realuserid IS NULL AND
        l.timecreated > ? AND
        l.courseid > 1
    GROUP BY
        c.id, c.shortname, c.fullname
    ORDER BY
        logs DESC
    LIMIT 3
";

/// The three most requested courses of the last 30 days, as one text line.
pub struct CoursetopIndicator {
    core: IndicatorCore,
}

impl CoursetopIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        CoursetopIndicator {
            core: IndicatorCore::new("coursetop", Rate::Daily, config.key("courses"))
                .with_datatype(DataType::Text),
        }
    }
}

/// `<id>-<shortname> <fullname>`
fn describe(course: &Record) -> String {
    format!(
        "{}-{} {}",
        course.get_str("id").unwrap_or_default(),
        course.get_str("shortname").unwrap_or_default(),
        course.get_str("fullname").unwrap_or_default()
    )
}

#[async_trait::async_trait]
impl Indicator for CoursetopIndicator {
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
        if submode.radical() != "top3" {
            return Err(unhandled(&self.core, submode));
        }
        let courses = ctx
            .store
            .get_records_sql(TOP_COURSES_SQL, &Params::positional([ctx.horizon(WINDOW)]))
            .await?;
        let top = courses.iter().map(describe).collect::<Vec<_>>().join(", ");
        self.core.set(submode, top);
        Ok(())
    }
}

register_indicator!(CoursetopIndicator, "coursetop", Rate::Daily);
