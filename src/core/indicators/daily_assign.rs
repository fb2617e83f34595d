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

const SUBMODES: &str = "dailysubmissions,activeassigns";

const DAY: i64 = 24 * 3600;

const SUBMISSIONS_SQL: &str = "
    SELECT
        COUNT(*)
    FROM
        {assign_submission} asu
    WHERE
        asu.timecreated > ? AND
        asu.status = 'submitted'
";

// Visible assignments in visible courses and categories, open for
// submissions at some point of the last day.
const ACTIVE_ASSIGNS_SQL: &str = "
    SELECT
        COUNT(*)
    FROM
        {assign} a,
        {course_modules} cm,
        {modules} m,
        {course} c,
        {course_categories} cc1
    LEFT JOIN
        {course_categories} cc2
    ON
        cc1.parent = cc2.id
    WHERE
        c.visible = 1 AND
        cm.visible > 0 AND
        (cm.deletioninprogress IS NULL OR cm.deletioninprogress = 0) AND
        a.id = cm.instance AND
        cm.module = m.id AND
        m.name = 'assign' AND
        cm.course = c.id AND
        c.category = cc1.id AND
        c.startdate < ? AND
        (c.enddate = 0 OR c.enddate > ?) AND
        cc1.visible = 1 AND
        (cc2.id IS NULL OR cc2.visible = 1) AND
        a.allowsubmissionsfromdate < ? AND
        (a.duedate = 0 OR a.duedate > ?)
";

/// Assignment submissions of the last day and assignments open to students.
pub struct DailyAssignIndicator {
    core: IndicatorCore,
}

impl DailyAssignIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        DailyAssignIndicator {
            core: IndicatorCore::new("daily_assign", Rate::Daily, config.key("assign")),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for DailyAssignIndicator {
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
        let (now, day_ago) = (ctx.timestamp(), ctx.horizon(DAY));
        let (sql, params) = match submode.radical() {
            "dailysubmissions" => (SUBMISSIONS_SQL, Params::positional([day_ago])),
            "activeassigns" => (
                ACTIVE_ASSIGNS_SQL,
                Params::positional([now, day_ago, now, day_ago]),
            ),
            _ => return Err(unhandled(&self.core, submode)),
        };
        let count = ctx.store.count_records_sql(sql, &params).await?;
        self.core.set(submode, count);
        Ok(())
    }
}

register_indicator!(DailyAssignIndicator, "daily_assign", Rate::Daily);
