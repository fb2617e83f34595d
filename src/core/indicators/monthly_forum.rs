use tracing::trace;

use super::{
    daily_courses::expand_in,
    forum::{opened_discussions, posts},
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate},
    value::{ratio, Value},
};
use crate::{
    config::indicators::IndicatorsConfig,
    core::{context::RunContext, store::Params},
    register_indicator,
};

const SUBMODES: &str = "monthlyopeneddiscussions,monthlyposts,participation";

const MONTH: i64 = 30 * 24 * 3600;

const POSTERS_SQL: &str = "
    SELECT
        fd.course AS courseid,
        COUNT(DISTINCT fp.userid) AS posters
    FROM
        {forum_posts} fp,
        {forum_discussions} fd
    WHERE
        fp.discussion = fd.id AND
        fp.created > ?
    GROUP BY
        fd.course
";

// `IN (?)` is widened to one placeholder per course with posts.
const ENROLLED_SQL: &str = "
    SELECT
        COUNT(*)
    FROM
        (SELECT DISTINCT
            e.courseid,
            ue.userid
        FROM
            {user_enrolments} ue,
            {enrol} e
        WHERE
            ue.enrolid = e.id AND
            ue.status = 0 AND
            e.status = 0 AND
            e.courseid IN (?)) enrolled
";

/// Share of enrolled users who posted, over the courses that had forum posts.
async fn participation(ctx: &RunContext) -> IndicatorResult<f64> {
    let rows = ctx
        .store
        .get_records_sql(POSTERS_SQL, &Params::positional([ctx.horizon(MONTH)]))
        .await?;
    if rows.is_empty() {
        return Ok(0.0);
    }

    let mut courses = Vec::with_capacity(rows.len());
    let mut posters = 0;
    for row in &rows {
        courses.push(Value::from(row.require_i64("courseid", "forum posters")?));
        posters += row.get_i64("posters").unwrap_or(0);
    }
    let enrolled = ctx
        .store
        .count_records_sql(&expand_in(ENROLLED_SQL, courses.len()), &Params::Positional(courses))
        .await?;
    trace!("{} posters of {} enrolled users", posters, enrolled);
    Ok(ratio(posters as f64, enrolled as f64, 2))
}

/// Forum traffic and participation over the last 30 days.
pub struct MonthlyForumIndicator {
    core: IndicatorCore,
}

impl MonthlyForumIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        MonthlyForumIndicator {
            core: IndicatorCore::new("monthly_forum", Rate::Monthly, config.key("forum")),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for MonthlyForumIndicator {
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
            "monthlyopeneddiscussions" => {
                Value::from(opened_discussions(ctx, ctx.horizon(MONTH)).await?)
            }
            "monthlyposts" => Value::from(posts(ctx, ctx.horizon(MONTH)).await?),
            "participation" => Value::from(participation(ctx).await?),
            _ => return Err(unhandled(&self.core, submode)),
        };
        self.core.set(submode, value);
        Ok(())
    }
}

register_indicator!(MonthlyForumIndicator, "monthly_forum", Rate::Monthly);
