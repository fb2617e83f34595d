use tracing::debug;

use super::{
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate},
};
use crate::{
    config::indicators::IndicatorsConfig,
    core::{
        context::{entity_ids, RunContext},
        store::{index_by, Params},
    },
    register_indicator,
};

const SUBMODES: &str = "<catid>requests,<catid>distinctusers";

const DAY: i64 = 24 * 3600;

// The first id of a category path is its top level ancestor.
const REQUESTS_SQL: &str = "
    SELECT
        REGEXP_SUBSTR(cc.path, '[0-9]+') AS catid,
        COUNT(*) AS rq
    FROM
        {logstore_standard_log} l,
        {course} c,
        {course_categories} cc
    WHERE
        l.courseid = c.id AND
        c.category = cc.id AND
        l.timecreated > ?
    GROUP BY
        REGEXP_SUBSTR(cc.path, '[0-9]+')
";

const DISTINCT_USERS_SQL: &str = "
    SELECT
        REGEXP_SUBSTR(cc.path, '[0-9]+') AS catid,
        COUNT(DISTINCT l.userid) AS du
    FROM
        {logstore_standard_log} l,
        {course} c,
        {course_categories} cc
    WHERE
        l.courseid = c.id AND
        c.category = cc.id AND
        l.timecreated > ?
    GROUP BY
        REGEXP_SUBSTR(cc.path, '[0-9]+')
";

/// Daily traffic rolled up to top level course categories.
pub struct DailyCoursecategoriesIndicator {
    core: IndicatorCore,
}

impl DailyCoursecategoriesIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        DailyCoursecategoriesIndicator {
            core: IndicatorCore::new(
                "daily_coursecategories",
                Rate::Daily,
                config.key("topcategory"),
            ),
        }
    }

    async fn category_ids(&mut self, ctx: &RunContext) -> IndicatorResult<Vec<String>> {
        if let Some(ids) = self.core.cached_entities("catid") {
            return Ok(ids);
        }
        let ids = entity_ids(ctx.top_categories().await?);
        self.core.remember_entities("catid", ids.clone());
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl Indicator for DailyCoursecategoriesIndicator {
    fn core(&self) -> &IndicatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut IndicatorCore {
        &mut self.core
    }

    async fn submodes(&mut self, ctx: &RunContext) -> IndicatorResult<Vec<Submode>> {
        if !ctx.config.discovery.top_categories {
            debug!("{}: top category discovery is off", self.core.name());
            return Ok(Vec::new());
        }
        Submode::parse_list(SUBMODES)
    }

    async fn acquire_submode(&mut self, ctx: &RunContext, submode: &Submode) -> IndicatorResult<()> {
        let (sql, column) = match submode.key().as_str() {
            "<catid>requests" => (REQUESTS_SQL, "rq"),
            "<catid>distinctusers" => (DISTINCT_USERS_SQL, "du"),
            _ => return Err(unhandled(&self.core, submode)),
        };

        let ids = self.category_ids(ctx).await?;
        let rows = ctx
            .store
            .get_records_sql(sql, &Params::positional([ctx.horizon(DAY)]))
            .await?;
        let found = index_by(rows, "catid");
        self.core.distribute(submode, &ids, |id| {
            found.get(id).and_then(|row| row.get(column).cloned())
        });
        Ok(())
    }
}

register_indicator!(
    DailyCoursecategoriesIndicator,
    "daily_coursecategories",
    Rate::Daily
);
