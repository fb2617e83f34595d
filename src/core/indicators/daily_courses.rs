use tracing::debug;

use super::{
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate},
    value::Value,
};
use crate::{
    config::indicators::IndicatorsConfig,
    core::{
        context::{entity_ids, RunContext},
        store::{index_by, Params},
    },
    register_indicator,
};

const SUBMODES: &str =
    "<courseid>requests,<courseid>distinctusers,<courseid>enrolled,<courseid>completed";

const DAY: i64 = 24 * 3600;

// `IN (?)` is widened to one placeholder per watched course.
const REQUESTS_SQL: &str = "
    SELECT
        c.id AS courseid,
        COUNT(*) AS rq
    FROM
        {logstore_standard_log} l,
        {course} c
    WHERE
        l.courseid = c.id AND
        c.id IN (?) AND
        l.timecreated > ?
    GROUP BY
        c.id
";

const DISTINCT_USERS_SQL: &str = "
    SELECT
        c.id AS courseid,
        COUNT(DISTINCT l.userid) AS du
    FROM
        {logstore_standard_log} l,
        {course} c
    WHERE
        l.courseid = c.id AND
        c.id IN (?) AND
        l.timecreated > ?
    GROUP BY
        c.id
";

const ENROLLED_SQL: &str = "
    SELECT
        c.id AS courseid,
        COUNT(DISTINCT ue.userid) AS enr
    FROM
        {user_enrolments} ue,
        {enrol} e,
        {course} c
    WHERE
        ue.enrolid = e.id AND
        ue.status = 0 AND
        e.courseid = c.id AND
        c.id IN (?) AND
        e.status = 0
    GROUP BY
        c.id
";

const COMPLETED_SQL: &str = "
    SELECT
        cc.course AS courseid,
        COUNT(*) AS comp
    FROM
        {course_completions} cc
    WHERE
        cc.course IN (?) AND
        cc.timecompleted > 0
    GROUP BY
        cc.course
";

/// Per-course activity for the configured courses of interest.
///
/// Each submode is one grouped query over all watched courses; courses
/// missing from the result report zero.
pub struct DailyCoursesIndicator {
    core: IndicatorCore,
}

impl DailyCoursesIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        DailyCoursesIndicator {
            core: IndicatorCore::new("daily_courses", Rate::Daily, config.key("course")),
        }
    }

    async fn course_ids(&mut self, ctx: &RunContext) -> IndicatorResult<Vec<String>> {
        if let Some(ids) = self.core.cached_entities("courseid") {
            return Ok(ids);
        }
        let ids = entity_ids(ctx.courses_of_interest().await?);
        self.core.remember_entities("courseid", ids.clone());
        Ok(ids)
    }
}

/// Widens the `IN (?)` of `sql` to `count` placeholders.
pub(crate) fn expand_in(sql: &str, count: usize) -> String {
    let placeholders = vec!["?"; count.max(1)].join(", ");
    sql.replacen("IN (?)", &format!("IN ({})", placeholders), 1)
}

#[async_trait::async_trait]
impl Indicator for DailyCoursesIndicator {
    fn core(&self) -> &IndicatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut IndicatorCore {
        &mut self.core
    }

    async fn submodes(&mut self, ctx: &RunContext) -> IndicatorResult<Vec<Submode>> {
        if ctx.courses_of_interest().await?.is_empty() {
            debug!("{}: no courses of interest", self.core.name());
            return Ok(Vec::new());
        }
        Submode::parse_list(SUBMODES)
    }

    async fn acquire_submode(&mut self, ctx: &RunContext, submode: &Submode) -> IndicatorResult<()> {
        let (sql, column, windowed) = match submode.key().as_str() {
            "<courseid>requests" => (REQUESTS_SQL, "rq", true),
            "<courseid>distinctusers" => (DISTINCT_USERS_SQL, "du", true),
            "<courseid>enrolled" => (ENROLLED_SQL, "enr", false),
            "<courseid>completed" => (COMPLETED_SQL, "comp", false),
            _ => return Err(unhandled(&self.core, submode)),
        };

        let ids = self.course_ids(ctx).await?;
        let mut params: Vec<Value> = ids
            .iter()
            .filter_map(|id| id.parse::<i64>().ok())
            .map(Value::from)
            .collect();
        if windowed {
            params.push(Value::from(ctx.horizon(DAY)));
        }

        let rows = ctx
            .store
            .get_records_sql(&expand_in(sql, ids.len()), &Params::Positional(params))
            .await?;
        let found = index_by(rows, "courseid");
        self.core.distribute(submode, &ids, |id| {
            found.get(id).and_then(|row| row.get(column).cloned())
        });
        Ok(())
    }
}

register_indicator!(DailyCoursesIndicator, "daily_courses", Rate::Daily);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::indicators::DiscoveryConfig,
        core::{
            emitter::Emitter,
            store::Record,
            testing::{run_context_with, RecordingSink, StaticRolePolicy, StubStore, NOW},
        },
    };

    fn watching(ids: Vec<i64>) -> IndicatorsConfig {
        IndicatorsConfig {
            discovery: DiscoveryConfig {
                courses_of_interest: ids,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn courses() -> Vec<Record> {
        vec![
            Record::new().with("id", 7).with("name", "PHY1"),
            Record::new().with("id", 9).with("name", "CHM"),
        ]
    }

    #[test]
    fn in_clause_is_widened() {
        assert_eq!(expand_in("c.id IN (?) AND x > ?", 3), "c.id IN (?, ?, ?) AND x > ?");
    }

    #[tokio::test]
    async fn no_courses_of_interest_means_no_submodes() {
        let store = Arc::new(StubStore::new());
        let ctx = run_context_with(
            Rate::Daily,
            store.clone(),
            Arc::new(StaticRolePolicy::default()),
            IndicatorsConfig::default(),
        );
        let mut indicator = DailyCoursesIndicator::new(&IndicatorsConfig::default());
        assert!(indicator.submodes(&ctx).await.unwrap().is_empty());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn batched_results_are_distributed_with_zero_default() {
        let store = Arc::new(
            StubStore::new()
                .on_records("FROM {course} WHERE id IN (7,9)", courses())
                .on_records("AS rq", vec![Record::new().with("courseid", 7).with("rq", 3)])
                .on_records(
                    "AS enr",
                    vec![
                        Record::new().with("courseid", 7).with("enr", 25),
                        Record::new().with("courseid", 9).with("enr", 12),
                    ],
                ),
        );
        let config = watching(vec![7, 9]);
        let ctx = run_context_with(
            Rate::Daily,
            store.clone(),
            Arc::new(StaticRolePolicy::default()),
            config.clone(),
        );

        let mut indicator = DailyCoursesIndicator::new(&config);
        assert!(indicator.acquire(&ctx).await.unwrap().is_empty());

        let core = indicator.core();
        assert_eq!(core.value("[7.requests]"), Some(&Value::from(3)));
        assert_eq!(core.value("[9.requests]"), Some(&Value::from(0)));
        assert_eq!(core.value("[9.enrolled]"), Some(&Value::from(12)));
        assert_eq!(core.value("[7.completed]"), Some(&Value::from(0)));

        // one entity lookup and one query per submode
        assert_eq!(store.call_count("{course} WHERE id IN"), 1);
        assert_eq!(store.calls().len(), 5);
        let (sql, params) = store
            .calls()
            .into_iter()
            .find(|(sql, _)| sql.contains("AS rq"))
            .unwrap();
        assert!(sql.contains("c.id IN (?, ?) AND"));
        assert_eq!(params, Params::positional([7, 9, NOW - DAY]));

        let sink = Arc::new(RecordingSink::default());
        let report = indicator.send(&ctx, &Emitter::new(sink.clone(), "lms")).await.unwrap();
        assert_eq!(report.sent, 8);
        assert!(sink.keys().contains(&"moodle.course.[9.distinctusers]".to_string()));
    }
}
