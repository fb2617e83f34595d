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

const SUBMODES: &str = "dailyattempts,dailyactivecourseswithattempts,dailydistinctattemptingusers";

const DAY: i64 = 24 * 3600;

const ACTIVE_COURSES_SQL: &str = "
    SELECT
        COUNT(DISTINCT q.course)
    FROM
        {quiz_attempts} qa,
        {quiz} q
    WHERE
        qa.quiz = q.id AND
        qa.state = 'finished' AND
        qa.timestart > ?
";

const ATTEMPTING_USERS_SQL: &str = "
    SELECT
        COUNT(DISTINCT qa.userid)
    FROM
        {quiz_attempts} qa
    WHERE
        qa.timestart > ? AND
        qa.state = 'finished'
";

/// Finished attempt counts started after `since`, by measure: `attempts`,
/// `activecourseswithattempts` or `distinctattemptingusers`. `None` for any
/// other measure.
pub(crate) async fn attempt_activity(
    ctx: &RunContext,
    measure: &str,
    since: i64,
) -> IndicatorResult<Option<i64>> {
    let params = Params::positional([since]);
    let count = match measure {
        "attempts" => {
            ctx.store
                .count_records_select("quiz_attempts", "timestart > ? AND state = 'finished'", &params)
                .await?
        }
        "activecourseswithattempts" => ctx.store.count_records_sql(ACTIVE_COURSES_SQL, &params).await?,
        "distinctattemptingusers" => ctx.store.count_records_sql(ATTEMPTING_USERS_SQL, &params).await?,
        _ => return Ok(None),
    };
    Ok(Some(count))
}

/// Finished quiz attempts over the last day.
pub struct DailyQuizIndicator {
    core: IndicatorCore,
}

impl DailyQuizIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        DailyQuizIndicator {
            core: IndicatorCore::new("daily_quiz", Rate::Daily, config.key("quiz")),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for DailyQuizIndicator {
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
        let measure = submode.radical().strip_prefix("daily").unwrap_or_default();
        match attempt_activity(ctx, measure, ctx.horizon(DAY)).await? {
            Some(count) => self.core.set(submode, count),
            None => return Err(unhandled(&self.core, submode)),
        }
        Ok(())
    }
}

register_indicator!(DailyQuizIndicator, "daily_quiz", Rate::Daily);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::{
        indicators::value::Value,
        testing::{run_context, run_context_with, StaticRolePolicy, StubStore, NOW},
    };

    #[tokio::test]
    async fn counts_finished_attempts_of_the_day() {
        let store = Arc::new(
            StubStore::new()
                .on_count("{quiz_attempts} WHERE timestart > ?", 140)
                .on_count("COUNT(DISTINCT q.course)", 6)
                .on_count("COUNT(DISTINCT qa.userid)", 52),
        );
        let ctx = run_context_with(
            Rate::Daily,
            store.clone(),
            Arc::new(StaticRolePolicy::default()),
            IndicatorsConfig::default(),
        );

        let mut indicator = DailyQuizIndicator::new(&IndicatorsConfig::default());
        indicator.acquire(&ctx).await.unwrap();

        let core = indicator.core();
        assert_eq!(core.value("dailyattempts"), Some(&Value::from(140)));
        assert_eq!(core.value("dailyactivecourseswithattempts"), Some(&Value::from(6)));
        assert_eq!(core.value("dailydistinctattemptingusers"), Some(&Value::from(52)));
        assert_eq!(core.key(), "moodle.quiz");
        for (_, params) in store.calls() {
            assert_eq!(params, Params::positional([NOW - DAY]));
        }
    }

    #[tokio::test]
    async fn unknown_measure_is_not_queried() {
        let ctx = run_context(Rate::Daily, StubStore::new(), IndicatorsConfig::default());
        assert_eq!(attempt_activity(&ctx, "grades", NOW).await.unwrap(), None);
    }
}
