use super::{
    daily_quiz::attempt_activity,
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

const SUBMODES: &str = "weeklyattempts,weeklyactivecourseswithattempts,\
                        weeklydistinctattemptingusers,weeklyaverageattemptduration,\
                        weeklyaveragequestionduration";

const WEEK: i64 = 7 * 24 * 3600;

// Attempts lasting 3000s or more were closed by the session or the cron.
const ATTEMPT_DURATION_SQL: &str = "
    SELECT
        AVG(qa.timefinish - qa.timestart) AS measurement
    FROM
        {quiz_attempts} qa
    WHERE
        qa.timestart > ? AND
        qa.timefinish > 0 AND
        qa.state = 'finished' AND
        qa.timefinish - qa.timestart < 3000
";

// Questions are the non zero slots of the layout: drop `,0` page breaks,
// strip the digits and count the remaining commas.
const QUESTION_DURATION_SQL: &str = "
    SELECT
        AVG((qa.timefinish - qa.timestart) /
            CHARACTER_LENGTH(REGEXP_REPLACE(REPLACE(qa.layout, ',0', ''), '[0-9]+', ''))) AS measurement
    FROM
        {quiz_attempts} qa
    WHERE
        qa.timestart > ? AND
        qa.timefinish > 0 AND
        qa.state = 'finished' AND
        qa.timefinish - qa.timestart < 3000
";

/// Average in seconds, 0 when no attempt qualifies.
async fn average(ctx: &RunContext, sql: &str) -> IndicatorResult<f64> {
    let row = ctx
        .store
        .get_record_sql(sql, &Params::positional([ctx.horizon(WEEK)]))
        .await?;
    let avg = row.and_then(|r| r.get_f64("measurement")).unwrap_or(0.0);
    Ok(round_to(avg, 2))
}

/// Finished quiz attempts and their durations over the last week.
pub struct WeeklyQuizIndicator {
    core: IndicatorCore,
}

impl WeeklyQuizIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        WeeklyQuizIndicator {
            core: IndicatorCore::new("weekly_quiz", Rate::Weekly, config.key("quiz")),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for WeeklyQuizIndicator {
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
            "weeklyaverageattemptduration" => Value::from(average(ctx, ATTEMPT_DURATION_SQL).await?),
            "weeklyaveragequestionduration" => Value::from(average(ctx, QUESTION_DURATION_SQL).await?),
            other => {
                let measure = other.strip_prefix("weekly").unwrap_or_default();
                match attempt_activity(ctx, measure, ctx.horizon(WEEK)).await? {
                    Some(count) => Value::from(count),
                    None => return Err(unhandled(&self.core, submode)),
                }
            }
        };
        self.core.set(submode, value);
        Ok(())
    }
}

register_indicator!(WeeklyQuizIndicator, "weekly_quiz", Rate::Weekly);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::{
        store::Record,
        testing::{run_context, run_context_with, StaticRolePolicy, StubStore, NOW},
    };

    #[tokio::test]
    async fn weekly_counts_and_durations() {
        let store = Arc::new(
            StubStore::new()
                .on_count("{quiz_attempts} WHERE timestart > ?", 900)
                .on_record(
                    "CHARACTER_LENGTH",
                    Record::new().with("measurement", 41.666),
                )
                .on_record(
                    "AVG(qa.timefinish - qa.timestart)",
                    Record::new().with("measurement", 612.5),
                ),
        );
        let ctx = run_context_with(
            Rate::Weekly,
            store.clone(),
            Arc::new(StaticRolePolicy::default()),
            IndicatorsConfig::default(),
        );

        let mut indicator = WeeklyQuizIndicator::new(&IndicatorsConfig::default());
        assert!(indicator.acquire(&ctx).await.unwrap().is_empty());

        let core = indicator.core();
        assert_eq!(core.value("weeklyattempts"), Some(&Value::from(900)));
        assert_eq!(core.value("weeklydistinctattemptingusers"), Some(&Value::from(0)));
        assert_eq!(core.value("weeklyaverageattemptduration"), Some(&Value::from(612.5)));
        assert_eq!(core.value("weeklyaveragequestionduration"), Some(&Value::from(41.67)));
        for (_, params) in store.calls() {
            assert_eq!(params, Params::positional([NOW - WEEK]));
        }
    }

    #[tokio::test]
    async fn no_attempts_average_to_zero() {
        let ctx = run_context(Rate::Weekly, StubStore::new(), IndicatorsConfig::default());
        let mut indicator = WeeklyQuizIndicator::new(&IndicatorsConfig::default());
        indicator.acquire(&ctx).await.unwrap();
        assert_eq!(
            indicator.core().value("weeklyaverageattemptduration"),
            Some(&Value::from(0.0))
        );
    }
}
