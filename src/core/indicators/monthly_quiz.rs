use super::{
    monthly_usercount::previous_month,
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

const SUBMODES: &str = "monthlysuccessratio,monthlyquizinstancesall";

const QUIZ_INSTANCES_SQL: &str = "
    SELECT
        COUNT(*)
    FROM
        {quiz} q,
        {modules} m,
        {course_modules} cm
    WHERE
        (cm.deletioninprogress IS NULL OR cm.deletioninprogress = 0) AND
        q.id = cm.instance AND
        cm.module = m.id AND
        m.name = 'quiz'
";

/// Quiz grading outcomes over the previous calendar month and live quiz instances.
pub struct MonthlyQuizIndicator {
    core: IndicatorCore,
}

impl MonthlyQuizIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        MonthlyQuizIndicator {
            core: IndicatorCore::new("monthly_quiz", Rate::Monthly, config.key("quiz")),
        }
    }

    async fn graded(ctx: &RunContext, state: &str, window: &Params) -> IndicatorResult<i64> {
        ctx.store
            .count_records_select(
                "quiz_attempts",
                &format!("timefinish >= ? AND timefinish < ? AND state = '{}'", state),
                window,
            )
            .await
    }
}

#[async_trait::async_trait]
impl Indicator for MonthlyQuizIndicator {
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
            "monthlysuccessratio" => {
                let (start, end) = previous_month(ctx.now)?;
                let window = Params::positional([start, end]);
                let right = Self::graded(ctx, "graderight", &window).await?;
                let wrong = Self::graded(ctx, "gradewrong", &window).await?;
                Value::from(ratio(right as f64, (right + wrong) as f64, 2))
            }
            "monthlyquizinstancesall" => {
                Value::from(ctx.store.count_records_sql(QUIZ_INSTANCES_SQL, &Params::None).await?)
            }
            _ => return Err(unhandled(&self.core, submode)),
        };
        self.core.set(submode, value);
        Ok(())
    }
}

register_indicator!(MonthlyQuizIndicator, "monthly_quiz", Rate::Monthly);
