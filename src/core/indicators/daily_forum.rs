use std::collections::HashMap;

use tracing::trace;

use super::{
    forum::{opened_discussions, posts},
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate},
    value::{ratio, Value},
};
use crate::{
    config::indicators::IndicatorsConfig,
    core::{context::RunContext, roles::Archetype, store::Params},
    register_indicator,
};

const SUBMODES: &str = "dailyopeneddiscussions,dailyposts,weekforumroleratio";

const DAY: i64 = 24 * 3600;
const WEEK: i64 = 7 * DAY;

/// Percentage of the last week's posts written by teachers, one decimal.
async fn teacher_post_share(ctx: &RunContext) -> IndicatorResult<f64> {
    let week_posts = ctx
        .store
        .get_records_select(
            "forum_posts",
            "created > ?",
            &Params::positional([ctx.horizon(WEEK)]),
            "id",
            "id, userid",
        )
        .await?;

    let mut teachers: HashMap<i64, bool> = HashMap::new();
    let mut by_teachers = 0;
    for post in &week_posts {
        let author = post.require_i64("userid", "forum_posts")?;
        let is_teacher = match teachers.get(&author) {
            Some(known) => *known,
            None => {
                let found = ctx.roles.match_policy(author, Archetype::Teacher).await?;
                teachers.insert(author, found);
                found
            }
        };
        if is_teacher {
            by_teachers += 1;
        }
    }
    trace!("{} of {} weekly posts by teachers", by_teachers, week_posts.len());
    Ok(ratio(by_teachers as f64 * 100.0, week_posts.len() as f64, 1))
}

/// Forum traffic over the last day, and the teachers' share of the last week.
pub struct DailyForumIndicator {
    core: IndicatorCore,
}

impl DailyForumIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        DailyForumIndicator {
            core: IndicatorCore::new("daily_forum", Rate::Daily, config.key("forum")),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for DailyForumIndicator {
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
            "dailyopeneddiscussions" => Value::from(opened_discussions(ctx, ctx.horizon(DAY)).await?),
            "dailyposts" => Value::from(posts(ctx, ctx.horizon(DAY)).await?),
            "weekforumroleratio" => Value::from(teacher_post_share(ctx).await?),
            _ => return Err(unhandled(&self.core, submode)),
        };
        self.core.set(submode, value);
        Ok(())
    }
}

register_indicator!(DailyForumIndicator, "daily_forum", Rate::Daily);
