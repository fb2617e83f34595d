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

const SUBMODES: &str = "openeddiscussions,posts";

const WINDOW: i64 = 5 * 60;

const OPENED_DISCUSSIONS_SQL: &str = "
    SELECT
        COUNT(*)
    FROM
        {forum_discussions} fd,
        {forum_posts} fp
    WHERE
        fd.firstpost = fp.id AND
        fp.created > ?
";

/// Discussions whose first post was written after `since`.
pub(crate) async fn opened_discussions(ctx: &RunContext, since: i64) -> IndicatorResult<i64> {
    ctx.store
        .count_records_sql(OPENED_DISCUSSIONS_SQL, &Params::positional([since]))
        .await
}

/// Forum posts written after `since`.
pub(crate) async fn posts(ctx: &RunContext, since: i64) -> IndicatorResult<i64> {
    ctx.store
        .count_records_select("forum_posts", "created > ?", &Params::positional([since]))
        .await
}

/// Forum traffic over the last five minutes.
pub struct ForumIndicator {
    core: IndicatorCore,
}

impl ForumIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        ForumIndicator {
            core: IndicatorCore::new("forum", Rate::Instant, config.key("forum"))
                .suppressing_zeros(true),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for ForumIndicator {
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
        let since = ctx.horizon(WINDOW);
        let count = match submode.radical() {
            "openeddiscussions" => opened_discussions(ctx, since).await?,
            "posts" => posts(ctx, since).await?,
            _ => return Err(unhandled(&self.core, submode)),
        };
        self.core.set(submode, count);
        Ok(())
    }
}

register_indicator!(ForumIndicator, "forum", Rate::Instant);
