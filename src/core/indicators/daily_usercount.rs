use tracing::trace;

use super::{
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate},
};
use crate::{
    config::indicators::IndicatorsConfig,
    core::{
        context::RunContext,
        roles::Archetype,
        store::Params,
    },
    register_indicator,
};

const SUBMODES: &str = "dailylogins,dailydistinctlogins,dailydistinctstudentlogins,\
                        dailydistinctteacherlogins,dailydistinctstafflogins";

const DAY: i64 = 24 * 3600;

/// Reads the archetype out of a `<prefix><archetype>logins` submode.
pub(crate) fn archetype_in(submode: &str, prefix: &str) -> Option<Archetype> {
    match submode.strip_prefix(prefix)?.strip_suffix("logins")? {
        "student" => Some(Archetype::Student),
        "teacher" => Some(Archetype::Teacher),
        "staff" => Some(Archetype::Staff),
        _ => None,
    }
}

/// Users selected by `select` on the user table that the role policy puts
/// in `archetype`.
pub(crate) async fn count_logins_by(
    ctx: &RunContext,
    select: &str,
    params: &Params,
    archetype: Archetype,
) -> IndicatorResult<i64> {
    let users = ctx
        .store
        .get_records_select("user", select, params, "id", "id, username")
        .await?;

    let mut count = 0;
    for user in &users {
        let id = user.require_i64("id", "user")?;
        if ctx.roles.match_policy(id, archetype).await? {
            count += 1;
        }
    }
    trace!("{} of {} users are {}", count, users.len(), archetype);
    Ok(count)
}

/// Logins over the last day, in total and by distinct user and role archetype.
pub struct DailyUsercountIndicator {
    core: IndicatorCore,
}

impl DailyUsercountIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        DailyUsercountIndicator {
            core: IndicatorCore::new("daily_usercount", Rate::Daily, config.key("users")),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for DailyUsercountIndicator {
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
        let since = Params::positional([ctx.horizon(DAY)]);
        let count = match submode.radical() {
            "dailylogins" => {
                ctx.store
                    .count_records_select(
                        "logstore_standard_log",
                        "timecreated > ? AND action = 'loggedin'",
                        &since,
                    )
                    .await?
            }
            "dailydistinctlogins" => {
                ctx.store
                    .count_records_select("user", "lastlogin > ?", &since)
                    .await?
            }
            other => match archetype_in(other, "dailydistinct") {
                Some(archetype) => count_logins_by(ctx, "lastlogin > ?", &since, archetype).await?,
                None => return Err(unhandled(&self.core, submode)),
            },
        };
        self.core.set(submode, count);
        Ok(())
    }
}

register_indicator!(DailyUsercountIndicator, "daily_usercount", Rate::Daily);
