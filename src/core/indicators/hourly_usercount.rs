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

const SUBMODES: &str = "connected,active";

const RECENT_USERS_SQL: &str = "
    SELECT
        COUNT(DISTINCT u.id)
    FROM
        {user} u
    WHERE
        u.lastaccess > ?
";

/// Users seen in the last 15 minutes (connected) and 3 minutes (active).
pub struct HourlyUsercountIndicator {
    core: IndicatorCore,
}

impl HourlyUsercountIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        HourlyUsercountIndicator {
            core: IndicatorCore::new("hourly_usercount", Rate::Hourly, config.key("users")),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for HourlyUsercountIndicator {
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
        let window = match submode.radical() {
            "connected" => 15 * 60,
            "active" => 3 * 60,
            _ => return Err(unhandled(&self.core, submode)),
        };
        let users = ctx
            .store
            .count_records_sql(RECENT_USERS_SQL, &Params::positional([ctx.horizon(window)]))
            .await?;
        self.core.set(submode, users);
        Ok(())
    }
}

register_indicator!(HourlyUsercountIndicator, "hourly_usercount", Rate::Hourly);
