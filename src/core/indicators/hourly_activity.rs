use super::{
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate},
    value::Value,
};
use crate::{
    config::indicators::IndicatorsConfig, core::context::RunContext, register_indicator,
};

const SUBMODES: &str = "cronlateness,adhocqueuesize";

/// Task scheduler health: cron lateness and pending ad hoc tasks.
pub struct HourlyActivityIndicator {
    core: IndicatorCore,
}

impl HourlyActivityIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        HourlyActivityIndicator {
            core: IndicatorCore::new("hourly_activity", Rate::Hourly, config.key("general"))
                .suppressing_zeros(true),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for HourlyActivityIndicator {
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
            "cronlateness" => {
                let last_start = ctx
                    .store
                    .get_field(
                        "config_plugins",
                        "value",
                        &[
                            ("plugin", Value::from("tool_task")),
                            ("name", Value::from("lastcronstart")),
                        ],
                    )
                    .await?
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                Value::from(ctx.timestamp() - last_start)
            }
            "adhocqueuesize" => Value::from(ctx.store.count_records("task_adhoc", &[]).await?),
            _ => return Err(unhandled(&self.core, submode)),
        };
        self.core.set(submode, value);
        Ok(())
    }
}

register_indicator!(HourlyActivityIndicator, "hourly_activity", Rate::Hourly);
