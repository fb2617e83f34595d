use super::{
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate},
    value::Value,
};
use crate::{
    config::indicators::IndicatorsConfig, core::context::RunContext, register_indicator,
};

const SUBMODES: &str = "all,visible,nonvisible";

/// Course totals by visibility.
pub struct CoursecountIndicator {
    core: IndicatorCore,
}

impl CoursecountIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        CoursecountIndicator {
            core: IndicatorCore::new("coursecount", Rate::Daily, config.key("courses")),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for CoursecountIndicator {
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
        let count = match submode.radical() {
            "all" => ctx.store.count_records("course", &[]).await?,
            "visible" => {
                ctx.store
                    .count_records("course", &[("visible", Value::from(1))])
                    .await?
            }
            "nonvisible" => {
                ctx.store
                    .count_records("course", &[("visible", Value::from(0))])
                    .await?
            }
            _ => return Err(unhandled(&self.core, submode)),
        };
        self.core.set(submode, count);
        Ok(())
    }
}

register_indicator!(CoursecountIndicator, "coursecount", Rate::Daily);
