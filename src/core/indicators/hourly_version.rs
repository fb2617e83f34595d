use super::{
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{DataType, IndicatorResult, Rate},
    value::Value,
};
use crate::{
    config::indicators::IndicatorsConfig, core::context::RunContext, register_indicator,
};

const SUBMODES: &str = "version,release";

/// Installed platform version and release label, sent as text.
pub struct HourlyVersionIndicator {
    core: IndicatorCore,
}

impl HourlyVersionIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        HourlyVersionIndicator {
            core: IndicatorCore::new("hourly_version", Rate::Hourly, config.key("general"))
                .with_datatype(DataType::Text),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for HourlyVersionIndicator {
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
        let name = match submode.radical() {
            name @ ("version" | "release") => name,
            _ => return Err(unhandled(&self.core, submode)),
        };
        let value = ctx
            .store
            .get_field("config", "value", &[("name", Value::from(name))])
            .await?
            .map(|v| Value::Text(v.to_string()))
            .unwrap_or_else(|| Value::empty_for(DataType::Text));
        self.core.set(submode, value);
        Ok(())
    }
}

register_indicator!(HourlyVersionIndicator, "hourly_version", Rate::Hourly);
