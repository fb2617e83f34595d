use super::{
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate},
    value::Value,
};
use crate::{
    config::indicators::IndicatorsConfig,
    core::{context::RunContext, store::Params},
    register_indicator,
};

const SUBMODES: &str = "webrequests,webrequestrate";

const WEB_REQUESTS: &str = "timecreated > ? AND origin = 'web'";

/// Web request volume over the last minute and last hour.
pub struct ActivityIndicator {
    core: IndicatorCore,
}

impl ActivityIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        ActivityIndicator {
            core: IndicatorCore::new("activity", Rate::Instant, config.key("general"))
                .suppressing_zeros(true),
        }
    }

    async fn web_requests_since(ctx: &RunContext, seconds: i64) -> IndicatorResult<i64> {
        ctx.store
            .count_records_select(
                "logstore_standard_log",
                WEB_REQUESTS,
                &Params::positional([ctx.horizon(seconds)]),
            )
            .await
    }
}

#[async_trait::async_trait]
impl Indicator for ActivityIndicator {
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
            "webrequests" => Value::from(Self::web_requests_since(ctx, 60).await?),
            // requests per minute, averaged over the hour
            "webrequestrate" => Value::from(Self::web_requests_since(ctx, 3600).await? as f64 / 60.0),
            _ => return Err(unhandled(&self.core, submode)),
        };
        self.core.set(submode, value);
        Ok(())
    }
}

register_indicator!(ActivityIndicator, "activity", Rate::Instant);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::{
        emitter::Emitter,
        testing::{run_context, run_context_with, RecordingSink, StaticRolePolicy, StubStore, NOW},
    };

    #[tokio::test]
    async fn rate_is_hourly_count_per_minute() {
        let store = Arc::new(StubStore::new().on_count("origin = 'web'", 90));
        let ctx = run_context_with(
            Rate::Instant,
            store.clone(),
            Arc::new(StaticRolePolicy::default()),
            IndicatorsConfig::default(),
        );
        let mut indicator = ActivityIndicator::new(&IndicatorsConfig::default());
        indicator.acquire(&ctx).await.unwrap();

        assert_eq!(indicator.core().value("webrequests"), Some(&Value::from(90)));
        assert_eq!(indicator.core().value("webrequestrate"), Some(&Value::from(1.5)));

        let horizons: Vec<_> = store.calls().into_iter().map(|(_, params)| params).collect();
        assert_eq!(
            horizons,
            vec![
                Params::positional([NOW - 60]),
                Params::positional([NOW - 3600]),
            ]
        );
    }

    #[tokio::test]
    async fn idle_site_sends_nothing() {
        let ctx = run_context(Rate::Instant, StubStore::new(), IndicatorsConfig::default());
        let mut indicator = ActivityIndicator::new(&IndicatorsConfig::default());
        indicator.acquire(&ctx).await.unwrap();

        let sink = Arc::new(RecordingSink::default());
        let report = indicator.send(&ctx, &Emitter::new(sink.clone(), "lms")).await.unwrap();
        assert_eq!(report.suppressed, 2);
        assert!(sink.metrics().is_empty());
    }
}
