use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::{
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate, SubmodeFailure},
};
use crate::{
    config::indicators::IndicatorsConfig,
    core::{
        context::RunContext,
        measurements::{MeasurementCatalog, MeasurementDefinition, SkippedDefinition, SubmodeTarget},
    },
    register_indicator,
};

/// Emits the user-defined measurements of one rate under `<prefix>.custom`.
pub struct CustomIndicator {
    core: IndicatorCore,
    definitions: HashMap<i64, MeasurementDefinition>,
    submodes: Option<BTreeMap<String, i64>>,
    skipped: Vec<SkippedDefinition>,
}

impl CustomIndicator {
    pub fn new(name: &'static str, rate: Rate, config: &IndicatorsConfig) -> Self {
        CustomIndicator {
            core: IndicatorCore::new(name, rate, config.key("custom")),
            definitions: HashMap::new(),
            submodes: None,
            skipped: Vec::new(),
        }
    }

    /// Loads definitions and renders their submodes once per instance.
    /// Broken definitions are set aside, not fatal.
    async fn load(&mut self, ctx: &RunContext) -> IndicatorResult<&BTreeMap<String, i64>> {
        if self.submodes.is_none() {
            let catalog = MeasurementCatalog::new(ctx.store.clone());
            let mut loaded = catalog.load_measurements(self.core.rate()).await?;
            let mut targets = catalog.get_custom_submodes(&loaded.items, false).await;
            loaded.skipped.append(&mut targets.skipped);

            let submodes = targets
                .items
                .into_iter()
                .filter_map(|(key, target)| match target {
                    SubmodeTarget::Definition(id) => Some((key, id)),
                    SubmodeTarget::Label(_) => None,
                })
                .collect::<BTreeMap<_, _>>();
            debug!(
                "{}: {} measurements, {} submodes, {} skipped",
                self.core.name(),
                loaded.items.len(),
                submodes.len(),
                loaded.skipped.len()
            );
            self.definitions = loaded.items.into_iter().map(|d| (d.id, d)).collect();
            self.skipped = loaded.skipped;
            self.submodes = Some(submodes);
        }
        Ok(self.submodes.get_or_insert_with(BTreeMap::new))
    }
}

#[async_trait::async_trait]
impl Indicator for CustomIndicator {
    fn core(&self) -> &IndicatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut IndicatorCore {
        &mut self.core
    }

    async fn submodes(&mut self, ctx: &RunContext) -> IndicatorResult<Vec<Submode>> {
        Ok(self.load(ctx).await?.keys().map(Submode::plain).collect())
    }

    fn take_discovery_failures(&mut self) -> Vec<SubmodeFailure> {
        let name = self.core.name();
        self.skipped
            .drain(..)
            .map(|s| SubmodeFailure::new(name, &s.definition, s.error))
            .collect()
    }

    async fn acquire_submode(&mut self, ctx: &RunContext, submode: &Submode) -> IndicatorResult<()> {
        let key = submode.radical();
        let id = self.load(ctx).await?.get(key).copied();
        let definition = id
            .and_then(|id| self.definitions.get(&id))
            .cloned()
            .ok_or_else(|| unhandled(&self.core, submode))?;

        let catalog = MeasurementCatalog::new(ctx.store.clone());
        let value = catalog.acquire(&definition, key).await?;
        self.core.set(submode, value);
        Ok(())
    }
}

register_indicator!(
    "hourly_custom",
    Rate::Hourly,
    factory = |config| CustomIndicator::new("hourly_custom", Rate::Hourly, config)
);
register_indicator!(
    "daily_custom",
    Rate::Daily,
    factory = |config| CustomIndicator::new("daily_custom", Rate::Daily, config)
);
register_indicator!(
    "weekly_custom",
    Rate::Weekly,
    factory = |config| CustomIndicator::new("weekly_custom", Rate::Weekly, config)
);
register_indicator!(
    "monthly_custom",
    Rate::Monthly,
    factory = |config| CustomIndicator::new("monthly_custom", Rate::Monthly, config)
);
