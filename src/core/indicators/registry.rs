use std::{collections::BTreeMap, sync::Arc};

use once_cell::sync::Lazy;
use tracing::debug;

use super::{
    error::IndicatorError,
    traits::Indicator,
    types::{IndicatorResult, Rate},
};
use crate::config::indicators::IndicatorsConfig;

/// Builds a fresh indicator for one run.
pub type IndicatorFactory = fn(&IndicatorsConfig) -> Box<dyn Indicator>;

/// Registration record of one indicator type.
/// Built-in indicators submit theirs to the global inventory at compile time.
#[derive(Clone, Copy)]
pub struct IndicatorMeta {
    pub name: &'static str,
    pub rate: Rate,
    pub factory: IndicatorFactory,
}

inventory::collect!(IndicatorMeta);

/// Indicator types grouped by rate, in name order.
///
/// The table is scanned once. Indicators hold per-cycle state, so `load`
/// instantiates them anew for every run.
pub struct IndicatorRegistry {
    by_rate: BTreeMap<Rate, Vec<IndicatorMeta>>,
}

impl IndicatorRegistry {
    /// Registry of every indicator submitted through `register_indicator!`.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        for meta in inventory::iter::<IndicatorMeta> {
            if let Err(e) = registry.register(*meta) {
                debug!("Skipping inventory entry: {}", e);
            }
        }
        registry
    }

    pub fn empty() -> Self {
        IndicatorRegistry {
            by_rate: BTreeMap::new(),
        }
    }

    /// Adds an indicator type. Names are unique across rates.
    pub fn register(&mut self, meta: IndicatorMeta) -> IndicatorResult<()> {
        if self.contains(meta.name) {
            return Err(IndicatorError::Config(format!(
                "Indicator '{}' is already registered",
                meta.name
            )));
        }
        let entries = self.by_rate.entry(meta.rate).or_default();
        entries.push(meta);
        entries.sort_by_key(|m| m.name);
        Ok(())
    }

    /// Instantiates the enabled indicators of `rate`.
    pub fn load(&self, rate: Rate, config: &IndicatorsConfig) -> Vec<Box<dyn Indicator>> {
        self.entries(rate)
            .iter()
            .filter(|meta| {
                let disabled = config.is_disabled(meta.name);
                if disabled {
                    debug!("Indicator '{}' is disabled", meta.name);
                }
                !disabled
            })
            .map(|meta| (meta.factory)(config))
            .collect()
    }

    /// Instantiates one indicator by name.
    pub fn get(&self, name: &str, config: &IndicatorsConfig) -> IndicatorResult<Box<dyn Indicator>> {
        self.by_rate
            .values()
            .flatten()
            .find(|meta| meta.name == name)
            .map(|meta| (meta.factory)(config))
            .ok_or_else(|| IndicatorError::IndicatorNotFound(name.to_string()))
    }

    pub fn entries(&self, rate: Rate) -> &[IndicatorMeta] {
        self.by_rate.get(&rate).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn names(&self, rate: Rate) -> Vec<&'static str> {
        self.entries(rate).iter().map(|m| m.name).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_rate.values().flatten().any(|m| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.by_rate.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Process-wide registry built from the inventory on first use.
    pub fn global() -> Arc<IndicatorRegistry> {
        GLOBAL_REGISTRY.clone()
    }
}

impl Default for IndicatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_REGISTRY: Lazy<Arc<IndicatorRegistry>> =
    Lazy::new(|| Arc::new(IndicatorRegistry::new()));

/// Registers an indicator with the global inventory.
///
/// Either pass a type providing `fn new(&IndicatorsConfig) -> Self`, or a
/// name, a rate and a `factory = |config| ...` closure for indicator types
/// shared by several registrations.
#[macro_export]
macro_rules! register_indicator {
    ($name:literal, $rate:expr, factory = $factory:expr) => {
        inventory::submit! {
            $crate::core::indicators::registry::IndicatorMeta {
                name: $name,
                rate: $rate,
                factory: |config: &$crate::config::indicators::IndicatorsConfig|
                    -> Box<dyn $crate::core::indicators::traits::Indicator> {
                    Box::new(($factory)(config))
                },
            }
        }
    };
    ($indicator_type:ty, $name:expr, $rate:expr) => {
        inventory::submit! {
            $crate::core::indicators::registry::IndicatorMeta {
                name: $name,
                rate: $rate,
                factory: |config: &$crate::config::indicators::IndicatorsConfig|
                    -> Box<dyn $crate::core::indicators::traits::Indicator> {
                    Box::new(<$indicator_type>::new(config))
                },
            }
        }
    };
}
