//! State shared by every indicator of one scheduled run.
//!
//! A `RunContext` is built when a run starts and dropped when it ends. Entity
//! lists that several indicators expand their templates over are resolved at
//! most once per run through the `RunCache`.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{
    indicators::types::{IndicatorResult, Rate},
    roles::RolePolicy,
    store::{DataStore, Params, Record},
};
use crate::config::indicators::IndicatorsConfig;

/// An entity backing a templated submode family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: i64,
    pub name: String,
}

impl Entity {
    fn from_record(record: &Record, operation: &str) -> IndicatorResult<Self> {
        Ok(Entity {
            id: record.require_i64("id", operation)?,
            name: record.get_str("name").unwrap_or_default(),
        })
    }
}

/// Renders entity ids as family member ids.
pub fn entity_ids(entities: &[Entity]) -> Vec<String> {
    entities.iter().map(|e| e.id.to_string()).collect()
}

#[derive(Debug, Default)]
pub struct RunCache {
    courses_of_interest: OnceCell<Vec<Entity>>,
    top_categories: OnceCell<Vec<Entity>>,
    module_types: OnceCell<Vec<Entity>>,
}

pub struct RunContext {
    pub rate: Rate,
    pub now: OffsetDateTime,
    pub store: Arc<dyn DataStore>,
    pub roles: Arc<dyn RolePolicy>,
    pub config: Arc<IndicatorsConfig>,
    cache: RunCache,
}

impl RunContext {
    pub fn new(
        rate: Rate,
        store: Arc<dyn DataStore>,
        roles: Arc<dyn RolePolicy>,
        config: Arc<IndicatorsConfig>,
    ) -> Self {
        RunContext {
            rate,
            now: OffsetDateTime::now_utc(),
            store,
            roles,
            config,
            cache: RunCache::default(),
        }
    }

    /// Pins the run clock.
    pub fn at(mut self, now: OffsetDateTime) -> Self {
        self.now = now;
        self
    }

    /// Unix time of the run start.
    pub fn timestamp(&self) -> i64 {
        self.now.unix_timestamp()
    }

    /// Unix time `seconds` before the run start.
    pub fn horizon(&self, seconds: i64) -> i64 {
        self.timestamp() - seconds
    }

    pub fn strict(&self) -> bool {
        self.config.strict
    }

    /// Configured courses that exist, ordered by id. Empty when none are watched.
    pub async fn courses_of_interest(&self) -> IndicatorResult<&[Entity]> {
        let courses = self
            .cache
            .courses_of_interest
            .get_or_try_init(|| async {
                let ids = &self.config.discovery.courses_of_interest;
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                let list = ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                let select = format!("id IN ({})", list);
                self.load_entities("course", &select, "id", "id, shortname AS name")
                    .await
            })
            .await?;
        Ok(courses)
    }

    /// Top level course categories. Empty when category discovery is off.
    pub async fn top_categories(&self) -> IndicatorResult<&[Entity]> {
        let categories = self
            .cache
            .top_categories
            .get_or_try_init(|| async {
                if !self.config.discovery.top_categories {
                    return Ok(Vec::new());
                }
                self.load_entities("course_categories", "parent = 0", "sortorder", "id, name")
                    .await
            })
            .await?;
        Ok(categories)
    }

    /// Installed and visible activity module types.
    pub async fn module_types(&self) -> IndicatorResult<&[Entity]> {
        let modules = self
            .cache
            .module_types
            .get_or_try_init(|| self.load_entities("modules", "visible = 1", "name", "id, name"))
            .await?;
        Ok(modules)
    }

    async fn load_entities(
        &self,
        table: &str,
        select: &str,
        sort: &str,
        fields: &str,
    ) -> IndicatorResult<Vec<Entity>> {
        let records = self
            .store
            .get_records_select(table, select, &Params::None, sort, fields)
            .await?;
        let entities = records
            .iter()
            .map(|r| Entity::from_record(r, table))
            .collect::<IndicatorResult<Vec<_>>>()?;
        debug!("Resolved {} {} entities", entities.len(), table);
        Ok(entities)
    }
}
