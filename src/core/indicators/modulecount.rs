use super::{
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate},
};
use crate::{
    config::indicators::IndicatorsConfig,
    core::{
        context::{entity_ids, RunContext},
        store::{index_by, Params},
    },
    register_indicator,
};

const SUBMODES: &str = "all,<moduleid>instances";

const ALL_SQL: &str = "
    SELECT
        COUNT(*)
    FROM
        {course_modules}
    WHERE
        (deletioninprogress IS NULL OR deletioninprogress = 0) AND
        visibleoncoursepage = 1
";

const BY_MODULE_SQL: &str = "
    SELECT
        cm.module AS moduleid,
        COUNT(*) AS instances
    FROM
        {course_modules} cm
    WHERE
        (cm.deletioninprogress IS NULL OR cm.deletioninprogress = 0) AND
        cm.visibleoncoursepage = 1
    GROUP BY
        cm.module
";

/// Visible course module instances, in total and per module type.
pub struct ModulecountIndicator {
    core: IndicatorCore,
}

impl ModulecountIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        ModulecountIndicator {
            core: IndicatorCore::new("modulecount", Rate::Daily, config.key("modules")),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for ModulecountIndicator {
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
        match submode.key().as_str() {
            "all" => {
                let count = ctx.store.count_records_sql(ALL_SQL, &Params::None).await?;
                self.core.set(submode, count);
            }
            "<moduleid>instances" => {
                let ids = match self.core.cached_entities("moduleid") {
                    Some(ids) => ids,
                    None => {
                        let ids = entity_ids(ctx.module_types().await?);
                        self.core.remember_entities("moduleid", ids.clone());
                        ids
                    }
                };
                let rows = ctx.store.get_records_sql(BY_MODULE_SQL, &Params::None).await?;
                let found = index_by(rows, "moduleid");
                self.core.distribute(submode, &ids, |id| {
                    found.get(id).and_then(|row| row.get("instances").cloned())
                });
            }
            _ => return Err(unhandled(&self.core, submode)),
        }
        Ok(())
    }
}

register_indicator!(ModulecountIndicator, "modulecount", Rate::Daily);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        indicators::value::Value,
        store::Record,
        testing::{run_context, StubStore},
    };

    #[tokio::test]
    async fn instances_per_visible_module_type() {
        let store = StubStore::new()
            .on_count("visibleoncoursepage = 1", 130)
            .on_records(
                "{modules} WHERE visible = 1",
                vec![
                    Record::new().with("id", 1).with("name", "assign"),
                    Record::new().with("id", 9).with("name", "forum"),
                    Record::new().with("id", 16).with("name", "quiz"),
                ],
            )
            .on_records(
                "AS instances",
                vec![
                    Record::new().with("moduleid", 1).with("instances", 70),
                    Record::new().with("moduleid", 9).with("instances", 60),
                    Record::new().with("moduleid", 23).with("instances", 4),
                ],
            );
        let ctx = run_context(Rate::Daily, store, IndicatorsConfig::default());
        let mut indicator = ModulecountIndicator::new(&IndicatorsConfig::default());
        indicator.acquire(&ctx).await.unwrap();

        let core = indicator.core();
        assert_eq!(core.value("all"), Some(&Value::from(130)));
        assert_eq!(core.value("[1.instances]"), Some(&Value::from(70)));
        assert_eq!(core.value("[16.instances]"), Some(&Value::from(0)));
        // hidden module types are not part of the family
        assert!(core.value("[23.instances]").is_none());
    }
}
