use super::{
    submode::Submode,
    traits::{unhandled, Indicator, IndicatorCore},
    types::{IndicatorResult, Rate},
    value::Value,
};
use crate::{
    config::indicators::IndicatorsConfig, core::context::RunContext, register_indicator,
};

/// Always reported, enabled or not.
const BASE_AUTHS: [&str; 3] = ["manual", "ldap", "cas"];

/// Auth plugins of the `weekly<auth>users` submodes.
///
/// Every `cas*` variant is reported as `cas`.
pub fn auth_methods(enabled: &[String]) -> Vec<String> {
    let mut auths: Vec<String> = BASE_AUTHS.iter().map(|a| a.to_string()).collect();
    for auth in enabled {
        let auth = auth.trim();
        let auth = if auth.starts_with("cas") { "cas" } else { auth };
        if !auth.is_empty() && !auths.iter().any(|a| a == auth) {
            auths.push(auth.to_string());
        }
    }
    auths
}

/// Active accounts per authentication method.
pub struct WeeklyAuthcountIndicator {
    core: IndicatorCore,
    submodes: Vec<Submode>,
}

impl WeeklyAuthcountIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        let submodes = auth_methods(&config.site.auth)
            .into_iter()
            .map(|auth| Submode::plain(format!("weekly{}users", auth)))
            .collect();
        WeeklyAuthcountIndicator {
            core: IndicatorCore::new("weekly_authcount", Rate::Weekly, config.key("auth")),
            submodes,
        }
    }
}

#[async_trait::async_trait]
impl Indicator for WeeklyAuthcountIndicator {
    fn core(&self) -> &IndicatorCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut IndicatorCore {
        &mut self.core
    }

    async fn submodes(&mut self, _ctx: &RunContext) -> IndicatorResult<Vec<Submode>> {
        Ok(self.submodes.clone())
    }

    async fn acquire_submode(&mut self, ctx: &RunContext, submode: &Submode) -> IndicatorResult<()> {
        let Some(auth) = submode
            .radical()
            .strip_prefix("weekly")
            .and_then(|s| s.strip_suffix("users"))
            .filter(|s| !s.is_empty())
        else {
            return Err(unhandled(&self.core, submode));
        };
        let users = ctx
            .store
            .count_records(
                "user",
                &[
                    ("auth", Value::from(auth)),
                    ("deleted", Value::from(0)),
                    ("suspended", Value::from(0)),
                ],
            )
            .await?;
        self.core.set(submode, users);
        Ok(())
    }
}

register_indicator!(WeeklyAuthcountIndicator, "weekly_authcount", Rate::Weekly);
