use time::{Date, Month, OffsetDateTime, Time};

use super::{
    daily_usercount::{archetype_in, count_logins_by},
    error::IndicatorError,
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

const SUBMODES: &str = "monthlyalive,monthlylogins,monthlydistinctlogins,\
                        monthlydistinctstudentlogins,monthlydistinctteacherlogins,\
                        monthlydistinctstafflogins";

/// Unix bounds `[start, end)` of the calendar month before `now`.
pub fn previous_month(now: OffsetDateTime) -> IndicatorResult<(i64, i64)> {
    let this_month = Date::from_calendar_date(now.year(), now.month(), 1)
        .map_err(|e| IndicatorError::Config(e.to_string()))?;
    let (year, month) = match now.month() {
        Month::January => (now.year() - 1, Month::December),
        month => (now.year(), month.previous()),
    };
    let last_month = Date::from_calendar_date(year, month, 1)
        .map_err(|e| IndicatorError::Config(e.to_string()))?;
    let start = last_month.with_time(Time::MIDNIGHT).assume_offset(now.offset());
    let end = this_month.with_time(Time::MIDNIGHT).assume_offset(now.offset());
    Ok((start.unix_timestamp(), end.unix_timestamp()))
}

/// User population and login activity over the previous calendar month.
pub struct MonthlyUsercountIndicator {
    core: IndicatorCore,
}

impl MonthlyUsercountIndicator {
    pub fn new(config: &IndicatorsConfig) -> Self {
        MonthlyUsercountIndicator {
            core: IndicatorCore::new("monthly_usercount", Rate::Monthly, config.key("users")),
        }
    }
}

#[async_trait::async_trait]
impl Indicator for MonthlyUsercountIndicator {
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
        let (start, end) = previous_month(ctx.now)?;
        let window = Params::positional([start, end]);
        let count = match submode.radical() {
            "monthlyalive" => {
                ctx.store
                    .count_records(
                        "user",
                        &[("deleted", Value::from(0)), ("suspended", Value::from(0))],
                    )
                    .await?
            }
            "monthlylogins" => {
                ctx.store
                    .count_records_select(
                        "logstore_standard_log",
                        "timecreated >= ? AND timecreated < ? AND action = 'loggedin'",
                        &window,
                    )
                    .await?
            }
            "monthlydistinctlogins" => {
                ctx.store
                    .count_records_select("user", "lastlogin >= ? AND lastlogin < ?", &window)
                    .await?
            }
            other => match archetype_in(other, "monthlydistinct") {
                Some(archetype) => {
                    count_logins_by(ctx, "lastlogin >= ? AND lastlogin < ?", &window, archetype)
                        .await?
                }
                None => return Err(unhandled(&self.core, submode)),
            },
        };
        self.core.set(submode, count);
        Ok(())
    }
}

register_indicator!(MonthlyUsercountIndicator, "monthly_usercount", Rate::Monthly);
