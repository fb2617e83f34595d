//! Scheduled run of one rate.
//!
//! A `ScheduledRun` is what the host scheduler calls for each tier (instant,
//! hourly, daily, weekly, monthly). It instantiates the enabled indicators of
//! the tier, then acquires and sends each of them in turn. Everything is
//! awaited in sequence; nothing is spawned.

use std::{collections::BTreeSet, sync::Arc};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::{
    context::RunContext,
    emitter::{Emitter, MonitoringSink},
    indicators::{
        registry::IndicatorRegistry,
        types::{IndicatorResult, Rate, SendReport, SubmodeFailure},
    },
    roles::RolePolicy,
    store::DataStore,
};
use crate::config::{indicators::IndicatorsConfig, Config};

/// Submode recorded when a whole indicator failed, not one of its submodes.
pub const WHOLE_INDICATOR: &str = "*";

/// Outcome of one scheduled run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub rate: Rate,
    /// Indicators instantiated for the run.
    pub indicators: usize,
    pub sent: usize,
    pub suppressed: usize,
    pub failed: usize,
    pub failures: Vec<SubmodeFailure>,
}

impl RunSummary {
    fn new(rate: Rate) -> Self {
        RunSummary {
            rate,
            indicators: 0,
            sent: 0,
            suppressed: 0,
            failed: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, report: SendReport) {
        self.sent += report.sent;
        self.suppressed += report.suppressed;
        self.failures.extend(report.failures);
    }

    fn fail(&mut self, indicator: &str, error: &dyn std::fmt::Display) {
        self.failures
            .push(SubmodeFailure::new(indicator, WHOLE_INDICATOR, error));
    }
}

/// Runs every enabled indicator of a rate against one store and one sink.
pub struct ScheduledRun {
    registry: Arc<IndicatorRegistry>,
    store: Arc<dyn DataStore>,
    roles: Arc<dyn RolePolicy>,
    sink: Arc<dyn MonitoringSink>,
    config: Arc<Config>,
}

impl ScheduledRun {
    pub fn new(
        registry: Arc<IndicatorRegistry>,
        store: Arc<dyn DataStore>,
        roles: Arc<dyn RolePolicy>,
        sink: Arc<dyn MonitoringSink>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            registry,
            store,
            roles,
            sink,
            config,
        }
    }

    /// Acquires and sends every enabled indicator of `rate`.
    ///
    /// # Errors
    ///
    /// Only in strict mode: the first acquisition failure aborts the run and
    /// is returned. Otherwise failures are collected in the summary and the
    /// run goes on. Dispatch failures never abort.
    pub async fn run(&self, rate: Rate) -> IndicatorResult<RunSummary> {
        let indicators_config = Arc::new(self.config.indicators.clone());
        log_indicator_table(rate, &self.registry, &indicators_config);

        let ctx = RunContext::new(
            rate,
            self.store.clone(),
            self.roles.clone(),
            indicators_config.clone(),
        );
        let emitter = Emitter::new(self.sink.clone(), self.config.monitored_host());
        let mut indicators = self.registry.load(rate, &indicators_config);
        info!(
            "Starting {} run: {} indicators for host {}",
            rate,
            indicators.len(),
            emitter.host()
        );

        let mut summary = RunSummary::new(rate);
        summary.indicators = indicators.len();

        for indicator in indicators.iter_mut() {
            let name = indicator.name();
            match indicator.acquire(&ctx).await {
                Ok(failures) => summary.failures.extend(failures),
                Err(e) if ctx.strict() => {
                    error!("Aborting {} run, '{}' failed: {}", rate, name, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Skipping '{}': {}", name, e);
                    summary.fail(name, &e);
                    continue;
                }
            }

            match indicator.send(&ctx, &emitter).await {
                Ok(report) => {
                    debug!(
                        "'{}' sent {}, suppressed {}, failed {}",
                        name,
                        report.sent,
                        report.suppressed,
                        report.failed()
                    );
                    summary.record(report);
                }
                Err(e) => {
                    error!("Sending '{}' failed: {}", name, e);
                    summary.fail(name, &e);
                }
            }
        }

        summary.failed = summary.failures.len();
        info!(
            "Finished {} run: {} sent, {} suppressed, {} failed",
            rate, summary.sent, summary.suppressed, summary.failed
        );
        Ok(summary)
    }
}

/// Logs the indicators of `rate` with their status.
///
/// Disabled names that no rate knows about are listed too, so that typos in
/// the configuration show up.
fn log_indicator_table(rate: Rate, registry: &IndicatorRegistry, config: &IndicatorsConfig) {
    let available: BTreeSet<&str> = registry.names(rate).into_iter().collect();
    let unknown: BTreeSet<&str> = config
        .disabled
        .iter()
        .map(String::as_str)
        .filter(|name| !registry.contains(name))
        .collect();

    let name_width = available
        .iter()
        .chain(unknown.iter())
        .map(|s| s.len())
        .max()
        .unwrap_or(10)
        .max("Indicator".len());

    info!("{:<width$} | Status", "Indicator", width = name_width);
    info!("{}-+-{}", "-".repeat(name_width), "-".repeat(12));

    for name in &available {
        let status = if config.is_disabled(name) {
            "DISABLED"
        } else {
            "ENABLED"
        };
        info!("{:<width$} | {}", name, status, width = name_width);
    }
    for name in &unknown {
        info!("{:<width$} | DISABLED (unknown)", name, width = name_width);
    }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::core::{
        indicators::{
            error::IndicatorError,
            registry::{IndicatorFactory, IndicatorMeta},
            submode::Submode,
            traits::{Indicator, IndicatorCore},
        },
        testing::{FailingSink, RecordingSink, StaticRolePolicy, StubStore},
    };

    fn meta(name: &'static str, rate: Rate, factory: IndicatorFactory) -> IndicatorMeta {
        IndicatorMeta {
            name,
            rate,
            factory,
        }
    }

    fn scheduled(
        registry: IndicatorRegistry,
        store: StubStore,
        sink: Arc<dyn MonitoringSink>,
        config: Config,
    ) -> ScheduledRun {
        ScheduledRun::new(
            Arc::new(registry),
            Arc::new(store),
            Arc::new(StaticRolePolicy::default()),
            sink,
            Arc::new(config),
        )
    }

    /// Fails every acquisition with a query error.
    struct Broken {
        core: IndicatorCore,
    }

    /// Always acquires 1.
    struct Steady {
        core: IndicatorCore,
    }

    #[async_trait::async_trait]
    impl Indicator for Broken {
        fn core(&self) -> &IndicatorCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut IndicatorCore {
            &mut self.core
        }

        async fn submodes(&mut self, _ctx: &RunContext) -> IndicatorResult<Vec<Submode>> {
            Submode::parse_list("boom")
        }

        async fn acquire_submode(&mut self, _ctx: &RunContext, _submode: &Submode) -> IndicatorResult<()> {
            Err(IndicatorError::query("boom", "server has gone away"))
        }
    }

    #[async_trait::async_trait]
    impl Indicator for Steady {
        fn core(&self) -> &IndicatorCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut IndicatorCore {
            &mut self.core
        }

        async fn submodes(&mut self, _ctx: &RunContext) -> IndicatorResult<Vec<Submode>> {
            Submode::parse_list("ok")
        }

        async fn acquire_submode(&mut self, _ctx: &RunContext, submode: &Submode) -> IndicatorResult<()> {
            self.core.set(submode, 1);
            Ok(())
        }
    }

    fn broken_and_steady() -> IndicatorRegistry {
        let mut registry = IndicatorRegistry::empty();
        registry
            .register(meta("broken", Rate::Daily, |_| {
                Box::new(Broken {
                    core: IndicatorCore::new("broken", Rate::Daily, "moodle.broken"),
                })
            }))
            .unwrap();
        registry
            .register(meta("steady", Rate::Daily, |_| {
                Box::new(Steady {
                    core: IndicatorCore::new("steady", Rate::Daily, "moodle.steady"),
                })
            }))
            .unwrap();
        registry
    }

    mod run_tests {
        use super::*;

        #[tokio::test]
        async fn failures_are_recorded_and_the_run_goes_on() {
            let sink = Arc::new(RecordingSink::default());
            let run = scheduled(broken_and_steady(), StubStore::new(), sink.clone(), Config::default());

            let summary = run.run(Rate::Daily).await.unwrap();
            assert_eq!(summary.indicators, 2);
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.failures[0].indicator, "broken");
            // the failed submode is zero-filled and still sent
            assert_eq!(sink.keys(), vec!["moodle.broken.boom", "moodle.steady.ok"]);
            assert_eq!(sink.value_of("moodle.broken.boom").as_deref(), Some("0"));
        }

        #[tokio::test]
        async fn strict_mode_aborts_on_first_failure() {
            let mut config = Config::default();
            config.indicators.strict = true;
            let sink = Arc::new(RecordingSink::default());
            let run = scheduled(broken_and_steady(), StubStore::new(), sink.clone(), config);

            let err = run.run(Rate::Daily).await.unwrap_err();
            assert!(matches!(err, IndicatorError::Query { .. }));
            assert!(sink.metrics().is_empty());
        }

        #[tokio::test]
        #[traced_test]
        async fn disabled_indicators_are_skipped_and_listed() {
            let mut config = Config::default();
            config.indicators.disabled = vec!["broken".into(), "nosuchthing".into()];
            let sink = Arc::new(RecordingSink::default());
            let run = scheduled(broken_and_steady(), StubStore::new(), sink.clone(), config);

            let summary = run.run(Rate::Daily).await.unwrap();
            assert_eq!(summary.indicators, 1);
            assert_eq!(summary.failed, 0);
            assert_eq!(sink.keys(), vec!["moodle.steady.ok"]);
            assert!(logs_contain("DISABLED"));
            assert!(logs_contain("DISABLED (unknown)"));
        }

        #[tokio::test]
        async fn other_rates_are_not_run() {
            let sink = Arc::new(RecordingSink::default());
            let run = scheduled(broken_and_steady(), StubStore::new(), sink.clone(), Config::default());

            let summary = run.run(Rate::Weekly).await.unwrap();
            assert_eq!(summary.indicators, 0);
            assert!(sink.metrics().is_empty());
        }

        #[tokio::test]
        async fn metrics_are_filed_under_the_monitored_host() {
            let mut config = Config::default();
            config.sender.hostname = Some("lms-prod".into());
            let sink = Arc::new(RecordingSink::default());
            let run = scheduled(broken_and_steady(), StubStore::new(), sink.clone(), config);

            run.run(Rate::Daily).await.unwrap();
            assert!(sink.metrics().iter().all(|m| m.host == "lms-prod"));
        }

        #[tokio::test]
        async fn custom_measurement_end_to_end() {
            use crate::core::store::Record;

            let mut registry = IndicatorRegistry::empty();
            registry
                .register(meta("daily_custom", Rate::Daily, |config| {
                    Box::new(crate::core::indicators::custom::CustomIndicator::new(
                        "daily_custom",
                        Rate::Daily,
                        config,
                    ))
                }))
                .unwrap();
            let store = StubStore::new()
                .on_records(
                    "{report_zabbix_custom}",
                    vec![Record::new()
                        .with("id", 1)
                        .with("name", "Five")
                        .with("shortname", "shortname")
                        .with("units", "units")
                        .with("active", 1)
                        .with("sqlstatement", "SELECT 5 AS meas")
                        .with("context", "system")
                        .with("allow", "*")
                        .with("deny", "")
                        .with("rate", 2)],
                )
                .on_record("SELECT 5 AS meas", Record::new().with("meas", 5));
            let sink = Arc::new(RecordingSink::default());
            let run = scheduled(registry, store, sink.clone(), Config::default());

            let summary = run.run(Rate::Daily).await.unwrap();
            assert_eq!(summary.sent, 1);
            assert_eq!(
                sink.value_of("moodle.custom.[shortname.units]").as_deref(),
                Some("5")
            );
        }
    }

    #[cfg(feature = "builtin-indicators")]
    mod builtin_run_tests {
        use super::*;
        use crate::{
            config::indicators::DiscoveryConfig,
            core::{
                indicators::{
                    activity::ActivityIndicator, coursecount::CoursecountIndicator,
                    daily_coursecategories::DailyCoursecategoriesIndicator,
                    daily_courses::DailyCoursesIndicator,
                },
                store::Record,
            },
        };

        fn daily_registry() -> IndicatorRegistry {
            let mut registry = IndicatorRegistry::empty();
            registry
                .register(meta("coursecount", Rate::Daily, |c| {
                    Box::new(CoursecountIndicator::new(c))
                }))
                .unwrap();
            registry
                .register(meta("daily_courses", Rate::Daily, |c| {
                    Box::new(DailyCoursesIndicator::new(c))
                }))
                .unwrap();
            registry
                .register(meta("daily_coursecategories", Rate::Daily, |c| {
                    Box::new(DailyCoursecategoriesIndicator::new(c))
                }))
                .unwrap();
            registry
        }

        fn daily_store() -> StubStore {
            StubStore::new()
                .on_count("{course} WHERE 1 = 1", 10)
                .on_count("{course} WHERE visible = 1", 7)
                .on_count("{course} WHERE visible = 0", 3)
                .on_records(
                    "FROM {course} WHERE id IN (7,9)",
                    vec![
                        Record::new().with("id", 7).with("name", "PHY1"),
                        Record::new().with("id", 9).with("name", "CHM"),
                    ],
                )
                .on_records("AS rq", vec![Record::new().with("courseid", 7).with("rq", 3)])
        }

        fn watching_courses() -> Config {
            let mut config = Config::default();
            config.indicators.discovery = DiscoveryConfig {
                courses_of_interest: vec![7, 9],
                top_categories: false,
            };
            config
        }

        #[tokio::test]
        async fn daily_run_emits_counts_and_course_families() {
            let sink = Arc::new(RecordingSink::default());
            let run = scheduled(daily_registry(), daily_store(), sink.clone(), watching_courses());

            let summary = run.run(Rate::Daily).await.unwrap();
            assert_eq!(summary.indicators, 3);
            assert_eq!(summary.failed, 0);
            // 3 course counts, 4 course submodes over 2 courses, no categories
            assert_eq!(summary.sent, 11);

            assert_eq!(sink.value_of("moodle.courses.all").as_deref(), Some("10"));
            assert_eq!(sink.value_of("moodle.courses.visible").as_deref(), Some("7"));
            assert_eq!(sink.value_of("moodle.course.[7.requests]").as_deref(), Some("3"));
            assert_eq!(sink.value_of("moodle.course.[9.requests]").as_deref(), Some("0"));
            assert!(!sink.keys().iter().any(|k| k.starts_with("moodle.topcategory")));

            let json = serde_json::to_value(&summary).unwrap();
            assert_eq!(json["rate"], "daily");
            assert_eq!(json["sent"], 11);
            assert_eq!(json["failures"], serde_json::json!([]));
        }

        #[tokio::test]
        async fn dispatch_failure_is_counted_not_fatal() {
            let sink = Arc::new(FailingSink::new("courses.visible"));
            let run = scheduled(daily_registry(), daily_store(), sink.clone(), watching_courses());

            let summary = run.run(Rate::Daily).await.unwrap();
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.sent, 10);
            assert_eq!(summary.failures[0].indicator, "coursecount");
            assert_eq!(summary.failures[0].submode, "visible");

            let json = serde_json::to_value(&summary).unwrap();
            assert_eq!(json["failures"][0]["submode"], "visible");
        }

        #[tokio::test]
        #[traced_test]
        async fn instant_zeros_are_suppressed() {
            let mut registry = IndicatorRegistry::empty();
            registry
                .register(meta("activity", Rate::Instant, |c| {
                    Box::new(ActivityIndicator::new(c))
                }))
                .unwrap();
            let sink = Arc::new(RecordingSink::default());
            let run = scheduled(registry, StubStore::new(), sink.clone(), Config::default());

            let summary = run.run(Rate::Instant).await.unwrap();
            assert_eq!(summary.sent, 0);
            assert_eq!(summary.suppressed, 2);
            assert!(sink.metrics().is_empty());
            assert!(logs_contain("zero suppressed for webrequests"));
        }

        #[tokio::test]
        async fn global_registry_runs_weekly_tier() {
            let sink = Arc::new(RecordingSink::default());
            let run = ScheduledRun::new(
                IndicatorRegistry::global(),
                Arc::new(StubStore::new().on_count("auth = manual", 12)),
                Arc::new(StaticRolePolicy::default()),
                sink.clone(),
                Arc::new(Config::default()),
            );

            let summary = run.run(Rate::Weekly).await.unwrap();
            assert_eq!(summary.failed, 0);
            assert_eq!(sink.value_of("moodle.auth.weeklymanualusers").as_deref(), Some("12"));
        }
    }
}
