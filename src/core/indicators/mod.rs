/// Instant web request volume.
#[cfg(feature = "builtin-indicators")]
pub mod activity;

/// Course totals by visibility.
#[cfg(feature = "builtin-indicators")]
pub mod coursecount;

/// Most requested courses of the last 30 days.
#[cfg(feature = "builtin-indicators")]
pub mod coursetop;

/// User-defined measurements, one indicator per rate.
pub mod custom;

/// Assignment submissions and open assignments.
#[cfg(feature = "builtin-indicators")]
pub mod daily_assign;

/// Cohort totals.
#[cfg(feature = "builtin-indicators")]
pub mod daily_cohorts;

/// Activity and course completions of the last day.
#[cfg(feature = "builtin-indicators")]
pub mod daily_completion;

/// Per top category traffic. Requires `discovery.top_categories`.
#[cfg(feature = "builtin-indicators")]
pub mod daily_coursecategories;

/// Courses created and visited over the last day.
#[cfg(feature = "builtin-indicators")]
pub mod daily_coursecount;

/// Per course activity. Requires `discovery.courses_of_interest`.
#[cfg(feature = "builtin-indicators")]
pub mod daily_courses;

/// Daily forum traffic and teacher share of posts.
#[cfg(feature = "builtin-indicators")]
pub mod daily_forum;

/// Finished quiz attempts of the last day.
#[cfg(feature = "builtin-indicators")]
pub mod daily_quiz;

/// Daily logins, split by role archetype.
#[cfg(feature = "builtin-indicators")]
pub mod daily_usercount;

/// Error types and handling utilities.
/// Common error type used by indicators, collaborators and the emission path.
pub mod error;

/// Forum traffic of the last minutes.
#[cfg(feature = "builtin-indicators")]
pub mod forum;

/// Task scheduler health.
#[cfg(feature = "builtin-indicators")]
pub mod hourly_activity;

/// File storage usage and log retention.
#[cfg(feature = "builtin-indicators")]
pub mod hourly_storage;

/// Connected and active users.
#[cfg(feature = "builtin-indicators")]
pub mod hourly_usercount;

/// Platform version and release.
#[cfg(feature = "builtin-indicators")]
pub mod hourly_version;

/// Visible course modules per module type.
#[cfg(feature = "builtin-indicators")]
pub mod modulecount;

/// Forum traffic and participation over 30 days.
#[cfg(feature = "builtin-indicators")]
pub mod monthly_forum;

/// Quiz success ratio and live quiz instances.
#[cfg(feature = "builtin-indicators")]
pub mod monthly_quiz;

/// Previous calendar month user activity.
#[cfg(feature = "builtin-indicators")]
pub mod monthly_usercount;

/// Indicator registry.
/// Compile-time registration table and per-rate loading of indicators.
pub mod registry;

/// Site liveness flags.
#[cfg(feature = "builtin-indicators")]
pub mod statefull;

/// Submode descriptors and template expansion.
pub mod submode;

/// Core traits and interfaces.
/// The `Indicator` contract and the shared `IndicatorCore` state machine.
pub mod traits;

/// Common types and result definitions.
pub mod types;

/// Acquired values and their wire encoding.
pub mod value;

/// Active accounts per authentication method.
#[cfg(feature = "builtin-indicators")]
pub mod weekly_authcount;

/// Quiz attempts and durations of the last week.
#[cfg(feature = "builtin-indicators")]
pub mod weekly_quiz;
