//! zabbix-indicators: scheduled LMS metrics pushed to a Zabbix server
//!
//! This crate computes monitoring indicators from a learning platform's
//! database on fixed schedule tiers (instant, hourly, daily, weekly,
//! monthly) and hands every value to the Zabbix sender. The host scheduler
//! owns the clock and calls one `ScheduledRun` per tier.
//!
//! ## Modules
//!
//! * `config`: Configuration structures, loading, validation, and defaults.
//!   Supports TOML configuration files with validation via the `validator` crate.
//!
//! * `core`: Core runtime components:
//!   - Indicator contract, submode expansion and the shared cycle state
//!   - Indicator registry and the built-in indicator set
//!   - User-defined measurement catalog
//!   - Metric emitter and the `zabbix_sender` sink
//!   - Scheduled run orchestration
//!
//! * `logger`: Centralized logging initialization using `tracing`.
//!   Supports console output in multiple formats (compact, pretty, JSON)
//!   and optional systemd journald integration.
//!
//! ## Features
//!
//! * `builtin-indicators`: Registers the stock indicator set (default: enabled).
//!   Custom measurement indicators are always registered.

pub mod config;
pub mod core;
pub mod logger;
