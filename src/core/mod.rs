/// Per-run state shared by indicators: clock, collaborators, entity caches.
pub mod context;

/// Metric dispatch to the monitoring server.
pub mod emitter;

/// Scheduled run orchestration for one rate.
pub mod executor;

/// Indicator contract, registry and the built-in indicator set.
pub mod indicators;

/// User-defined measurement catalog backing the custom indicators.
pub mod measurements;

/// Role archetype classification of users.
pub mod roles;

/// Data access capability consumed by indicators.
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
