//! Cron-driven rule scheduling.
//!
//! The [`Scheduler`] owns the loaded rules, servers and schedules. Each
//! schedule gets its own timer task; every firing runs the rule on a freshly
//! spawned task, so different schedules execute concurrently. The overlap
//! policy decides whether a firing may start while the same rule is still
//! running.

mod core;
pub(crate) mod cron;
mod runner;


pub use self::core::Scheduler;
pub use self::runner::RunTally;
