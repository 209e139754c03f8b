//! Scheduling and running of SQL monitoring rules.
//!
//! This crate provides:
//! - Rule → server resolution by database type
//! - On-demand runs (`execute_rule_by_name`, `execute_all_rules`) that
//!   always leave one execution record behind
//! - Cron timers with an overlap guard, a per-rule query deadline and
//!   cooperative shutdown

pub mod error;
pub mod scheduler;

pub use error::{RunError, SchedulerError};
pub use scheduler::{RunTally, Scheduler};
