//! Error types for rule runs and scheduler startup.

use dataspy_connector::ExecutionFailure;
use dataspy_core::ErrorKind;

/// Why a single rule run failed.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// No rule with this exact name.
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    /// No server whose type matches the rule's `db_type`.
    #[error("server not found for db type: {db_type}")]
    ServerNotFound { rule: String, db_type: String },

    /// The executor stopped at one of its stages.
    #[error(transparent)]
    Execution(#[from] ExecutionFailure),
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::RuleNotFound(_) | RunError::ServerNotFound { .. } => ErrorKind::NotFound,
            RunError::Execution(failure) => failure.kind(),
        }
    }
}

/// Errors raised by [`Scheduler::start`](crate::Scheduler::start).
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("error adding task for rule {rule}: invalid cron expression {cron:?}: {source}")]
    InvalidCron {
        rule: String,
        cron: String,
        #[source]
        source: cron::error::Error,
    },
}

impl SchedulerError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}
