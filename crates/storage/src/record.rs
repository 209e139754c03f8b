use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => f.write_str("success"),
            RunStatus::Error => f.write_str("error"),
        }
    }
}

/// Audit entry for one rule run. Exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub rule_name: String,
    /// Empty when the run failed before a server was resolved.
    pub server_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub description: String,
    pub duration_ms: u64,
    pub rows_affected: i64,
}

impl ExecutionRecord {
    /// A successful run. `result` is the rendered row summary.
    pub fn success(
        rule_name: impl Into<String>,
        server_name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        result: impl Into<String>,
        rows_affected: i64,
    ) -> Self {
        Self {
            rule_name: rule_name.into(),
            server_name: server_name.into(),
            start_time,
            end_time,
            status: RunStatus::Success,
            result: result.into(),
            error: String::new(),
            description: String::new(),
            duration_ms: duration_ms(start_time, end_time),
            rows_affected,
        }
    }

    /// A failed run.
    pub fn failure(
        rule_name: impl Into<String>,
        server_name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            rule_name: rule_name.into(),
            server_name: server_name.into(),
            start_time,
            end_time,
            status: RunStatus::Error,
            result: String::new(),
            error: error.into(),
            description: String::new(),
            duration_ms: duration_ms(start_time, end_time),
            rows_affected: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Storage key: zero-padded start nanoseconds, rule, server. Keys sort
    /// chronologically as plain strings.
    pub fn key(&self) -> String {
        let nanos = self
            .start_time
            .timestamp_nanos_opt()
            .unwrap_or_default()
            .max(0);
        format!("{:020}-{}-{}", nanos, self.rule_name, self.server_name)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

fn duration_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    u64::try_from((end - start).num_milliseconds()).unwrap_or(0)
}
