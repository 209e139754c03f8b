use std::time::Duration;

use serde::{Deserialize, Serialize};

/// An operator-authored SQL statement bound to a database family.
///
/// Rules are trusted: `query` is executed verbatim, without parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(default, alias = "Description")]
    pub description: String,
    /// Matched against [`Server::server_type`] to pick the target server.
    #[serde(alias = "DbType")]
    pub db_type: String,
    #[serde(alias = "Query")]
    pub query: String,
    /// Per-rule query deadline in seconds; `0` disables the deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Rule {
    /// Effective query deadline: the rule's own value wins over `default`.
    pub fn timeout(&self, default: Option<Duration>) -> Option<Duration> {
        match self.timeout_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => default,
        }
    }
}

/// A database endpoint. The connection string itself never lives in
/// configuration; `conn_string_var` names the environment variable holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    #[serde(alias = "Name")]
    pub name: String,
    /// Backend identifier (`postgres`, `mysql`, `sqlite`, ...).
    #[serde(rename = "type", alias = "Type")]
    pub server_type: String,
    #[serde(alias = "ConnStringVar")]
    pub conn_string_var: String,
}

/// Cron binding for a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Informational only; servers are resolved by the rule's `db_type`.
    #[serde(default, alias = "Server")]
    pub server: String,
    #[serde(alias = "Rule")]
    pub rule: String,
    /// Six-field (seconds first) cron expression. Five-field expressions are
    /// accepted and run at second zero.
    #[serde(alias = "CronStr", alias = "cron_str")]
    pub cron: String,
}
