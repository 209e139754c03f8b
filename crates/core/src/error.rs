use std::path::PathBuf;

use thiserror::Error;

/// Coarse failure category shared by every crate.
///
/// Run records and the CLI only need to know which class of problem ended a
/// run; the concrete error types carry the detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing/invalid connection string, malformed cron expression, bad config file.
    Configuration,
    /// A rule or server name has no match.
    NotFound,
    /// Connection open or ping failure.
    Connectivity,
    /// Statement execution, column introspection or row scan failure.
    Query,
    /// The query exceeded its deadline.
    Timeout,
    /// The run was cancelled (daemon shutdown).
    Cancelled,
    /// History store read/write failure.
    Storage,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Connectivity => write!(f, "connectivity"),
            ErrorKind::Query => write!(f, "query"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Storage => write!(f, "storage"),
        }
    }
}

/// Errors raised while loading configuration or the process environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("error loading environment variables from {}: {source}", path.display())]
    Env {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}
