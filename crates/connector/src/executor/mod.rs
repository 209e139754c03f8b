//! [`QueryExecutor`] runs one rule against one server.
//!
//! Every step is reported as a [`LogEvent`]. The events travel with the
//! result (or the failure) so the caller decides where they go.


use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dataspy_core::{ErrorKind, Rule, Server};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{BackendError, BackendRegistry, Connection, Connector};
use crate::event::{EventLevel, LogEvent};
use crate::render::render_rows;
use crate::resolver::{resolve_connection_string, ResolveError};

// ── Options / results ─────────────────────────────────────────

/// Per-run knobs.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Deadline for the query step (statement plus row fetch). `None` waits
    /// indefinitely.
    pub timeout: Option<Duration>,
    /// Cancelling aborts an in-progress query step.
    pub cancel: CancellationToken,
}

impl ExecuteOptions {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Output of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub row_count: i64,
    pub results: String,
    pub events: Vec<LogEvent>,
}

// ── Errors ────────────────────────────────────────────────────

/// The stage at which a run stopped.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("failed to get connection string for server {server}: {source}")]
    ConnectionString {
        server: String,
        #[source]
        source: ResolveError,
    },

    #[error("failed to open db connection: {0}")]
    Open(#[source] BackendError),

    #[error("failed to ping database: {0}")]
    Ping(#[source] BackendError),

    #[error("failed to execute query: {0}")]
    Query(#[source] BackendError),

    #[error("failed to get columns: {0}")]
    Columns(#[source] BackendError),

    #[error("failed to scan row: {0}")]
    Scan(#[source] BackendError),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("query cancelled")]
    Cancelled,
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::ConnectionString { .. } => ErrorKind::Configuration,
            ExecutorError::Open(BackendError::Unsupported(_)) => ErrorKind::Configuration,
            ExecutorError::Open(_) | ExecutorError::Ping(_) => ErrorKind::Connectivity,
            ExecutorError::Query(_) | ExecutorError::Columns(_) | ExecutorError::Scan(_) => {
                ErrorKind::Query
            }
            ExecutorError::Timeout(_) => ErrorKind::Timeout,
            ExecutorError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Event message reported for this failure.
    fn event_message(&self) -> &'static str {
        match self {
            ExecutorError::ConnectionString { .. } => "Failed to get connection string",
            ExecutorError::Open(_) => "Failed to open DB connection",
            ExecutorError::Ping(_) => "Failed to ping database",
            ExecutorError::Query(_) => "Failed to execute query",
            ExecutorError::Columns(_) => "Failed to get columns",
            ExecutorError::Scan(_) => "Failed to scan row",
            ExecutorError::Timeout(_) => "Query timed out",
            ExecutorError::Cancelled => "Query cancelled",
        }
    }

    /// Classify an error returned by [`Connection::query`].
    fn from_query(err: BackendError) -> Self {
        match err {
            BackendError::Columns(_) => ExecutorError::Columns(err),
            BackendError::Scan(_) => ExecutorError::Scan(err),
            other => ExecutorError::Query(other),
        }
    }
}

/// A failed run: the error plus every event emitted before it stopped.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    #[source]
    pub error: ExecutorError,
    pub events: Vec<LogEvent>,
}

impl ExecutionFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

// ── Executor ──────────────────────────────────────────────────

/// Runs rule queries through a [`Connector`].
#[derive(Clone)]
pub struct QueryExecutor {
    connector: Arc<dyn Connector>,
}

impl QueryExecutor {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Executor backed by [`BackendRegistry::with_defaults`].
    pub fn with_default_backends() -> Self {
        Self::new(Arc::new(BackendRegistry::with_defaults()))
    }

    /// Run `rule` on `server`.
    ///
    /// The connection string is resolved fresh for every call. After a
    /// successful open the connection is closed on every exit path.
    pub async fn execute(
        &self,
        server: &Server,
        rule: &Rule,
        options: &ExecuteOptions,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        let mut events = vec![LogEvent::new(
            EventLevel::Task,
            format!("Executing on {}", server.name),
        )
        .with_field("rule", rule.name.as_str())
        .with_field("server", server.name.as_str())];

        let conn_str = match resolve_connection_string(server) {
            Ok(s) => s,
            Err(source) => {
                let error = ExecutorError::ConnectionString {
                    server: server.name.clone(),
                    source,
                };
                return Err(fail(events, server, error));
            }
        };

        debug!(
            rule = %rule.name,
            server = %server.name,
            backend = %server.server_type,
            "opening connection"
        );
        let mut conn = match self.connector.open(&server.server_type, &conn_str).await {
            Ok(conn) => conn,
            Err(e) => return Err(fail(events, server, ExecutorError::Open(e))),
        };

        let outcome = run_on(conn.as_mut(), server, rule, options, &mut events).await;

        if let Err(e) = conn.close().await {
            warn!(server = %server.name, error = %e, "failed to close db connection");
            events.push(
                LogEvent::new(EventLevel::Warn, "Failed to close DB connection")
                    .with_field("server", server.name.as_str())
                    .with_error(&e),
            );
        }

        match outcome {
            Ok((row_count, results)) => {
                events.push(
                    LogEvent::new(EventLevel::Success, "Query executed successfully")
                        .with_field("rule", rule.name.as_str())
                        .with_field("server", server.name.as_str())
                        .with_field("rows", row_count),
                );
                Ok(ExecutionResult {
                    row_count,
                    results,
                    events,
                })
            }
            Err(error) => Err(fail(events, server, error)),
        }
    }
}

/// Ping, then run the query under the deadline and cancellation token.
async fn run_on(
    conn: &mut dyn Connection,
    server: &Server,
    rule: &Rule,
    options: &ExecuteOptions,
    events: &mut Vec<LogEvent>,
) -> Result<(i64, String), ExecutorError> {
    conn.ping().await.map_err(ExecutorError::Ping)?;

    events.push(
        LogEvent::new(EventLevel::Db, "Connection established successfully")
            .with_field("server", server.name.as_str()),
    );
    events.push(
        LogEvent::new(EventLevel::Rule, "Executing query").with_field("rule", rule.name.as_str()),
    );

    let rows = tokio::select! {
        biased;
        _ = options.cancel.cancelled() => return Err(ExecutorError::Cancelled),
        res = with_deadline(options.timeout, conn.query(&rule.query)) => res?,
    };

    let row_count = i64::try_from(rows.len()).unwrap_or(i64::MAX);
    Ok((row_count, render_rows(&rows)))
}

async fn with_deadline<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = Result<T, BackendError>>,
) -> Result<T, ExecutorError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ExecutorError::Timeout(limit))?
            .map_err(ExecutorError::from_query),
        None => fut.await.map_err(ExecutorError::from_query),
    }
}

fn fail(mut events: Vec<LogEvent>, server: &Server, error: ExecutorError) -> ExecutionFailure {
    events.push(
        LogEvent::new(EventLevel::Error, error.event_message())
            .with_field("server", server.name.as_str())
            .with_error(&error),
    );
    ExecutionFailure { error, events }
}
