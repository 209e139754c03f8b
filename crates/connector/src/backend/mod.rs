//! Pluggable database backends.
//!
//! A [`Backend`] knows how to open a [`Connection`] for one database family.
//! The [`BackendRegistry`] maps backend identifiers (the `type` of a server)
//! to implementations and is the default [`Connector`] used by the executor.
//! Tests substitute their own connector or register fake backends.

mod mysql;
mod postgres;
mod sqlite;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::cell::Cell;

pub use self::mysql::MySqlBackend;
pub use self::postgres::PostgresBackend;
pub use self::sqlite::SqliteBackend;

/// Failures reported by a backend, tagged by the step that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("unsupported backend type: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Open(String),

    #[error("{0}")]
    Ping(String),

    #[error("{0}")]
    Query(String),

    #[error("{0}")]
    Columns(String),

    #[error("{0}")]
    Scan(String),

    #[error("{0}")]
    Close(String),
}

/// A live database handle. Released with [`Connection::close`]; dropping it
/// also releases the underlying socket or file.
#[async_trait]
pub trait Connection: Send {
    async fn ping(&mut self) -> Result<(), BackendError>;

    /// Execute `sql` verbatim and materialize every row.
    async fn query(&mut self, sql: &str) -> Result<Vec<Vec<Cell>>, BackendError>;

    async fn close(self: Box<Self>) -> Result<(), BackendError>;
}

/// One database family.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn open(&self, conn_str: &str) -> Result<Box<dyn Connection>, BackendError>;
}

/// Opens connections given a backend identifier and a connection string.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, backend: &str, conn_str: &str)
        -> Result<Box<dyn Connection>, BackendError>;
}

/// Backend identifier → implementation.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `sqlx` backends: `postgres` (alias `postgresql`),
    /// `mysql` (alias `mariadb`) and `sqlite`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let pg: Arc<dyn Backend> = Arc::new(PostgresBackend);
        let my: Arc<dyn Backend> = Arc::new(MySqlBackend);
        registry.register("postgres", Arc::clone(&pg));
        registry.register("postgresql", pg);
        registry.register("mysql", Arc::clone(&my));
        registry.register("mariadb", my);
        registry.register("sqlite", Arc::new(SqliteBackend));
        registry
    }

    /// Register (or replace) the backend for `id`. Identifiers are matched
    /// case-insensitively.
    pub fn register(&mut self, id: &str, backend: Arc<dyn Backend>) -> &mut Self {
        self.backends.insert(id.to_ascii_lowercase(), backend);
        self
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Backend>> {
        self.backends.get(&id.to_ascii_lowercase())
    }

    /// Registered identifiers, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl Connector for BackendRegistry {
    async fn open(
        &self,
        backend: &str,
        conn_str: &str,
    ) -> Result<Box<dyn Connection>, BackendError> {
        let Some(implementation) = self.get(backend) else {
            return Err(BackendError::Unsupported(backend.to_string()));
        };
        debug!(backend = %backend, "opening connection");
        implementation.open(conn_str).await
    }
}

/// Classify a driver error raised while reading one fetched row: a missing or
/// unknown column is a metadata failure, anything else a scan failure.
pub(crate) fn decode_error(err: sqlx::Error) -> BackendError {
    match err {
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. } => BackendError::Columns(err.to_string()),
        other => BackendError::Scan(other.to_string()),
    }
}

/// Classify a driver error raised while streaming rows: before the first row
/// arrives it is a statement failure, afterwards a row fetch failure.
pub(crate) fn stream_error(rows_so_far: usize, err: sqlx::Error) -> BackendError {
    if rows_so_far == 0 {
        BackendError::Query(err.to_string())
    } else {
        BackendError::Scan(err.to_string())
    }
}
