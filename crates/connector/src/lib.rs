//! Query execution against operator-configured database servers.
//!
//! This crate provides:
//! - Connection-string resolution from the process environment
//! - A backend registry (postgres, mysql, sqlite via `sqlx`) behind the
//!   [`Connector`] strategy, so tests can substitute their own backends
//! - The [`QueryExecutor`], which runs one rule and reports every step as a
//!   structured [`LogEvent`]
//! - [`EventSink`] implementations for relaying those events

pub mod backend;
pub mod cell;
pub mod event;
pub mod executor;
pub mod render;
pub mod resolver;

pub use backend::{Backend, BackendError, BackendRegistry, Connection, Connector};
pub use cell::Cell;
pub use event::{CollectingSink, EventLevel, EventSink, LogEvent, NullSink, TracingSink};
pub use executor::{
    ExecuteOptions, ExecutionFailure, ExecutionResult, ExecutorError, QueryExecutor,
};
pub use resolver::{resolve_connection_string, ResolveError};
