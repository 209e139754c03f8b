//! Durable execution history.
//!
//! One [`ExecutionRecord`] is written per rule run into a single SQLite file
//! held under an exclusive lock by the owning process. Records are
//! append-only and can be listed by recency or by rule name.

pub mod error;
pub mod history;
pub mod record;

pub use error::StorageError;
pub use history::HistoryStore;
pub use record::{ExecutionRecord, RunStatus};
