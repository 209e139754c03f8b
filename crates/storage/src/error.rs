use std::path::PathBuf;

use dataspy_core::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to create storage directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("history database {} is locked by another process", path.display())]
    Locked { path: PathBuf },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to encode execution record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode execution record {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("execution record {0} already exists")]
    Duplicate(String),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Storage
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED, including their extended codes.
pub(crate) fn is_lock_error(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = err else {
        return false;
    };
    let primary = db
        .code()
        .and_then(|c| c.parse::<i32>().ok())
        .map(|c| c & 0xff);
    matches!(primary, Some(5) | Some(6)) || db.message().contains("database is locked")
}
