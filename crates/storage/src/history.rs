//! [`HistoryStore`]: append-only run history in a single SQLite file.
//!
//! Layout:
//! - `execution_history(key, value)`: record JSON under its ordering key
//! - `execution_history_by_rule(rule_name, key)`: per-rule index
//! - `rule_metadata(name, value)`: reserved, created empty
//!
//! The file is opened in exclusive locking mode through a single pooled
//! connection, so one process owns it for the lifetime of the store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode, SqlitePool, SqlitePoolOptions,
};
use sqlx::Row;
use tracing::{debug, info};

use crate::error::{is_lock_error, StorageError};
use crate::record::ExecutionRecord;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS execution_history (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS execution_history_by_rule (
    rule_name TEXT NOT NULL,
    key       TEXT NOT NULL,
    PRIMARY KEY (rule_name, key)
);
CREATE TABLE IF NOT EXISTS rule_metadata (
    name  TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
"#;

pub struct HistoryStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl HistoryStore {
    /// Open (creating if needed) the history database at `path`.
    ///
    /// Waits up to `lock_timeout` for another holder to release the file;
    /// after that the open fails with [`StorageError::Locked`].
    pub async fn open(path: &Path, lock_timeout: Duration) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .locking_mode(SqliteLockingMode::Exclusive)
            .journal_mode(SqliteJournalMode::Delete)
            .busy_timeout(lock_timeout);

        let locked = |e: sqlx::Error| {
            if is_lock_error(&e) {
                StorageError::Locked {
                    path: path.to_path_buf(),
                }
            } else {
                StorageError::Database(e)
            }
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(lock_timeout + Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(locked)?;

        let store = Self {
            pool,
            path: path.to_path_buf(),
        };
        if let Err(e) = store.migrate().await {
            store.pool.close().await;
            return Err(match e {
                StorageError::Database(inner) => locked(inner),
                other => other,
            });
        }

        info!(path = %path.display(), "history store opened");
        Ok(store)
    }

    /// Create the schema and stamp the version. The version write always
    /// dirties the file, so the exclusive lock is held from here on even when
    /// every table already exists.
    async fn migrate(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::raw_sql(SCHEMA).execute(&mut *tx).await?;
        sqlx::raw_sql(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and its index entry in a single transaction.
    ///
    /// A record whose key already exists is rejected with
    /// [`StorageError::Duplicate`]; nothing is overwritten.
    pub async fn save_execution_record(&self, record: &ExecutionRecord) -> Result<(), StorageError> {
        let key = record.key();
        let value = serde_json::to_string(record).map_err(StorageError::Encode)?;

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO execution_history (key, value) VALUES (?, ?) ON CONFLICT(key) DO NOTHING",
        )
        .bind(&key)
        .bind(&value)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Err(StorageError::Duplicate(key));
        }

        sqlx::query("INSERT INTO execution_history_by_rule (rule_name, key) VALUES (?, ?)")
            .bind(&record.rule_name)
            .bind(&key)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(rule = %record.rule_name, key = %key, "execution record saved");
        Ok(())
    }

    /// Up to `limit` records, newest first.
    pub async fn get_latest_executions(
        &self,
        limit: usize,
    ) -> Result<Vec<ExecutionRecord>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query("SELECT key, value FROM execution_history ORDER BY key DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        rows.iter().map(decode_row).collect()
    }

    /// Every record of `rule_name`, oldest first.
    pub async fn get_executions_by_rule(
        &self,
        rule_name: &str,
    ) -> Result<Vec<ExecutionRecord>, StorageError> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            r#"SELECT h.key, h.value
               FROM execution_history_by_rule AS r
               JOIN execution_history AS h ON h.key = r.key
               WHERE r.rule_name = ?
               ORDER BY r.key ASC"#,
        )
        .bind(rule_name)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        rows.iter().map(decode_row).collect()
    }

    /// Release the file and its lock. Further calls on this store fail.
    pub async fn close(&self) {
        self.pool.close().await;
        info!(path = %self.path.display(), "history store closed");
    }
}

fn decode_row(row: &sqlx::sqlite::SqliteRow) -> Result<ExecutionRecord, StorageError> {
    let key: String = row.try_get("key")?;
    let value: String = row.try_get("value")?;
    serde_json::from_str(&value).map_err(|source| StorageError::Decode { key, source })
}
