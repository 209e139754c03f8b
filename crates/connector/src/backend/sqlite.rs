use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Connection as _, Row, TypeInfo, ValueRef};

use super::{decode_error, stream_error, Backend, BackendError, Connection};
use crate::cell::Cell;

/// SQLite via `sqlx`. The connection string is a `sqlite:` URL
/// (`sqlite://path/to/file.db`, `sqlite::memory:`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteBackend;

#[async_trait]
impl Backend for SqliteBackend {
    async fn open(&self, conn_str: &str) -> Result<Box<dyn Connection>, BackendError> {
        let conn = SqliteConnection::connect(conn_str)
            .await
            .map_err(|e| BackendError::Open(e.to_string()))?;
        Ok(Box::new(SqliteConn { conn }))
    }
}

struct SqliteConn {
    conn: SqliteConnection,
}

#[async_trait]
impl Connection for SqliteConn {
    async fn ping(&mut self) -> Result<(), BackendError> {
        self.conn
            .ping()
            .await
            .map_err(|e| BackendError::Ping(e.to_string()))
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Vec<Cell>>, BackendError> {
        let mut rows = Vec::new();
        let mut stream = sqlx::raw_sql(sql).fetch(&mut self.conn);
        loop {
            let next = stream
                .try_next()
                .await
                .map_err(|e| stream_error(rows.len(), e))?;
            let Some(row) = next else { break };
            rows.push(row_cells(&row)?);
        }
        Ok(rows)
    }

    async fn close(self: Box<Self>) -> Result<(), BackendError> {
        let SqliteConn { conn } = *self;
        conn.close()
            .await
            .map_err(|e| BackendError::Close(e.to_string()))
    }
}

fn row_cells(row: &SqliteRow) -> Result<Vec<Cell>, BackendError> {
    (0..row.len())
        .map(|idx| cell(row, idx).map_err(decode_error))
        .collect()
}

// SQLite values carry their storage class; declared column types are only
// affinity hints, so decoding goes by the class of each value.
fn cell(row: &SqliteRow, idx: usize) -> Result<Cell, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Cell::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();

    if type_name == "BLOB" {
        return Ok(Cell::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?));
    }
    Ok(Cell::Text(row.try_get_unchecked::<String, _>(idx)?))
}
