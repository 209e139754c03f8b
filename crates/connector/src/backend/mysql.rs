use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Connection as _, Row, TypeInfo, ValueRef};

use super::{decode_error, stream_error, Backend, BackendError, Connection};
use crate::cell::Cell;

/// MySQL / MariaDB via `sqlx`. Rule queries use the text protocol, so values
/// arrive as their textual form; binary column types come back as bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlBackend;

#[async_trait]
impl Backend for MySqlBackend {
    async fn open(&self, conn_str: &str) -> Result<Box<dyn Connection>, BackendError> {
        let conn = MySqlConnection::connect(conn_str)
            .await
            .map_err(|e| BackendError::Open(e.to_string()))?;
        Ok(Box::new(MySqlConn { conn }))
    }
}

struct MySqlConn {
    conn: MySqlConnection,
}

#[async_trait]
impl Connection for MySqlConn {
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
        let MySqlConn { conn } = *self;
        conn.close()
            .await
            .map_err(|e| BackendError::Close(e.to_string()))
    }
}

fn row_cells(row: &MySqlRow) -> Result<Vec<Cell>, BackendError> {
    (0..row.len())
        .map(|idx| cell(row, idx).map_err(decode_error))
        .collect()
}

fn cell(row: &MySqlRow, idx: usize) -> Result<Cell, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Cell::Null);
    }
    let binary = is_binary_type(raw.type_info().name());

    if binary {
        return Ok(Cell::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?));
    }
    match row.try_get_unchecked::<String, _>(idx) {
        Ok(text) => Ok(Cell::Text(text)),
        Err(_) => Ok(Cell::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?)),
    }
}

fn is_binary_type(name: &str) -> bool {
    matches!(
        name,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
    )
}
