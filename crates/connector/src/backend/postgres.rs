use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Connection as _, Row, TypeInfo, ValueRef};

use super::{decode_error, stream_error, Backend, BackendError, Connection};
use crate::cell::Cell;

/// PostgreSQL via `sqlx`. Rule queries go through the simple query protocol,
/// so every value arrives in its text form.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresBackend;

#[async_trait]
impl Backend for PostgresBackend {
    async fn open(&self, conn_str: &str) -> Result<Box<dyn Connection>, BackendError> {
        let conn = PgConnection::connect(conn_str)
            .await
            .map_err(|e| BackendError::Open(e.to_string()))?;
        Ok(Box::new(PostgresConnection { conn }))
    }
}

struct PostgresConnection {
    conn: PgConnection,
}

#[async_trait]
impl Connection for PostgresConnection {
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
        let PostgresConnection { conn } = *self;
        conn.close()
            .await
            .map_err(|e| BackendError::Close(e.to_string()))
    }
}

fn row_cells(row: &PgRow) -> Result<Vec<Cell>, BackendError> {
    (0..row.len())
        .map(|idx| cell(row, idx).map_err(decode_error))
        .collect()
}

fn cell(row: &PgRow, idx: usize) -> Result<Cell, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Cell::Null);
    }
    let type_name = raw.type_info().name().to_string();

    match type_name.as_str() {
        "BOOL" => Ok(Cell::Bool(row.try_get(idx)?)),
        "BYTEA" => Ok(Cell::Bytes(row.try_get(idx)?)),
        // Text form of any other type is its natural rendering.
        _ => match row.try_get_unchecked::<String, _>(idx) {
            Ok(text) => Ok(Cell::Text(text)),
            Err(_) => Ok(Cell::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?)),
        },
    }
}
