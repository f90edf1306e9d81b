//! PostgreSQL source backed by a server-side cursor.
//!
//! Opening the source begins a transaction on a pooled connection and
//! declares a `NO SCROLL` cursor for the query; every fetch is a
//! `FETCH FORWARD n`. The connection is held until [`DataSource::release`]
//! is called or the source is dropped, both of which roll the transaction
//! back and return the connection to the pool.

use super::{DataSource, SourceFactory, SourceQuery};
use crate::aggregation::{Columns, FieldValue, Row};
use crate::error::SourceError;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Postgres, Row as _, Transaction, TypeInfo, ValueRef};
use tracing::debug;
use uuid::Uuid;

/// Forward-only cursor over a query result
pub struct PgCursorSource {
    tx: Option<Transaction<'static, Postgres>>,
    cursor: String,
    columns: Option<Columns>,
}

impl PgCursorSource {
    /// Acquire a connection and declare the cursor
    pub async fn open(pool: &PgPool, query: &SourceQuery) -> Result<Self, SourceError> {
        let sql = query.to_sql()?;
        let mut tx = pool.begin().await.map_err(SourceError::connection)?;

        let cursor = format!("analytics_cursor_{}", Uuid::new_v4().simple());
        let declare = format!("DECLARE {cursor} NO SCROLL CURSOR FOR {sql}");
        sqlx::query(&declare)
            .execute(&mut *tx)
            .await
            .map_err(SourceError::query)?;

        debug!(cursor = %cursor, query = %sql, "Declared source cursor");

        Ok(Self {
            tx: Some(tx),
            cursor,
            columns: None,
        })
    }

    pub fn cursor_name(&self) -> &str {
        &self.cursor
    }

    /// Column names, known once the first non-empty fetch completed
    pub fn columns(&self) -> Option<&Columns> {
        self.columns.as_ref()
    }
}

#[async_trait]
impl DataSource for PgCursorSource {
    async fn fetch(&mut self, limit: usize) -> Result<Vec<Row>, SourceError> {
        let tx = self.tx.as_mut().ok_or(SourceError::Released)?;
        let statement = format!("FETCH FORWARD {limit} FROM {}", self.cursor);
        let rows = sqlx::query(&statement)
            .fetch_all(&mut **tx)
            .await
            .map_err(SourceError::fetch)?;

        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let columns = match &self.columns {
            Some(columns) => columns.clone(),
            None => {
                let columns: Columns = first
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect();
                self.columns = Some(columns.clone());
                columns
            }
        };

        rows.iter()
            .map(|row| decode_row(row, &columns))
            .collect()
    }

    async fn release(&mut self) -> Result<(), SourceError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.map_err(SourceError::release)?;
            debug!(cursor = %self.cursor, "Released source cursor");
        }
        Ok(())
    }
}

fn decode_row(row: &PgRow, columns: &Columns) -> Result<Row, SourceError> {
    let values = row
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| decode_value(row, index, column.name(), column.type_info().name()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Row::new(columns.clone(), values))
}

fn decode_value(
    row: &PgRow,
    index: usize,
    name: &str,
    type_name: &str,
) -> Result<FieldValue, SourceError> {
    let decode_err = |e: sqlx::Error| SourceError::decode(name, e);

    let raw = row.try_get_raw(index).map_err(decode_err)?;
    if raw.is_null() {
        return Ok(FieldValue::Null);
    }

    let value = match type_name {
        "BOOL" => FieldValue::Bool(row.try_get::<bool, _>(index).map_err(decode_err)?),
        "INT2" => FieldValue::Int(row.try_get::<i16, _>(index).map_err(decode_err)?.into()),
        "INT4" => FieldValue::Int(row.try_get::<i32, _>(index).map_err(decode_err)?.into()),
        "INT8" => FieldValue::Int(row.try_get::<i64, _>(index).map_err(decode_err)?),
        "FLOAT4" => FieldValue::Float(row.try_get::<f32, _>(index).map_err(decode_err)?.into()),
        "FLOAT8" => FieldValue::Float(row.try_get::<f64, _>(index).map_err(decode_err)?),
        "NUMERIC" => {
            FieldValue::Decimal(row.try_get::<BigDecimal, _>(index).map_err(decode_err)?)
        }
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => {
            FieldValue::Text(row.try_get::<String, _>(index).map_err(decode_err)?)
        }
        "UUID" => FieldValue::Text(row.try_get::<Uuid, _>(index).map_err(decode_err)?.to_string()),
        "DATE" => FieldValue::Date(row.try_get::<NaiveDate, _>(index).map_err(decode_err)?),
        "TIMESTAMP" => {
            FieldValue::Timestamp(row.try_get::<NaiveDateTime, _>(index).map_err(decode_err)?)
        }
        "TIMESTAMPTZ" => FieldValue::Timestamp(
            row.try_get::<DateTime<Utc>, _>(index)
                .map_err(decode_err)?
                .naive_utc(),
        ),
        other => return Err(SourceError::unsupported_column(name, other)),
    };
    Ok(value)
}

/// Opens [`PgCursorSource`]s on a shared pool
#[derive(Debug, Clone)]
pub struct PgSourceFactory {
    pool: PgPool,
}

impl PgSourceFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SourceFactory for PgSourceFactory {
    type Source = PgCursorSource;

    async fn open(&self, query: &SourceQuery) -> Result<PgCursorSource, SourceError> {
        PgCursorSource::open(&self.pool, query).await
    }
}
