//! PostgreSQL sink with replace-table semantics.
//!
//! Each write runs in one transaction: `DROP TABLE IF EXISTS`, `CREATE TABLE`
//! from the result's column types, then multi-row `INSERT`s sized to stay
//! under the bind parameter limit.

use super::{ColumnType, ResultSink, ResultTable};
use crate::aggregation::FieldValue;
use crate::database::identifiers::{qualified_name, quote_identifier, validate_identifier};
use crate::error::SinkError;
use crate::logging::log_sink_operation;
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder};
use std::time::Instant;

/// Bind parameters PostgreSQL accepts in one statement
const MAX_BIND_PARAMETERS: usize = 65_535;

#[derive(Debug, Clone)]
pub struct PgTableSink {
    pool: PgPool,
    schema: Option<String>,
}

impl PgTableSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, schema: None }
    }

    /// Write tables into `schema` instead of the connection's search path
    pub fn with_schema(mut self, schema: Option<String>) -> Self {
        self.schema = schema;
        self
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    fn check_identifiers(&self, name: &str, table: &ResultTable) -> Result<(), SinkError> {
        let column_names = table.columns().iter().map(|c| c.name.as_str());
        for identifier in self
            .schema
            .as_deref()
            .into_iter()
            .chain(std::iter::once(name))
            .chain(column_names)
        {
            validate_identifier(identifier)
                .map_err(|reason| SinkError::invalid_identifier(identifier, reason))?;
        }
        Ok(())
    }
}

fn create_statement(target: &str, table: &ResultTable) -> String {
    let columns: Vec<String> = table
        .columns()
        .iter()
        .map(|c| format!("{} {}", quote_identifier(&c.name), c.column_type.sql_type()))
        .collect();
    format!("CREATE TABLE {target} ({})", columns.join(", "))
}

fn bind_value(
    builder: &mut Separated<'_, '_, Postgres, &'static str>,
    column_type: ColumnType,
    value: &FieldValue,
) {
    match column_type {
        ColumnType::Text => {
            builder.push_bind(match value {
                FieldValue::Null => None,
                FieldValue::Text(s) => Some(s.clone()),
                other => Some(other.to_string()),
            });
        }
        ColumnType::BigInt => {
            builder.push_bind(match value {
                FieldValue::Int(i) => Some(*i),
                _ => None,
            });
        }
        ColumnType::Double => {
            builder.push_bind(match value {
                FieldValue::Float(f) => Some(*f),
                FieldValue::Int(i) => Some(*i as f64),
                _ => None,
            });
        }
        ColumnType::Numeric => {
            builder.push_bind(value.to_decimal().ok().flatten());
        }
        ColumnType::Boolean => {
            builder.push_bind(match value {
                FieldValue::Bool(b) => Some(*b),
                _ => None,
            });
        }
        ColumnType::Date => {
            builder.push_bind(match value {
                FieldValue::Date(d) => Some(*d),
                _ => None,
            });
        }
        ColumnType::Timestamp => {
            builder.push_bind(match value {
                FieldValue::Timestamp(ts) => Some(*ts),
                FieldValue::Date(d) => d.and_hms_opt(0, 0, 0),
                _ => None,
            });
        }
    }
}

#[async_trait]
impl ResultSink for PgTableSink {
    async fn write_table(&mut self, name: &str, table: &ResultTable) -> Result<(), SinkError> {
        self.check_identifiers(name, table)?;
        table.validate(name)?;

        let started = Instant::now();
        let target = qualified_name(self.schema.as_deref(), name);
        let write_err = |e: sqlx::Error| SinkError::write(name, e);

        let mut tx = self.pool.begin().await.map_err(write_err)?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {target}"))
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        sqlx::query(&create_statement(&target, table))
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;

        if !table.columns().is_empty() {
            let column_list: Vec<String> = table
                .columns()
                .iter()
                .map(|c| quote_identifier(&c.name))
                .collect();
            let rows_per_insert = (MAX_BIND_PARAMETERS / table.columns().len()).max(1);

            for chunk in table.rows().chunks(rows_per_insert) {
                let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                    "INSERT INTO {target} ({}) ",
                    column_list.join(", ")
                ));
                builder.push_values(chunk, |mut values, row| {
                    for (column, value) in table.columns().iter().zip(row) {
                        bind_value(&mut values, column.column_type, value);
                    }
                });
                builder
                    .build()
                    .execute(&mut *tx)
                    .await
                    .map_err(write_err)?;
            }
        }

        tx.commit().await.map_err(write_err)?;

        log_sink_operation(
            name,
            table.len(),
            "replaced",
            Some(started.elapsed().as_millis() as u64),
        );
        Ok(())
    }
}
