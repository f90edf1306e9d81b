//! # Data Sources
//!
//! The aggregation core depends only on a fetch-N contract: a source issues
//! one query when it is opened and hands out the next rows on demand, an
//! empty fetch meaning the stream is exhausted.
//!
//! - [`DataSource`] - an open, forward-only row stream
//! - [`SourceFactory`] - explicit construction of sources for a query
//! - [`MemorySource`] - rows held in memory
//! - [`PgCursorSource`] - a PostgreSQL server-side cursor

pub mod memory;
pub mod postgres;

pub use memory::{MemorySource, MemorySourceFactory};
pub use postgres::{PgCursorSource, PgSourceFactory};

use crate::aggregation::Row;
use crate::config::SourceConfig;
use crate::database::identifiers::{qualified_name, validate_identifier};
use crate::error::SourceError;
use async_trait::async_trait;

/// An open, forward-only row stream.
#[async_trait]
pub trait DataSource: Send {
    /// Next rows of the stream, at most `limit` of them. An empty result
    /// signals the end of the stream.
    async fn fetch(&mut self, limit: usize) -> Result<Vec<Row>, SourceError>;

    /// Release the underlying resources. Calling it twice is a no-op.
    async fn release(&mut self) -> Result<(), SourceError>;
}

#[async_trait]
impl<S: DataSource + ?Sized> DataSource for &mut S {
    async fn fetch(&mut self, limit: usize) -> Result<Vec<Row>, SourceError> {
        (**self).fetch(limit).await
    }

    async fn release(&mut self) -> Result<(), SourceError> {
        (**self).release().await
    }
}

#[async_trait]
impl<S: DataSource + ?Sized> DataSource for Box<S> {
    async fn fetch(&mut self, limit: usize) -> Result<Vec<Row>, SourceError> {
        (**self).fetch(limit).await
    }

    async fn release(&mut self) -> Result<(), SourceError> {
        (**self).release().await
    }
}

/// Opens a fresh source for a query.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    type Source: DataSource;

    async fn open(&self, query: &SourceQuery) -> Result<Self::Source, SourceError>;
}

/// Query a source is opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceQuery {
    /// Query text used as is
    Sql(String),
    /// Every column of a table, optionally limited
    Table {
        schema: Option<String>,
        table: String,
        limit: Option<u64>,
    },
}

impl SourceQuery {
    pub fn table(schema: Option<&str>, table: &str) -> Self {
        SourceQuery::Table {
            schema: schema.map(str::to_string),
            table: table.to_string(),
            limit: None,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        match &config.query {
            Some(sql) if !sql.trim().is_empty() => SourceQuery::Sql(sql.clone()),
            _ => SourceQuery::Table {
                schema: config.schema.clone(),
                table: config.table.clone(),
                limit: config.row_limit,
            },
        }
    }

    /// Row limit of a table query
    pub fn limit(&self) -> Option<u64> {
        match self {
            SourceQuery::Sql(_) => None,
            SourceQuery::Table { limit, .. } => *limit,
        }
    }

    /// SQL text of the query; table and schema names must be plain identifiers
    pub fn to_sql(&self) -> Result<String, SourceError> {
        match self {
            SourceQuery::Sql(sql) => Ok(sql.trim().trim_end_matches(';').to_string()),
            SourceQuery::Table {
                schema,
                table,
                limit,
            } => {
                for name in schema.iter().chain(std::iter::once(table)) {
                    validate_identifier(name)
                        .map_err(|reason| SourceError::query(format!("'{name}': {reason}")))?;
                }
                let mut sql = format!(
                    "SELECT * FROM {}",
                    qualified_name(schema.as_deref(), table)
                );
                if let Some(limit) = limit {
                    sql.push_str(&format!(" LIMIT {limit}"));
                }
                Ok(sql)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_query_sql() {
        let query = SourceQuery::table(Some("dbo"), "Hospital_Management");
        assert_eq!(
            query.to_sql().unwrap(),
            "SELECT * FROM \"dbo\".\"Hospital_Management\""
        );

        let limited = SourceQuery::Table {
            schema: None,
            table: "Hospital_Management".into(),
            limit: Some(10000),
        };
        assert_eq!(
            limited.to_sql().unwrap(),
            "SELECT * FROM \"Hospital_Management\" LIMIT 10000"
        );
        assert_eq!(limited.limit(), Some(10000));
    }

    #[test]
    fn test_raw_query_is_trimmed() {
        let query = SourceQuery::Sql("SELECT 1;  ".into());
        assert_eq!(query.to_sql().unwrap(), "SELECT 1");
    }

    #[test]
    fn test_invalid_table_name_is_rejected() {
        let query = SourceQuery::table(None, "x; DROP TABLE y");
        assert!(matches!(query.to_sql(), Err(SourceError::Query { .. })));
    }

    #[test]
    fn test_query_from_config_prefers_explicit_sql() {
        let mut config = SourceConfig::default();
        assert!(matches!(
            SourceQuery::from_config(&config),
            SourceQuery::Table { .. }
        ));

        config.query = Some("SELECT * FROM visits".into());
        assert_eq!(
            SourceQuery::from_config(&config),
            SourceQuery::Sql("SELECT * FROM visits".into())
        );
    }
}
