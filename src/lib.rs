#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Hospital Analytics
//!
//! Streaming group-by aggregation and reporting over a hospital management
//! table in PostgreSQL.
//!
//! ## Overview
//!
//! The visit table is read through a server-side cursor in fixed-size
//! batches. Each batch is aggregated on its own into a partial result, and
//! partial results are merged into a running accumulator, so memory stays
//! bounded by one batch plus the accumulator no matter how large the table
//! is. Finalized results are written back as replace-on-write tables.
//!
//! ## Module Organization
//!
//! - [`aggregation`] - Rows, mergeable aggregates and the chunked driver loop
//! - [`source`] - The fetch-N data source contract and its implementations
//! - [`sink`] - Result tables and the replace-on-write sink contract
//! - [`reports`] - The hospital analyses built on the chunked pipeline
//! - [`database`] - Pool construction, health check and identifier quoting
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - Structured logging setup and helpers
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hospital_analytics::aggregation::{ChunkedAggregator, GroupBy, GroupedAggregation};
//! use hospital_analytics::config::AnalyticsConfig;
//! use hospital_analytics::database::DatabaseConnection;
//! use hospital_analytics::source::{PgSourceFactory, SourceFactory, SourceQuery};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AnalyticsConfig::default();
//! let db = DatabaseConnection::connect(&config.database).await?;
//!
//! let factory = PgSourceFactory::new(db.pool().clone());
//! let source = factory.open(&SourceQuery::from_config(&config.source)).await?;
//!
//! let fold = GroupedAggregation::sum(GroupBy::Column("Department".into()), "AmountPaid");
//! let outcome = ChunkedAggregator::from_config(&config.aggregation)?
//!     .run(source, &fold)
//!     .await?;
//!
//! for (department, revenue) in outcome.result.ranked().entries() {
//!     println!("{department}: {revenue}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests; PostgreSQL tests are #[ignore]d
//! cargo test -- --ignored   # PostgreSQL tests, needs DATABASE_URL
//! ```

pub mod aggregation;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod reports;
pub mod sink;
pub mod source;
pub mod test_utils;

pub use aggregation::{
    AggregationOutcome, BatchFold, ChunkedAggregator, FieldValue, FinalResult, GroupBy,
    GroupedAggregation, NullKeyPolicy, Row, RunStats,
};
pub use config::{AnalyticsConfig, ConfigManager, ConfigurationError};
pub use database::DatabaseConnection;
pub use error::{AggregationError, AnalyticsError, Result, SinkError, SourceError};
pub use reports::{ReportKind, ReportRunner, ReportSummary};
pub use sink::{MemorySink, PgTableSink, ResultSink, ResultTable};
pub use source::{DataSource, MemorySource, PgSourceFactory, SourceFactory, SourceQuery};
