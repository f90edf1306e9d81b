//! # Hospital Analytics CLI
//!
//! Command-line entry point: checks the database, runs ad hoc chunked
//! aggregations and writes the configured reports back to PostgreSQL.

use anyhow::Context;
use bigdecimal::{BigDecimal, Zero};
use clap::{Parser, Subcommand};
use hospital_analytics::aggregation::{
    Aggregate, ChunkedAggregator, GroupBy, GroupedAggregation, Sum,
};
use hospital_analytics::config::ConfigManager;
use hospital_analytics::database::DatabaseConnection;
use hospital_analytics::logging::init_structured_logging;
use hospital_analytics::reports::{ReportKind, ReportRunner};
use hospital_analytics::sink::{PgTableSink, ResultSink};
use hospital_analytics::source::{PgSourceFactory, SourceFactory, SourceQuery};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "hospital-analytics")]
#[command(about = "Chunked aggregation and reporting over hospital management data")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory (default: config)
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Environment whose overrides apply (default: ANALYTICS_ENV, APP_ENV, development)
    #[arg(short, long, global = true)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check connectivity and list the tables of the database
    Check,

    /// Sum a measure per group over the configured source
    Aggregate {
        /// Column to group by
        #[arg(short, long)]
        group_by: String,

        /// Numeric column to sum
        #[arg(short, long)]
        measure: String,

        /// Rows per fetch (default: aggregation.batch_size)
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Group by month of the group-by column instead of its value
        #[arg(long)]
        by_month: bool,

        /// Write the result to this table instead of printing it
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run reports and write their tables (default: reports.enabled)
    Report {
        /// Reports to run, in order
        kinds: Vec<ReportKind>,
    },

    /// Print the effective configuration with secrets masked
    Config,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let environment = cli
        .environment
        .clone()
        .unwrap_or_else(ConfigManager::detect_environment);
    let manager = ConfigManager::load_or_default(cli.config_dir.clone(), &environment)
        .context("failed to load configuration")?;
    let config = manager.config();
    init_structured_logging(&config.logging);

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
        }
        Commands::Check => {
            let db = DatabaseConnection::connect(&config.database)
                .await
                .context("failed to connect to the database")?;
            let healthy = db.health_check().await?;
            println!("Database reachable: {healthy}");
            for table in db.list_tables().await? {
                println!("  {table}");
            }
            db.close().await;
        }
        Commands::Aggregate {
            group_by,
            measure,
            batch_size,
            by_month,
            output,
        } => {
            let db = DatabaseConnection::connect(&config.database)
                .await
                .context("failed to connect to the database")?;
            let aggregator =
                ChunkedAggregator::new(batch_size.unwrap_or(config.aggregation.batch_size))?;
            let group_by = if by_month {
                GroupBy::Month(group_by)
            } else {
                GroupBy::Column(group_by)
            };
            let value_column = measure.clone();
            let key_column = group_by.column().to_string();
            let fold = GroupedAggregation::sum(group_by, measure)
                .with_null_keys(config.aggregation.null_keys);

            let factory = PgSourceFactory::new(db.pool().clone());
            let source = factory
                .open(&SourceQuery::from_config(&config.source))
                .await?;
            let outcome = aggregator.run(source, &fold).await?;
            info!(
                run_id = %outcome.run_id,
                batches = outcome.stats.batches,
                rows = outcome.stats.rows,
                "Aggregation finished"
            );

            let result = if by_month {
                outcome.result.with_missing_months(BigDecimal::zero())
            } else {
                outcome.result.ranked()
            };
            match output {
                Some(table_name) => {
                    let table = result.into_table(&key_column, &value_column, Sum::OUTPUT_TYPE);
                    let mut sink = PgTableSink::new(db.pool().clone())
                        .with_schema(config.reports.output_schema.clone());
                    sink.write_table(&table_name, &table).await?;
                    println!("Wrote {} rows to {table_name}", table.len());
                }
                None => {
                    for (key, total) in result.entries() {
                        println!("{key}\t{total}");
                    }
                }
            }
            db.close().await;
        }
        Commands::Report { kinds } => {
            let kinds = if kinds.is_empty() {
                config.reports.enabled.clone()
            } else {
                kinds
            };
            let db = DatabaseConnection::connect(&config.database)
                .await
                .context("failed to connect to the database")?;
            let sink = PgTableSink::new(db.pool().clone())
                .with_schema(config.reports.output_schema.clone());
            let mut runner =
                ReportRunner::new(PgSourceFactory::new(db.pool().clone()), sink, config)?;

            for summary in runner.run_all(&kinds).await? {
                println!(
                    "{:<24} -> {} ({} rows, {} ms)",
                    summary.kind.as_str(), summary.table, summary.rows, summary.duration_ms
                );
            }
            db.close().await;
        }
    }

    Ok(())
}
