//! # Structured Logging Module
//!
//! Environment-aware structured logging for aggregation runs, sink writes
//! and reports.

use crate::config::{LogFormat, LoggingConfig};
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging.
///
/// `RUST_LOG` wins over the configured level, which wins over the
/// environment default. Safe to call more than once.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                config
                    .level
                    .clone()
                    .unwrap_or_else(|| get_log_level(&environment).to_string()),
            )
        });

        let registry = tracing_subscriber::registry().with(filter);
        let result = match config.format {
            LogFormat::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_current_span(false),
                )
                .try_init(),
            LogFormat::Pretty => registry
                .with(fmt::layer().with_target(true).with_level(true))
                .try_init(),
        };

        // A global subscriber may already be installed, e.g. by a test harness
        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            environment = %environment,
            format = ?config.format,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("ANALYTICS_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log progress of one processed batch
pub fn log_batch_operation(run_id: Uuid, batch_index: usize, batch_rows: usize, total_rows: u64) {
    tracing::debug!(
        run_id = %run_id,
        batch = batch_index,
        batch_rows = batch_rows,
        total_rows = total_rows,
        "Processed batch"
    );
}

/// Log a result table write
pub fn log_sink_operation(table: &str, rows: usize, status: &str, duration_ms: Option<u64>) {
    tracing::info!(
        table = %table,
        rows = rows,
        status = %status,
        duration_ms = duration_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "SINK_OPERATION"
    );
}

/// Log a report run
pub fn log_report_operation(
    report: &str,
    table: Option<&str>,
    rows: Option<usize>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        report = %report,
        table = table,
        rows = rows,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "REPORT_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
