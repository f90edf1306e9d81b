//! # Analytics Configuration System
//!
//! YAML-based configuration with environment-specific overrides and explicit
//! validation. Every section has defaults, so a configuration file only needs
//! to name what differs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hospital_analytics::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration (environment auto-detected)
//! let manager = ConfigManager::load()?;
//!
//! let database_url = manager.config().database.database_url();
//! let batch_size = manager.config().aggregation.batch_size;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::aggregation::{NullKeyPolicy, DEFAULT_BATCH_SIZE};
use crate::reports::ReportKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring analytics-config.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Database connection and pooling
    pub database: DatabaseConfig,

    /// Table or query the analyses read from
    pub source: SourceConfig,

    /// Chunked aggregation settings
    pub aggregation: AggregationConfig,

    /// Names of the source columns the reports use
    pub columns: ColumnMapping,

    /// Report selection and output tables
    pub reports: ReportsConfig,

    /// Log level and format
    pub logging: LoggingConfig,
}

/// Database connection and pooling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the individual fields
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Maximum pooled connections
    pub pool: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            username: "hospital".to_string(),
            password: "hospital".to_string(),
            database: "hospital_analytics_development".to_string(),
            pool: 5,
            acquire_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    /// Build complete database URL from configuration
    pub fn database_url(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return url.to_string();
        }

        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

/// Where analysis rows come from
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub schema: Option<String>,
    pub table: String,
    /// Explicit query text; replaces the table scan when set
    pub query: Option<String>,
    /// Read at most this many rows of the table
    pub row_limit: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            schema: None,
            table: "Hospital_Management".to_string(),
            query: None,
            row_limit: None,
        }
    }
}

/// Chunked aggregation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Rows per fetch
    pub batch_size: usize,
    /// Treatment of rows whose grouping key is null
    pub null_keys: NullKeyPolicy,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            null_keys: NullKeyPolicy::default(),
        }
    }
}

/// Source column names used by the reports
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub patient_id: String,
    pub doctor_id: String,
    pub doctor_name: String,
    pub department: String,
    pub admission_date: String,
    pub amount_paid: String,
    pub total_bill_amount: String,
    pub feedback_rating: String,
    pub payment_mode: String,
    pub age: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            patient_id: "PatientID".to_string(),
            doctor_id: "DoctorID".to_string(),
            doctor_name: "DoctorName".to_string(),
            department: "Department".to_string(),
            admission_date: "AdmissionDate".to_string(),
            amount_paid: "AmountPaid".to_string(),
            total_bill_amount: "TotalBillAmount".to_string(),
            feedback_rating: "FeedbackRating".to_string(),
            payment_mode: "PaymentMode".to_string(),
            age: "Age".to_string(),
        }
    }
}

impl ColumnMapping {
    fn entries(&self) -> [(&'static str, &str); 10] {
        [
            ("columns.patient_id", &self.patient_id),
            ("columns.doctor_id", &self.doctor_id),
            ("columns.doctor_name", &self.doctor_name),
            ("columns.department", &self.department),
            ("columns.admission_date", &self.admission_date),
            ("columns.amount_paid", &self.amount_paid),
            ("columns.total_bill_amount", &self.total_bill_amount),
            ("columns.feedback_rating", &self.feedback_rating),
            ("columns.payment_mode", &self.payment_mode),
            ("columns.age", &self.age),
        ]
    }
}

/// Report selection and output
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Schema result tables are written to
    pub output_schema: Option<String>,
    /// Reports run by `report` without arguments, in order
    pub enabled: Vec<ReportKind>,
    pub top_doctors_limit: usize,
    /// `k` in `Q3 + k * IQR`
    pub anomaly_iqr_multiplier: f64,
    /// Output table name overrides
    pub table_names: HashMap<ReportKind, String>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            output_schema: None,
            enabled: ReportKind::all().to_vec(),
            top_doctors_limit: 5,
            anomaly_iqr_multiplier: 1.5,
            table_names: HashMap::new(),
        }
    }
}

impl ReportsConfig {
    /// Output table of a report
    pub fn table_name(&self, kind: ReportKind) -> String {
        self.table_names
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| kind.default_table_name().to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` takes precedence
    pub level: Option<String>,
    pub format: LogFormat,
}

impl AnalyticsConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let has_url = self
            .database
            .url
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        if !has_url && self.database.host.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "database.host",
                "database configuration without url",
            ));
        }

        if self.database.pool == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.pool",
                "0",
                "pool size must be greater than 0",
            ));
        }

        if self.aggregation.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "aggregation.batch_size",
                "0",
                "batch size must be greater than 0",
            ));
        }

        let has_query = self
            .source
            .query
            .as_deref()
            .is_some_and(|q| !q.trim().is_empty());
        if !has_query && self.source.table.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "source.table",
                "source configuration without query",
            ));
        }

        for (field, value) in self.columns.entries() {
            if value.is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    field,
                    "column mapping",
                ));
            }
        }

        if self.reports.top_doctors_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "reports.top_doctors_limit",
                "0",
                "limit must be greater than 0",
            ));
        }

        let multiplier = self.reports.anomaly_iqr_multiplier;
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(ConfigurationError::invalid_value(
                "reports.anomaly_iqr_multiplier",
                multiplier.to_string(),
                "multiplier must be a positive number",
            ));
        }

        Ok(())
    }
}
