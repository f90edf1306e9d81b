//! # Report Runner
//!
//! Runs reports one after the other: open a source for the configured query,
//! fold it through the chunked aggregator, finalize, then write the result
//! table to the sink. A table is written only after its report finalized, so
//! a failed report never leaves a partial table behind.

use super::anomalies::{OutlierBounds, ThresholdFilter, ValueDistribution};
use super::kpi::KpiSummary;
use super::visits::visit_types_table;
use super::ReportKind;
use crate::aggregation::{
    Aggregate, BatchFold, ChunkedAggregator, Count, FieldValue, FinalResult, GroupBy,
    GroupedAggregation, Mean, NullKeyPolicy, Sum,
};
use crate::config::{AnalyticsConfig, ColumnMapping, ConfigurationError, ReportsConfig};
use crate::error::AnalyticsError;
use crate::logging::{log_error, log_report_operation};
use crate::sink::{ResultSink, ResultTable};
use crate::source::{SourceFactory, SourceQuery};
use bigdecimal::{BigDecimal, Zero};
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of one written report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub kind: ReportKind,
    pub table: String,
    pub rows: usize,
    pub duration_ms: u64,
}

/// Computes reports over a source and writes them to a sink
pub struct ReportRunner<F, K> {
    factory: F,
    sink: K,
    query: SourceQuery,
    aggregator: ChunkedAggregator,
    null_keys: NullKeyPolicy,
    columns: ColumnMapping,
    reports: ReportsConfig,
}

impl<F, K> ReportRunner<F, K>
where
    F: SourceFactory,
    K: ResultSink,
{
    pub fn new(factory: F, sink: K, config: &AnalyticsConfig) -> Result<Self, AnalyticsError> {
        config.validate()?;
        Ok(Self {
            factory,
            sink,
            query: SourceQuery::from_config(&config.source),
            aggregator: ChunkedAggregator::from_config(&config.aggregation)?,
            null_keys: config.aggregation.null_keys,
            columns: config.columns.clone(),
            reports: config.reports.clone(),
        })
    }

    /// Read from `query` instead of the configured source
    pub fn with_query(mut self, query: SourceQuery) -> Self {
        self.query = query;
        self
    }

    pub fn query(&self) -> &SourceQuery {
        &self.query
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Table name a report writes to
    pub fn table_name(&self, kind: ReportKind) -> String {
        self.reports.table_name(kind)
    }

    /// Run the reports in order, stopping at the first failure.
    ///
    /// Tables written by reports that completed before the failure are kept.
    pub async fn run_all(
        &mut self,
        kinds: &[ReportKind],
    ) -> Result<Vec<ReportSummary>, AnalyticsError> {
        let mut summaries = Vec::with_capacity(kinds.len());
        for kind in kinds {
            summaries.push(self.run_report(*kind).await?);
        }
        info!(reports = summaries.len(), "All reports completed");
        Ok(summaries)
    }

    /// Compute one report and replace its output table
    pub async fn run_report(&mut self, kind: ReportKind) -> Result<ReportSummary, AnalyticsError> {
        let table_name = self.table_name(kind);
        let started = Instant::now();
        log_report_operation(kind.as_str(), Some(&table_name), None, "started", None);

        let written = match self.compute(kind).await {
            Ok(table) => self
                .sink
                .write_table(&table_name, &table)
                .await
                .map(|()| table.len())
                .map_err(AnalyticsError::from),
            Err(error) => Err(error),
        };

        match written {
            Ok(rows) => {
                log_report_operation(
                    kind.as_str(),
                    Some(&table_name),
                    Some(rows),
                    "completed",
                    None,
                );
                Ok(ReportSummary {
                    kind,
                    table: table_name,
                    rows,
                    duration_ms: started.elapsed().as_millis() as u64,
                })
            }
            Err(error) => {
                let message = error.to_string();
                log_report_operation(
                    kind.as_str(),
                    Some(&table_name),
                    None,
                    "failed",
                    Some(&message),
                );
                log_error("report_runner", kind.as_str(), &message, None);
                Err(error)
            }
        }
    }

    /// Compute a report's result table without writing it
    pub async fn compute(&self, kind: ReportKind) -> Result<ResultTable, AnalyticsError> {
        let columns = &self.columns;
        let table = match kind {
            ReportKind::KpiSummary => self.single_pass(&KpiSummary::new(columns)).await?.into_table(),
            ReportKind::DepartmentRevenue => self
                .revenue_by(&columns.department)
                .await?
                .into_table(&columns.department, &columns.amount_paid, Sum::OUTPUT_TYPE),
            ReportKind::DoctorRevenue => self
                .revenue_by(&columns.doctor_name)
                .await?
                .into_table(&columns.doctor_name, &columns.amount_paid, Sum::OUTPUT_TYPE),
            ReportKind::TopDoctors => self
                .revenue_by(&columns.doctor_name)
                .await?
                .top(self.reports.top_doctors_limit)
                .into_table(&columns.doctor_name, &columns.amount_paid, Sum::OUTPUT_TYPE),
            ReportKind::DepartmentFeedback => {
                let fold = GroupedAggregation::mean(
                    GroupBy::Column(columns.department.clone()),
                    &columns.feedback_rating,
                )
                .with_null_keys(self.null_keys);
                self.single_pass(&fold).await?.ranked().into_table(
                    &columns.department,
                    &columns.feedback_rating,
                    Mean::OUTPUT_TYPE,
                )
            }
            ReportKind::PaymentModeSummary => self
                .revenue_by(&columns.payment_mode)
                .await?
                .into_table(&columns.payment_mode, &columns.amount_paid, Sum::OUTPUT_TYPE),
            ReportKind::PatientsPerDepartment => {
                let fold = GroupedAggregation::count(GroupBy::Column(columns.department.clone()))
                    .with_null_keys(self.null_keys);
                self.single_pass(&fold).await?.ranked().into_table(
                    &columns.department,
                    "PatientCount",
                    Count::OUTPUT_TYPE,
                )
            }
            ReportKind::MonthlyRevenue => {
                let fold = GroupedAggregation::sum(
                    GroupBy::Month(columns.admission_date.clone()),
                    &columns.amount_paid,
                )
                .with_null_keys(self.null_keys);
                self.single_pass(&fold)
                    .await?
                    .with_missing_months(BigDecimal::zero())
                    .into_table(&columns.admission_date, &columns.amount_paid, Sum::OUTPUT_TYPE)
            }
            ReportKind::PatientVisitTypes => {
                let fold = GroupedAggregation::distinct(
                    GroupBy::Column(columns.patient_id.clone()),
                    &columns.admission_date,
                )
                .with_null_keys(self.null_keys);
                visit_types_table(
                    self.single_pass(&fold).await?,
                    &columns.patient_id,
                    &columns.admission_date,
                )
            }
            ReportKind::AmountAnomalies => self.anomalies().await?,
        };

        debug!(report = %kind, rows = table.len(), "Report computed");
        Ok(table)
    }

    async fn revenue_by(&self, column: &str) -> Result<FinalResult<BigDecimal>, AnalyticsError> {
        let fold = GroupedAggregation::sum(GroupBy::Column(column.to_string()), &self.columns.amount_paid)
            .with_null_keys(self.null_keys);
        Ok(self.single_pass(&fold).await?.ranked())
    }

    async fn anomalies(&self) -> Result<ResultTable, AnalyticsError> {
        let amount = &self.columns.amount_paid;
        let multiplier = FieldValue::Float(self.reports.anomaly_iqr_multiplier)
            .to_decimal()
            .ok()
            .flatten()
            .ok_or_else(|| {
                ConfigurationError::invalid_value(
                    "reports.anomaly_iqr_multiplier",
                    self.reports.anomaly_iqr_multiplier.to_string(),
                    "multiplier must be a finite number",
                )
            })?;

        let sorted = self.single_pass(&ValueDistribution::new(amount.as_str())).await?;
        let Some(bounds) = OutlierBounds::from_sorted(&sorted, &multiplier) else {
            debug!("No amounts to derive outlier bounds from");
            return Ok(ResultTable::default());
        };
        debug!(
            q1 = %bounds.q1,
            q3 = %bounds.q3,
            upper = %bounds.upper,
            "Outlier bounds computed"
        );

        let outliers = self
            .single_pass(&ThresholdFilter::new(amount.as_str(), bounds.upper))
            .await?;
        info!(count = outliers.rows.len(), "High-value transactions found");
        Ok(ResultTable::from_rows(&outliers.column_names(), outliers.rows))
    }

    /// One chunked pass over a freshly opened source
    async fn single_pass<B: BatchFold>(&self, fold: &B) -> Result<B::Output, AnalyticsError> {
        let source = self.factory.open(&self.query).await?;
        let outcome = self.aggregator.run(source, fold).await?;
        Ok(outcome.result)
    }
}
