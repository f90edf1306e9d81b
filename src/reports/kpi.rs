//! Headline KPIs of the visit table in a single pass.

use crate::aggregation::{Aggregate, Batch, BatchFold, DistinctCount, FieldValue, Mean, Row, Sum};
use crate::config::ColumnMapping;
use crate::error::AggregationError;
use crate::sink::{ColumnType, ResultTable, TableColumn};
use bigdecimal::BigDecimal;

/// Mergeable state of every KPI
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KpiState {
    patients: DistinctCount,
    doctors: DistinctCount,
    billing: Sum,
    paid: Sum,
    age: Mean,
}

impl KpiState {
    pub fn merge(&mut self, other: KpiState) {
        self.patients.merge(other.patients);
        self.doctors.merge(other.doctors);
        self.billing.merge(other.billing);
        self.paid.merge(other.paid);
        self.age.merge(other.age);
    }
}

/// Finalized KPI values
#[derive(Debug, Clone, PartialEq)]
pub struct KpiSnapshot {
    pub total_patients: i64,
    pub total_doctors: i64,
    pub total_billing: BigDecimal,
    pub total_paid: BigDecimal,
    /// Rounded to two decimals, `None` when no age was recorded
    pub average_age: Option<BigDecimal>,
}

impl KpiSnapshot {
    /// (Metric, Value) table
    pub fn into_table(self) -> ResultTable {
        let mut table = ResultTable::new(vec![
            TableColumn::new("Metric", ColumnType::Text),
            TableColumn::new("Value", ColumnType::Numeric),
        ]);
        let metrics: [(&str, FieldValue); 5] = [
            ("Total Patients", FieldValue::Int(self.total_patients)),
            ("Total Doctors", FieldValue::Int(self.total_doctors)),
            ("Total Billing", self.total_billing.into()),
            ("Total Amount Paid", self.total_paid.into()),
            ("Average Age", self.average_age.into()),
        ];
        for (metric, value) in metrics {
            table.push_row(vec![metric.into(), value]);
        }
        table
    }
}

/// Distinct patients and doctors, billed and paid totals, average age
#[derive(Debug, Clone)]
pub struct KpiSummary {
    patient_id: String,
    doctor_id: String,
    total_bill_amount: String,
    amount_paid: String,
    age: String,
}

impl KpiSummary {
    pub fn new(columns: &ColumnMapping) -> Self {
        Self {
            patient_id: columns.patient_id.clone(),
            doctor_id: columns.doctor_id.clone(),
            total_bill_amount: columns.total_bill_amount.clone(),
            amount_paid: columns.amount_paid.clone(),
            age: columns.age.clone(),
        }
    }

    fn fold_row(&self, state: &mut KpiState, row: &Row) -> Result<(), AggregationError> {
        update(&mut state.patients, row, &self.patient_id)?;
        update(&mut state.doctors, row, &self.doctor_id)?;
        update(&mut state.billing, row, &self.total_bill_amount)?;
        update(&mut state.paid, row, &self.amount_paid)?;
        update(&mut state.age, row, &self.age)
    }
}

fn update<A: Aggregate>(state: &mut A, row: &Row, column: &str) -> Result<(), AggregationError> {
    state
        .update(row.require(column)?)
        .map_err(|reason| AggregationError::malformed_row(column, reason))
}

impl BatchFold for KpiSummary {
    type Partial = KpiState;
    type State = KpiState;
    type Output = KpiSnapshot;

    fn aggregate_batch(&self, batch: &Batch) -> Result<KpiState, AggregationError> {
        let mut state = KpiState::default();
        for row in batch.rows() {
            self.fold_row(&mut state, row)?;
        }
        Ok(state)
    }

    fn merge(&self, state: &mut KpiState, partial: KpiState) {
        state.merge(partial);
    }

    fn finalize(&self, state: KpiState) -> KpiSnapshot {
        KpiSnapshot {
            total_patients: state.patients.finish(),
            total_doctors: state.doctors.finish(),
            total_billing: state.billing.finish(),
            total_paid: state.paid.finish(),
            average_age: state.age.finish().map(|age| age.round(2)),
        }
    }
}
