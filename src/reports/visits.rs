//! New versus returning patients.

use crate::aggregation::{FieldValue, FinalResult};
use crate::sink::{ColumnType, ResultTable, TableColumn};
use std::fmt;

/// Visit classification of a patient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitType {
    New,
    Returning,
}

impl VisitType {
    /// Returning when the patient was admitted on more than one date
    pub fn from_visits(distinct_dates: i64) -> Self {
        if distinct_dates > 1 {
            VisitType::Returning
        } else {
            VisitType::New
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VisitType::New => "New",
            VisitType::Returning => "Returning",
        }
    }
}

impl fmt::Display for VisitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (patient, distinct admission dates, type) table from a distinct count of
/// admission dates per patient. Patients keep the type of their id column.
pub fn visit_types_table(
    visits: FinalResult<i64>,
    patient_column: &str,
    date_column: &str,
) -> ResultTable {
    let mut table = ResultTable::new(vec![
        TableColumn::new(patient_column, visits.key_type()),
        TableColumn::new(date_column, ColumnType::BigInt),
        TableColumn::new("Type", ColumnType::Text),
    ]);
    for (patient, dates) in visits.into_keyed_entries() {
        table.push_row(vec![
            patient.into_value(),
            FieldValue::Int(dates),
            VisitType::from_visits(dates).as_str().into(),
        ]);
    }
    table
}
