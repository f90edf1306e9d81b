//! # Result Sinks
//!
//! A sink persists a finished result table under a name, replacing whatever
//! the name held before. Nothing reaches a sink until an aggregation run has
//! finalized.
//!
//! - [`ResultSink`] - overwrite-by-name contract
//! - [`ResultTable`] - typed columns plus rows
//! - [`MemorySink`] - tables kept in a map
//! - [`PgTableSink`] - `DROP` / `CREATE` / `INSERT` into PostgreSQL

pub mod memory;
pub mod postgres;

pub use memory::MemorySink;
pub use postgres::PgTableSink;

use crate::aggregation::{FieldValue, Row};
use crate::error::SinkError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Persists named result tables with overwrite semantics.
#[async_trait]
pub trait ResultSink: Send {
    async fn write_table(&mut self, name: &str, table: &ResultTable) -> Result<(), SinkError>;
}

#[async_trait]
impl<S: ResultSink + ?Sized> ResultSink for &mut S {
    async fn write_table(&mut self, name: &str, table: &ResultTable) -> Result<(), SinkError> {
        (**self).write_table(name, table).await
    }
}

/// Storage type of a result column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    BigInt,
    Double,
    Numeric,
    Boolean,
    Date,
    Timestamp,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// Whether a value can be stored in a column of this type
    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (_, FieldValue::Null)
                | (ColumnType::Text, _)
                | (ColumnType::BigInt, FieldValue::Int(_))
                | (ColumnType::Double, FieldValue::Int(_) | FieldValue::Float(_))
                | (
                    ColumnType::Numeric,
                    FieldValue::Int(_) | FieldValue::Decimal(_) | FieldValue::Float(_)
                )
                | (ColumnType::Boolean, FieldValue::Bool(_))
                | (ColumnType::Date, FieldValue::Date(_))
                | (ColumnType::Timestamp, FieldValue::Timestamp(_) | FieldValue::Date(_))
        )
    }

    /// Narrowest type able to hold values of both types
    pub fn widen(self, other: ColumnType) -> ColumnType {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => a,
            (BigInt, Double) | (Double, BigInt) => Double,
            (BigInt | Double | Numeric, BigInt | Double | Numeric) => Numeric,
            (Date, Timestamp) | (Timestamp, Date) => Timestamp,
            _ => Text,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_type())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub column_type: ColumnType,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A finished result: typed columns and rows of values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    columns: Vec<TableColumn>,
    rows: Vec<Vec<FieldValue>>,
}

impl ResultTable {
    pub fn new(columns: Vec<TableColumn>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Table over source rows; column types are inferred from the values,
    /// all-null columns become text.
    pub fn from_rows(column_names: &[String], rows: Vec<Row>) -> Self {
        let mut types: Vec<Option<ColumnType>> = vec![None; column_names.len()];
        let mut values = Vec::with_capacity(rows.len());

        for row in rows {
            let row_values: Vec<FieldValue> = column_names
                .iter()
                .map(|name| row.get(name).cloned().unwrap_or(FieldValue::Null))
                .collect();
            for (slot, value) in types.iter_mut().zip(&row_values) {
                if let Some(value_type) = value.column_type() {
                    *slot = Some(slot.map_or(value_type, |t| t.widen(value_type)));
                }
            }
            values.push(row_values);
        }

        let columns = column_names
            .iter()
            .zip(types)
            .map(|(name, t)| TableColumn::new(name.clone(), t.unwrap_or(ColumnType::Text)))
            .collect();

        Self {
            columns,
            rows: values,
        }
    }

    pub fn push_row(&mut self, row: Vec<FieldValue>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[TableColumn] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<FieldValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Value at `row` of column `name`
    pub fn value(&self, row: usize, name: &str) -> Option<&FieldValue> {
        let index = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    /// Check every row against the column list before it is persisted
    pub fn validate(&self, table: &str) -> Result<(), SinkError> {
        for row in &self.rows {
            if row.len() != self.columns.len() {
                return Err(SinkError::write(
                    table,
                    format!(
                        "row has {} values for {} columns",
                        row.len(),
                        self.columns.len()
                    ),
                ));
            }
            for (column, value) in self.columns.iter().zip(row) {
                if !column.column_type.accepts(value) {
                    return Err(SinkError::TypeMismatch {
                        table: table.to_string(),
                        column: column.name.clone(),
                        expected: column.column_type.to_string(),
                        actual: value.kind().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::Columns;
    use bigdecimal::BigDecimal;

    #[test]
    fn test_widening() {
        assert_eq!(ColumnType::BigInt.widen(ColumnType::BigInt), ColumnType::BigInt);
        assert_eq!(ColumnType::BigInt.widen(ColumnType::Double), ColumnType::Double);
        assert_eq!(ColumnType::Double.widen(ColumnType::Numeric), ColumnType::Numeric);
        assert_eq!(ColumnType::Date.widen(ColumnType::Timestamp), ColumnType::Timestamp);
        assert_eq!(ColumnType::Text.widen(ColumnType::BigInt), ColumnType::Text);
    }

    #[test]
    fn test_from_rows_infers_types() {
        let columns: Columns = vec!["PatientID".to_string(), "AmountPaid".to_string(), "Notes".to_string()].into();
        let rows = vec![
            Row::new(columns.clone(), vec![FieldValue::Int(1), FieldValue::Int(10), FieldValue::Null]),
            Row::new(
                columns.clone(),
                vec![FieldValue::Int(2), FieldValue::Decimal(BigDecimal::from(5)), FieldValue::Null],
            ),
        ];

        let table = ResultTable::from_rows(&columns, rows);
        let types: Vec<ColumnType> = table.columns().iter().map(|c| c.column_type).collect();
        assert_eq!(
            types,
            vec![ColumnType::BigInt, ColumnType::Numeric, ColumnType::Text]
        );
        assert_eq!(table.len(), 2);
        assert!(table.validate("anomalies").is_ok());
        assert_eq!(table.value(1, "PatientID"), Some(&FieldValue::Int(2)));
    }

    #[test]
    fn test_validate_rejects_mismatched_values() {
        let mut table = ResultTable::new(vec![TableColumn::new("Value", ColumnType::Numeric)]);
        table.push_row(vec![FieldValue::from("twelve")]);
        let err = table.validate("kpi").unwrap_err();
        assert!(matches!(err, SinkError::TypeMismatch { ref column, .. } if column == "Value"));
    }
}
