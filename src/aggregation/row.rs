//! Row data model shared by sources, aggregations and sinks.

use crate::error::AggregationError;
use crate::sink::ColumnType;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A single typed field value read from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(BigDecimal),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::Decimal(_) => "decimal",
            FieldValue::Text(_) => "text",
            FieldValue::Date(_) => "date",
            FieldValue::Timestamp(_) => "timestamp",
        }
    }

    /// Column type a sink needs to store this value, `None` for nulls
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            FieldValue::Null => None,
            FieldValue::Bool(_) => Some(ColumnType::Boolean),
            FieldValue::Int(_) => Some(ColumnType::BigInt),
            FieldValue::Float(_) => Some(ColumnType::Double),
            FieldValue::Decimal(_) => Some(ColumnType::Numeric),
            FieldValue::Text(_) => Some(ColumnType::Text),
            FieldValue::Date(_) => Some(ColumnType::Date),
            FieldValue::Timestamp(_) => Some(ColumnType::Timestamp),
        }
    }

    /// Numeric view of the value as an exact decimal.
    ///
    /// Floats convert through their shortest round-trip rendering, so `0.1`
    /// becomes exactly `0.1`. Returns `Ok(None)` for nulls and non-finite
    /// floats, `Err` with the value kind for non-numeric values.
    pub fn to_decimal(&self) -> Result<Option<BigDecimal>, &'static str> {
        match self {
            FieldValue::Null => Ok(None),
            FieldValue::Int(i) => Ok(Some(BigDecimal::from(*i))),
            FieldValue::Float(f) if f.is_finite() => Ok(BigDecimal::from_str(&f.to_string()).ok()),
            FieldValue::Float(_) => Ok(None),
            FieldValue::Decimal(d) => Ok(Some(d.clone())),
            other => Err(other.kind()),
        }
    }

    /// Rendering used when the value acts as a grouping key, `None` for nulls
    pub fn to_key(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Calendar date of a date, timestamp or ISO formatted text value
    pub fn to_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            FieldValue::Timestamp(ts) => Some(ts.date()),
            FieldValue::Text(s) => {
                let s = s.trim();
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .or_else(|| {
                        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                            .ok()
                            .map(|ts| ts.date())
                    })
                    .or_else(|| {
                        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                            .ok()
                            .map(|ts| ts.date())
                    })
            }
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Decimal(d) => write!(f, "{d}"),
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<BigDecimal> for FieldValue {
    fn from(value: BigDecimal) -> Self {
        FieldValue::Decimal(value)
    }
}

impl From<Option<BigDecimal>> for FieldValue {
    fn from(value: Option<BigDecimal>) -> Self {
        value.map_or(FieldValue::Null, FieldValue::Decimal)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

/// Column names shared by every row of one fetch
pub type Columns = Arc<[String]>;

/// An ordered tuple of named fields
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Columns,
    values: Vec<FieldValue>,
}

impl Row {
    /// Build a row; `values` must line up with `columns`
    pub fn new(columns: Columns, values: Vec<FieldValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn shared_columns(&self) -> &Columns {
        &self.columns
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<FieldValue> {
        self.values
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Value of a named field, `None` when the row has no such column
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.index_of(column).map(|i| &self.values[i])
    }

    /// Value of a named field; a missing column makes the row malformed
    pub fn require(&self, column: &str) -> Result<&FieldValue, AggregationError> {
        self.get(column)
            .ok_or_else(|| AggregationError::missing_column(column))
    }
}

/// Bounded, ordered rows produced by one fetch. An empty batch ends the stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    rows: Vec<Row>,
}

impl Batch {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names of the batch, taken from its first row
    pub fn columns(&self) -> Option<&Columns> {
        self.rows.first().map(Row::shared_columns)
    }
}

impl From<Vec<Row>> for Batch {
    fn from(rows: Vec<Row>) -> Self {
        Self::new(rows)
    }
}
