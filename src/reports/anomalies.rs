//! IQR-based detection of unusually high amounts.
//!
//! Two passes over the source: [`ValueDistribution`] collects the measure to
//! compute the quartiles, then [`ThresholdFilter`] keeps the rows above
//! `Q3 + k * IQR`.

use crate::aggregation::{Batch, BatchFold, Columns, Row};
use crate::error::AggregationError;
use bigdecimal::{BigDecimal, ToPrimitive};

/// Quantile `q` of ascending `sorted` values, linearly interpolated between
/// the two closest ranks. `None` for an empty slice.
pub fn quantile(sorted: &[BigDecimal], q: &BigDecimal) -> Option<BigDecimal> {
    let last = sorted.len().checked_sub(1)?;
    let position = q * BigDecimal::from(last as u64);
    let lower = position.with_scale(0).to_usize()?.min(last);
    let upper = (lower + 1).min(last);
    let fraction = &position - BigDecimal::from(lower as u64);
    Some(&sorted[lower] + (&sorted[upper] - &sorted[lower]) * fraction)
}

/// Quartiles and the upper outlier fence of a distribution
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierBounds {
    pub q1: BigDecimal,
    pub q3: BigDecimal,
    pub iqr: BigDecimal,
    pub upper: BigDecimal,
}

impl OutlierBounds {
    pub fn from_sorted(sorted: &[BigDecimal], multiplier: &BigDecimal) -> Option<Self> {
        let q1 = quantile(sorted, &BigDecimal::new(25.into(), 2))?;
        let q3 = quantile(sorted, &BigDecimal::new(75.into(), 2))?;
        let iqr = &q3 - &q1;
        let upper = &q3 + multiplier * &iqr;
        Some(Self { q1, q3, iqr, upper })
    }
}

fn measure(row: &Row, column: &str) -> Result<Option<BigDecimal>, AggregationError> {
    row.require(column)?.to_decimal().map_err(|kind| {
        AggregationError::malformed_row(column, format!("expected a numeric value, got {kind}"))
    })
}

/// Collects the non-null values of one numeric column
#[derive(Debug, Clone)]
pub struct ValueDistribution {
    column: String,
}

impl ValueDistribution {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl BatchFold for ValueDistribution {
    type Partial = Vec<BigDecimal>;
    type State = Vec<BigDecimal>;
    /// Values in ascending order
    type Output = Vec<BigDecimal>;

    fn aggregate_batch(&self, batch: &Batch) -> Result<Vec<BigDecimal>, AggregationError> {
        let mut values = Vec::with_capacity(batch.len());
        for row in batch.rows() {
            if let Some(value) = measure(row, &self.column)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    fn merge(&self, state: &mut Vec<BigDecimal>, partial: Vec<BigDecimal>) {
        state.extend(partial);
    }

    fn finalize(&self, mut state: Vec<BigDecimal>) -> Vec<BigDecimal> {
        state.sort();
        state
    }
}

/// Rows kept by a [`ThresholdFilter`], with the column names of the source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredRows {
    pub columns: Option<Columns>,
    pub rows: Vec<Row>,
}

impl FilteredRows {
    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .as_ref()
            .map(|c| c.to_vec())
            .unwrap_or_default()
    }
}

/// Keeps every row whose measure is strictly above a threshold
#[derive(Debug, Clone)]
pub struct ThresholdFilter {
    column: String,
    threshold: BigDecimal,
}

impl ThresholdFilter {
    pub fn new(column: impl Into<String>, threshold: BigDecimal) -> Self {
        Self {
            column: column.into(),
            threshold,
        }
    }

    pub fn threshold(&self) -> &BigDecimal {
        &self.threshold
    }
}

impl BatchFold for ThresholdFilter {
    type Partial = FilteredRows;
    type State = FilteredRows;
    type Output = FilteredRows;

    fn aggregate_batch(&self, batch: &Batch) -> Result<FilteredRows, AggregationError> {
        let mut rows = Vec::new();
        for row in batch.rows() {
            if measure(row, &self.column)?.is_some_and(|value| value > self.threshold) {
                rows.push(row.clone());
            }
        }
        Ok(FilteredRows {
            columns: batch.columns().cloned(),
            rows,
        })
    }

    fn merge(&self, state: &mut FilteredRows, partial: FilteredRows) {
        if state.columns.is_none() {
            state.columns = partial.columns;
        }
        state.rows.extend(partial.rows);
    }

    fn finalize(&self, state: FilteredRows) -> FilteredRows {
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::FieldValue;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn values(range: std::ops::RangeInclusive<i64>) -> Vec<BigDecimal> {
        range.map(BigDecimal::from).collect()
    }

    fn batch(amounts: &[Option<i64>]) -> Batch {
        let columns: Columns = vec!["PatientID".to_string(), "AmountPaid".to_string()].into();
        amounts
            .iter()
            .enumerate()
            .map(|(i, amount)| {
                Row::new(
                    columns.clone(),
                    vec![
                        FieldValue::from(format!("P{i}")),
                        amount.map_or(FieldValue::Null, FieldValue::Int),
                    ],
                )
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_quantile_interpolates_between_ranks() {
        let sorted = values(1..=8);
        assert_eq!(quantile(&sorted, &dec("0.25")), Some(dec("2.75")));
        assert_eq!(quantile(&sorted, &dec("0.75")), Some(dec("6.25")));
        assert_eq!(quantile(&sorted, &dec("0")), Some(dec("1")));
        assert_eq!(quantile(&sorted, &dec("1")), Some(dec("8")));
        assert_eq!(quantile(&values(5..=5), &dec("0.75")), Some(dec("5")));
        assert_eq!(quantile(&[], &dec("0.5")), None);
    }

    #[test]
    fn test_outlier_bounds() {
        let bounds = OutlierBounds::from_sorted(&values(1..=8), &dec("1.5")).unwrap();
        assert_eq!(bounds.q1, dec("2.75"));
        assert_eq!(bounds.q3, dec("6.25"));
        assert_eq!(bounds.iqr, dec("3.5"));
        assert_eq!(bounds.upper, dec("11.5"));
        assert!(OutlierBounds::from_sorted(&[], &dec("1.5")).is_none());
    }

    #[test]
    fn test_distribution_skips_nulls_and_sorts() {
        let fold = ValueDistribution::new("AmountPaid");
        let mut state = Vec::new();
        fold.merge(
            &mut state,
            fold.aggregate_batch(&batch(&[Some(9), None])).unwrap(),
        );
        fold.merge(&mut state, fold.aggregate_batch(&batch(&[Some(3)])).unwrap());
        assert_eq!(fold.finalize(state), vec![dec("3"), dec("9")]);
    }

    #[test]
    fn test_threshold_keeps_rows_strictly_above() {
        let fold = ThresholdFilter::new("AmountPaid", dec("10"));
        let kept = fold
            .aggregate_batch(&batch(&[Some(10), Some(11), None, Some(500)]))
            .unwrap();
        assert_eq!(kept.rows.len(), 2);
        assert_eq!(kept.column_names(), vec!["PatientID", "AmountPaid"]);
        assert_eq!(kept.rows[1].get("AmountPaid"), Some(&FieldValue::Int(500)));
    }

    #[test]
    fn test_non_numeric_measure_is_malformed() {
        let columns: Columns = vec!["AmountPaid".to_string()].into();
        let batch = Batch::new(vec![Row::new(columns, vec!["lots".into()])]);
        assert!(ValueDistribution::new("AmountPaid")
            .aggregate_batch(&batch)
            .is_err());
    }
}
