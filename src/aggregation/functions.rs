//! Mergeable aggregate functions.
//!
//! Every aggregate is a small state that can be updated row by row and merged
//! with another state of the same kind. Merging is commutative and
//! associative, which is what lets a grouped aggregate be computed per batch
//! and combined afterwards without changing the result.

use super::row::FieldValue;
use crate::sink::ColumnType;
use bigdecimal::{BigDecimal, Zero};
use std::collections::HashSet;

/// A mergeable aggregate state.
pub trait Aggregate: Default + Clone + PartialEq + std::fmt::Debug {
    /// Finalized value
    type Output: Clone + PartialEq + std::fmt::Debug + Into<FieldValue>;

    /// Column type the finalized value is stored as
    const OUTPUT_TYPE: ColumnType;

    /// Fold one measure value into the state.
    ///
    /// `Err` carries a short reason when the value cannot be aggregated.
    fn update(&mut self, value: &FieldValue) -> Result<(), String>;

    /// Combine another partial state into this one
    fn merge(&mut self, other: Self);

    fn finish(self) -> Self::Output;
}

fn numeric(value: &FieldValue) -> Result<Option<BigDecimal>, String> {
    value
        .to_decimal()
        .map_err(|kind| format!("expected a numeric value, got {kind}"))
}

/// Exact decimal sum of non-null values
#[derive(Debug, Clone, PartialEq)]
pub struct Sum(BigDecimal);

impl Default for Sum {
    fn default() -> Self {
        Self(BigDecimal::zero())
    }
}

impl Sum {
    pub fn value(&self) -> &BigDecimal {
        &self.0
    }
}

impl Aggregate for Sum {
    type Output = BigDecimal;
    const OUTPUT_TYPE: ColumnType = ColumnType::Numeric;

    fn update(&mut self, value: &FieldValue) -> Result<(), String> {
        if let Some(amount) = numeric(value)? {
            self.0 += amount;
        }
        Ok(())
    }

    fn merge(&mut self, other: Self) {
        self.0 += other.0;
    }

    fn finish(self) -> BigDecimal {
        self.0
    }
}

/// Arithmetic mean of non-null values; `None` when nothing was observed
#[derive(Debug, Clone, PartialEq)]
pub struct Mean {
    sum: BigDecimal,
    count: u64,
}

impl Default for Mean {
    fn default() -> Self {
        Self {
            sum: BigDecimal::zero(),
            count: 0,
        }
    }
}

impl Mean {
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Aggregate for Mean {
    type Output = Option<BigDecimal>;
    const OUTPUT_TYPE: ColumnType = ColumnType::Numeric;

    fn update(&mut self, value: &FieldValue) -> Result<(), String> {
        if let Some(amount) = numeric(value)? {
            self.sum += amount;
            self.count += 1;
        }
        Ok(())
    }

    fn merge(&mut self, other: Self) {
        self.sum += other.sum;
        self.count += other.count;
    }

    fn finish(self) -> Option<BigDecimal> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / BigDecimal::from(self.count))
        }
    }
}

/// Number of rows, whatever their value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Count(i64);

impl Aggregate for Count {
    type Output = i64;
    const OUTPUT_TYPE: ColumnType = ColumnType::BigInt;

    fn update(&mut self, _value: &FieldValue) -> Result<(), String> {
        self.0 += 1;
        Ok(())
    }

    fn merge(&mut self, other: Self) {
        self.0 += other.0;
    }

    fn finish(self) -> i64 {
        self.0
    }
}

/// Number of distinct non-null values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistinctCount(HashSet<String>);

impl DistinctCount {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Aggregate for DistinctCount {
    type Output = i64;
    const OUTPUT_TYPE: ColumnType = ColumnType::BigInt;

    fn update(&mut self, value: &FieldValue) -> Result<(), String> {
        if let Some(key) = value.to_key() {
            self.0.insert(key);
        }
        Ok(())
    }

    fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    fn finish(self) -> i64 {
        self.0.len() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn fold<A: Aggregate>(values: &[FieldValue]) -> A {
        let mut state = A::default();
        for value in values {
            state.update(value).unwrap();
        }
        state
    }

    #[test]
    fn test_sum_skips_nulls_and_mixes_numeric_kinds() {
        let sum: Sum = fold(&[
            FieldValue::Int(10),
            FieldValue::Null,
            FieldValue::Decimal(dec("2.25")),
            FieldValue::Float(0.75),
        ]);
        assert_eq!(sum.finish(), dec("13"));
    }

    #[test]
    fn test_sum_rejects_text() {
        let mut sum = Sum::default();
        let err = sum.update(&FieldValue::from("12")).unwrap_err();
        assert!(err.contains("text"));
    }

    #[test]
    fn test_mean_merges_sum_and_count() {
        let mut left: Mean = fold(&[FieldValue::Int(4)]);
        let right: Mean = fold(&[FieldValue::Int(5), FieldValue::Null]);
        left.merge(right);
        assert_eq!(left.count(), 2);
        assert_eq!(left.finish(), Some(dec("4.5")));
        assert_eq!(Mean::default().finish(), None);
    }

    #[test]
    fn test_count_counts_rows_including_nulls() {
        let count: Count = fold(&[FieldValue::Null, FieldValue::Int(1), FieldValue::from("x")]);
        assert_eq!(count.finish(), 3);
    }

    #[test]
    fn test_distinct_count_merge_is_a_union() {
        let mut left: DistinctCount = fold(&[FieldValue::from("P1"), FieldValue::from("P2")]);
        let right: DistinctCount = fold(&[FieldValue::from("P2"), FieldValue::from("P3")]);
        left.merge(right);
        assert_eq!(left.len(), 3);
        assert_eq!(left.finish(), 3);
    }

    #[test]
    fn test_merge_order_does_not_matter() {
        let a: Sum = fold(&[FieldValue::Int(13)]);
        let b: Sum = fold(&[FieldValue::Int(2)]);

        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);
        assert_eq!(ab, ba);
    }
}
