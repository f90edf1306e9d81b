//! Grouped aggregation: partial results per batch, a merging accumulator and
//! the finalized, ordered result.

use super::chunked::BatchFold;
use super::functions::{Aggregate, Count, DistinctCount, Mean, Sum};
use super::row::{Batch, FieldValue, Row};
use crate::error::AggregationError;
use crate::sink::{ColumnType, ResultTable, TableColumn};
use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// How rows with a null grouping key are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKeyPolicy {
    /// Leave the row out of every group
    #[default]
    Skip,
    /// Fail the run with a malformed row error
    Reject,
}

/// Grouping key of a row.
///
/// Groups are matched by the rendered label; the typed value the label came
/// from is kept so results order numerically or chronologically and sinks
/// can store the key with its own column type.
#[derive(Debug, Clone)]
pub struct GroupKey {
    label: String,
    value: FieldValue,
}

impl GroupKey {
    /// Key for `value`, `None` for nulls
    pub fn new(value: FieldValue) -> Option<Self> {
        let label = value.to_key()?;
        Some(Self { label, value })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn into_value(self) -> FieldValue {
        self.value
    }

    /// Sort class of the key value; finite numeric kinds share one class
    fn rank(&self) -> u8 {
        match self.value {
            FieldValue::Bool(_) => 0,
            FieldValue::Float(f) if !f.is_finite() => 2,
            FieldValue::Int(_) | FieldValue::Float(_) | FieldValue::Decimal(_) => 1,
            FieldValue::Date(_) | FieldValue::Timestamp(_) => 3,
            FieldValue::Text(_) => 4,
            FieldValue::Null => 5,
        }
    }

    fn typed_cmp(&self, other: &Self) -> Option<Ordering> {
        use FieldValue::*;
        match (&self.value, &other.value) {
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            (Date(a), Timestamp(b)) => Some(a.and_time(NaiveTime::default()).cmp(b)),
            (Timestamp(a), Date(b)) => Some(a.cmp(&b.and_time(NaiveTime::default()))),
            (a, b) => match (a.to_decimal(), b.to_decimal()) {
                (Ok(Some(a)), Ok(Some(b))) => Some(a.cmp(&b)),
                _ => None,
            },
        }
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.label.hash(state);
    }
}

impl Borrow<str> for GroupKey {
    fn borrow(&self) -> &str {
        &self.label
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.typed_cmp(other).unwrap_or(Ordering::Equal))
            .then_with(|| self.label.cmp(&other.label))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl From<&str> for GroupKey {
    fn from(label: &str) -> Self {
        Self::from(label.to_string())
    }
}

impl From<String> for GroupKey {
    fn from(label: String) -> Self {
        Self {
            value: FieldValue::Text(label.clone()),
            label,
        }
    }
}

/// Source of the grouping key of a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupBy {
    /// Rendered value of a column
    Column(String),
    /// Month of a date column, labelled by the last day of the month
    Month(String),
}

impl GroupBy {
    pub fn column(&self) -> &str {
        match self {
            GroupBy::Column(c) | GroupBy::Month(c) => c,
        }
    }

    /// Grouping key of `row`; `Ok(None)` when the key is null
    pub fn key_of(&self, row: &Row) -> Result<Option<GroupKey>, AggregationError> {
        let column = self.column();
        let value = row.require(column)?;

        match self {
            GroupBy::Column(_) => Ok(GroupKey::new(value.clone())),
            GroupBy::Month(_) => {
                if value.is_null() {
                    return Ok(None);
                }
                let date = value.to_date().ok_or_else(|| {
                    AggregationError::malformed_row(
                        column,
                        format!("expected a date, got {}", value.kind()),
                    )
                })?;
                Ok(GroupKey::new(FieldValue::Date(month_end(date))))
            }
        }
    }
}

/// Last day of the month containing `date`
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// Per-batch mapping from grouping key to aggregate state
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResult<A: Aggregate> {
    groups: HashMap<GroupKey, A>,
}

impl<A: Aggregate> Default for PartialResult<A> {
    fn default() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }
}

impl<A: Aggregate> PartialResult<A> {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&A> {
        self.groups.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(GroupKey::label)
    }
}

impl<A: Aggregate> FromIterator<(String, A)> for PartialResult<A> {
    fn from_iter<I: IntoIterator<Item = (String, A)>>(iter: I) -> Self {
        Self {
            groups: iter
                .into_iter()
                .map(|(key, state)| (GroupKey::from(key), state))
                .collect(),
        }
    }
}

/// Running aggregate per grouping key across all merged batches
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator<A: Aggregate> {
    groups: HashMap<GroupKey, A>,
}

impl<A: Aggregate> Default for Accumulator<A> {
    fn default() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }
}

impl<A: Aggregate> Accumulator<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a partial result in: every key of `partial` is merged into the
    /// existing entry, or inserted when absent.
    pub fn merge(&mut self, partial: PartialResult<A>) {
        for (key, state) in partial.groups {
            match self.groups.get_mut(&key) {
                Some(existing) => existing.merge(state),
                None => {
                    self.groups.insert(key, state);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&A> {
        self.groups.get(key)
    }

    /// Materialize the accumulator as (key, value) pairs ordered by key
    pub fn finalize(self) -> FinalResult<A::Output> {
        let mut entries: Vec<(GroupKey, A::Output)> = self
            .groups
            .into_iter()
            .map(|(key, state)| (key, state.finish()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        FinalResult { entries }
    }
}

/// Finalized grouped result, ordered by key unless ranked
#[derive(Debug, Clone, PartialEq)]
pub struct FinalResult<T> {
    entries: Vec<(GroupKey, T)>,
}

impl<T> Default for FinalResult<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> FinalResult<T> {
    /// (label, value) pairs in result order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.label(), v))
    }

    pub fn into_entries(self) -> Vec<(String, T)> {
        self.entries
            .into_iter()
            .map(|(key, value)| (key.label, value))
            .collect()
    }

    pub fn into_keyed_entries(self) -> Vec<(GroupKey, T)> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(k, _)| k.label() == key)
            .map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.label())
    }

    /// Column type able to store every key, text when there are none
    pub fn key_type(&self) -> ColumnType {
        self.entries
            .iter()
            .filter_map(|(k, _)| k.value().column_type())
            .reduce(ColumnType::widen)
            .unwrap_or(ColumnType::Text)
    }

    /// Keep only the first `n` entries
    pub fn top(mut self, n: usize) -> Self {
        self.entries.truncate(n);
        self
    }

    /// Insert `fill` for every calendar month missing between the first
    /// and last month-end key, keeping the result ordered by month.
    ///
    /// Results whose keys are not all dates are returned unchanged.
    pub fn with_missing_months(self, fill: T) -> Self
    where
        T: Clone,
    {
        let dates: Option<Vec<NaiveDate>> = self
            .entries
            .iter()
            .map(|(k, _)| match k.value() {
                FieldValue::Date(d) => Some(month_end(*d)),
                _ => None,
            })
            .collect();
        let (Some(first), Some(last)) = (
            dates.as_ref().and_then(|d| d.iter().min().copied()),
            dates.as_ref().and_then(|d| d.iter().max().copied()),
        ) else {
            return self;
        };

        let mut existing: HashMap<NaiveDate, T> = HashMap::new();
        for (key, value) in self.entries {
            if let FieldValue::Date(d) = key.into_value() {
                existing.insert(month_end(d), value);
            }
        }

        let mut entries = Vec::new();
        let mut month = first;
        while month <= last {
            let value = existing.remove(&month).unwrap_or_else(|| fill.clone());
            if let Some(key) = GroupKey::new(FieldValue::Date(month)) {
                entries.push((key, value));
            }
            match month.succ_opt() {
                Some(next) => month = month_end(next),
                None => break,
            }
        }
        FinalResult { entries }
    }

    /// Two-column result table: the key in its own type, the value as
    /// `value_type`
    pub fn into_table(
        self,
        key_column: &str,
        value_column: &str,
        value_type: ColumnType,
    ) -> ResultTable
    where
        T: Into<FieldValue>,
    {
        let mut table = ResultTable::new(vec![
            TableColumn::new(key_column, self.key_type()),
            TableColumn::new(value_column, value_type),
        ]);
        for (key, value) in self.entries {
            table.push_row(vec![key.into_value(), value.into()]);
        }
        table
    }
}

impl<T: Ord> FinalResult<T> {
    /// Order by value descending, ties by key ascending
    pub fn ranked(mut self) -> Self {
        self.entries
            .sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        self
    }
}

/// Group-by aggregation of one measure column
#[derive(Debug, Clone)]
pub struct GroupedAggregation<A: Aggregate> {
    group_by: GroupBy,
    measure: Option<String>,
    null_keys: NullKeyPolicy,
    _aggregate: std::marker::PhantomData<A>,
}

impl<A: Aggregate> GroupedAggregation<A> {
    /// Aggregate `measure` per `group_by` key; without a measure every row
    /// contributes a null value.
    pub fn new(group_by: GroupBy, measure: Option<String>) -> Self {
        Self {
            group_by,
            measure,
            null_keys: NullKeyPolicy::default(),
            _aggregate: std::marker::PhantomData,
        }
    }

    pub fn with_null_keys(mut self, policy: NullKeyPolicy) -> Self {
        self.null_keys = policy;
        self
    }

    pub fn group_by(&self) -> &GroupBy {
        &self.group_by
    }

    pub fn measure(&self) -> Option<&str> {
        self.measure.as_deref()
    }

    /// Group one batch by key and aggregate the measure per key.
    ///
    /// The result depends only on the multiset of rows in the batch.
    pub fn aggregate_batch(&self, batch: &Batch) -> Result<PartialResult<A>, AggregationError> {
        let mut groups: HashMap<GroupKey, A> = HashMap::new();

        for row in batch.rows() {
            let key = match self.group_by.key_of(row)? {
                Some(key) => key,
                None => match self.null_keys {
                    NullKeyPolicy::Skip => continue,
                    NullKeyPolicy::Reject => {
                        return Err(AggregationError::malformed_row(
                            self.group_by.column(),
                            "grouping key is null",
                        ))
                    }
                },
            };

            let value = match &self.measure {
                Some(column) => row.require(column)?,
                None => &FieldValue::Null,
            };

            groups
                .entry(key)
                .or_default()
                .update(value)
                .map_err(|reason| {
                    AggregationError::malformed_row(
                        self.measure.as_deref().unwrap_or(self.group_by.column()),
                        reason,
                    )
                })?;
        }

        Ok(PartialResult { groups })
    }

    /// Merge a batch's partial result into the accumulator
    pub fn merge(&self, accumulator: &mut Accumulator<A>, partial: PartialResult<A>) {
        accumulator.merge(partial);
    }
}

impl GroupedAggregation<Sum> {
    pub fn sum(group_by: GroupBy, measure: impl Into<String>) -> Self {
        Self::new(group_by, Some(measure.into()))
    }
}

impl GroupedAggregation<Mean> {
    pub fn mean(group_by: GroupBy, measure: impl Into<String>) -> Self {
        Self::new(group_by, Some(measure.into()))
    }
}

impl GroupedAggregation<Count> {
    pub fn count(group_by: GroupBy) -> Self {
        Self::new(group_by, None)
    }
}

impl GroupedAggregation<DistinctCount> {
    pub fn distinct(group_by: GroupBy, column: impl Into<String>) -> Self {
        Self::new(group_by, Some(column.into()))
    }
}

impl<A: Aggregate> BatchFold for GroupedAggregation<A> {
    type Partial = PartialResult<A>;
    type State = Accumulator<A>;
    type Output = FinalResult<A::Output>;

    fn aggregate_batch(&self, batch: &Batch) -> Result<Self::Partial, AggregationError> {
        GroupedAggregation::aggregate_batch(self, batch)
    }

    fn merge(&self, state: &mut Self::State, partial: Self::Partial) {
        state.merge(partial);
    }

    fn finalize(&self, state: Self::State) -> Self::Output {
        state.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::row::Columns;
    use bigdecimal::BigDecimal;

    fn batch(rows: &[(&str, i64)]) -> Batch {
        let columns: Columns = vec!["Department".to_string(), "AmountPaid".to_string()].into();
        rows.iter()
            .map(|(k, v)| Row::new(columns.clone(), vec![(*k).into(), FieldValue::Int(*v)]))
            .collect::<Vec<_>>()
            .into()
    }

    fn dept_sum() -> GroupedAggregation<Sum> {
        GroupedAggregation::sum(GroupBy::Column("Department".into()), "AmountPaid")
    }

    fn partial(entries: &[(&str, i64)]) -> PartialResult<Sum> {
        dept_sum().aggregate_batch(&batch(entries)).unwrap()
    }

    fn totals(result: FinalResult<BigDecimal>) -> Vec<(String, BigDecimal)> {
        result.into_entries()
    }

    #[test]
    fn test_aggregate_batch_sums_per_key() {
        let result = partial(&[("A", 10), ("B", 5), ("A", 3)]);
        assert_eq!(result.len(), 2);
        assert_eq!(result.get("A").unwrap().value(), &BigDecimal::from(13));
        assert_eq!(result.get("B").unwrap().value(), &BigDecimal::from(5));
    }

    #[test]
    fn test_aggregate_batch_ignores_row_order() {
        let forward = partial(&[("A", 10), ("B", 5), ("A", 3)]);
        let shuffled = partial(&[("A", 3), ("A", 10), ("B", 5)]);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let first = partial(&[("A", 10), ("B", 5), ("A", 3)]);
        let second = partial(&[("A", 2), ("C", 4)]);

        let mut forward = Accumulator::new();
        forward.merge(first.clone());
        forward.merge(second.clone());

        let mut backward = Accumulator::new();
        backward.merge(second);
        backward.merge(first);

        assert_eq!(forward, backward);
        assert_eq!(
            totals(forward.finalize()),
            vec![
                ("A".to_string(), BigDecimal::from(15)),
                ("B".to_string(), BigDecimal::from(5)),
                ("C".to_string(), BigDecimal::from(4)),
            ]
        );
    }

    #[test]
    fn test_missing_measure_column_is_malformed() {
        let columns: Columns = vec!["Department".to_string()].into();
        let batch = Batch::new(vec![Row::new(columns, vec!["A".into()])]);
        let err = dept_sum().aggregate_batch(&batch).unwrap_err();
        assert!(
            matches!(err, AggregationError::MalformedRow { ref column, .. } if column == "AmountPaid")
        );
    }

    #[test]
    fn test_null_key_policy() {
        let columns: Columns = vec!["Department".to_string(), "AmountPaid".to_string()].into();
        let batch = Batch::new(vec![
            Row::new(columns.clone(), vec![FieldValue::Null, FieldValue::Int(1)]),
            Row::new(columns, vec!["A".into(), FieldValue::Int(2)]),
        ]);

        let result = dept_sum().aggregate_batch(&batch).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.get("A").unwrap().value(), &BigDecimal::from(2));

        let rejecting = dept_sum().with_null_keys(NullKeyPolicy::Reject);
        assert!(matches!(
            rejecting.aggregate_batch(&batch),
            Err(AggregationError::MalformedRow { ref column, .. }) if column == "Department"
        ));
    }

    #[test]
    fn test_integer_keys_order_numerically() {
        let columns: Columns = vec!["PatientID".to_string()].into();
        let batch = Batch::new(
            [10, 2, 1]
                .iter()
                .map(|id| Row::new(columns.clone(), vec![FieldValue::Int(*id)]))
                .collect(),
        );
        let mut acc = Accumulator::new();
        acc.merge(
            GroupedAggregation::count(GroupBy::Column("PatientID".into()))
                .aggregate_batch(&batch)
                .unwrap(),
        );
        let result = acc.finalize();

        let keys: Vec<&str> = result.keys().collect();
        assert_eq!(keys, vec!["1", "2", "10"]);
        assert_eq!(result.key_type(), ColumnType::BigInt);

        let table = result.into_table("PatientID", "Visits", ColumnType::BigInt);
        assert_eq!(table.columns()[0].column_type, ColumnType::BigInt);
        assert_eq!(table.rows()[2][0], FieldValue::Int(10));
    }

    #[test]
    fn test_missing_months_are_filled() {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let columns: Columns = vec!["AdmissionDate".to_string(), "AmountPaid".to_string()].into();
        let batch = Batch::new(vec![
            Row::new(
                columns.clone(),
                vec![FieldValue::Date(date(2024, 1, 5)), FieldValue::Int(10)],
            ),
            Row::new(
                columns,
                vec![FieldValue::Date(date(2024, 3, 5)), FieldValue::Int(5)],
            ),
        ]);
        let fold = GroupedAggregation::sum(GroupBy::Month("AdmissionDate".into()), "AmountPaid");
        let mut acc = Accumulator::new();
        acc.merge(fold.aggregate_batch(&batch).unwrap());

        let monthly = acc.finalize().with_missing_months(BigDecimal::from(0));
        assert_eq!(
            monthly.clone().into_entries(),
            vec![
                ("2024-01-31".to_string(), BigDecimal::from(10)),
                ("2024-02-29".to_string(), BigDecimal::from(0)),
                ("2024-03-31".to_string(), BigDecimal::from(5)),
            ]
        );

        let table = monthly.into_table("AdmissionDate", "AmountPaid", ColumnType::Numeric);
        assert_eq!(table.columns()[0].column_type, ColumnType::Date);
        assert_eq!(table.rows()[1][0], FieldValue::Date(date(2024, 2, 29)));
    }

    #[test]
    fn test_missing_months_leave_text_keys_alone() {
        let mut acc = Accumulator::new();
        acc.merge(partial(&[("A", 1), ("C", 2)]));
        let result = acc.finalize().with_missing_months(BigDecimal::from(0));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_month_bucketing() {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        assert_eq!(month_end(date(2024, 2, 10)), date(2024, 2, 29));
        assert_eq!(month_end(date(2023, 12, 1)), date(2023, 12, 31));
        assert_eq!(month_end(date(2023, 4, 30)), date(2023, 4, 30));

        let columns: Columns = vec!["AdmissionDate".to_string()].into();
        let row = Row::new(columns.clone(), vec![FieldValue::Date(date(2024, 1, 15))]);
        let key = GroupBy::Month("AdmissionDate".into()).key_of(&row).unwrap();
        assert_eq!(key.as_ref().map(GroupKey::label), Some("2024-01-31"));
        assert_eq!(
            key.map(GroupKey::into_value),
            Some(FieldValue::Date(date(2024, 1, 31)))
        );

        let bad = Row::new(columns, vec![FieldValue::Int(3)]);
        assert!(GroupBy::Month("AdmissionDate".into()).key_of(&bad).is_err());
    }

    #[test]
    fn test_ranked_and_top() {
        let mut acc = Accumulator::new();
        acc.merge(partial(&[("A", 1), ("B", 9), ("C", 9), ("D", 4)]));
        let ranked = acc.finalize().ranked().top(3);
        let keys: Vec<&str> = ranked.keys().collect();
        assert_eq!(keys, vec!["B", "C", "D"]);
    }

    #[test]
    fn test_into_table() {
        let mut acc = Accumulator::new();
        acc.merge(partial(&[("A", 1)]));
        let table = acc
            .finalize()
            .into_table("Department", "AmountPaid", ColumnType::Numeric);
        assert_eq!(table.columns().len(), 2);
        assert_eq!(table.rows()[0][0], FieldValue::from("A"));
        assert_eq!(table.rows()[0][1], FieldValue::Decimal(BigDecimal::from(1)));
    }
}
