//! Streaming behaviour of the chunked aggregator: batch boundaries,
//! chunk-size independence and abort-clean failure handling.

mod common;

use bigdecimal::BigDecimal;
use common::*;
use hospital_analytics::aggregation::{
    ChunkedAggregator, FieldValue, GroupBy, GroupedAggregation, NullKeyPolicy, RunStats, Sum,
};
use hospital_analytics::error::{AggregationError, SourceError};
use hospital_analytics::source::MemorySource;
use hospital_analytics::test_utils::generated_department_rows;
use std::sync::atomic::Ordering;

fn department_sum() -> GroupedAggregation<Sum> {
    GroupedAggregation::sum(GroupBy::Column("Department".into()), "AmountPaid")
}

fn source(rows: Vec<Vec<FieldValue>>) -> MemorySource {
    MemorySource::new(department_columns(), rows)
}

#[tokio::test]
async fn test_2500_rows_in_batches_of_1000() {
    let mut memory = source(generated_department_rows(2500, &["A", "B"]));
    let outcome = ChunkedAggregator::new(1000)
        .unwrap()
        .run(&mut memory, &BatchLengths)
        .await
        .unwrap();

    assert_eq!(outcome.result, vec![1000, 1000, 500]);
    assert_eq!(
        outcome.stats,
        RunStats {
            fetch_calls: 4,
            batches: 3,
            rows: 2500
        }
    );
    assert_eq!(memory.fetch_calls(), 4);
    assert!(memory.is_released());
}

#[tokio::test]
async fn test_totals_match_row_level_sums() {
    let rows = generated_department_rows(2500, &["A", "B", "C"]);
    let mut expected_a = 0i64;
    for (i, row) in rows.iter().enumerate() {
        if i % 3 == 0 {
            if let FieldValue::Int(amount) = row[1] {
                expected_a += amount;
            }
        }
    }

    let outcome = ChunkedAggregator::new(1000)
        .unwrap()
        .run(source(rows), &department_sum())
        .await
        .unwrap();

    assert_eq!(outcome.result.len(), 3);
    assert_eq!(outcome.result.get("A"), Some(&BigDecimal::from(expected_a)));
    let total: BigDecimal = outcome.result.entries().map(|(_, v)| v.clone()).sum();
    // 25 full cycles of 0..100
    assert_eq!(total, BigDecimal::from(25 * 4950));
}

#[tokio::test]
async fn test_empty_stream_yields_empty_result() {
    let mut memory = source(Vec::new());
    let outcome = ChunkedAggregator::default()
        .run(&mut memory, &department_sum())
        .await
        .unwrap();

    assert!(outcome.result.is_empty());
    assert_eq!(
        outcome.stats,
        RunStats {
            fetch_calls: 1,
            batches: 0,
            rows: 0
        }
    );
    assert!(memory.is_released());
}

#[tokio::test]
async fn test_result_is_independent_of_batch_size() {
    let rows = generated_department_rows(2500, &["Cardiology", "Neurology", "Oncology"]);
    let mut results = Vec::new();
    for batch_size in [1, 7, 1000, 10_000] {
        let outcome = ChunkedAggregator::new(batch_size)
            .unwrap()
            .run(source(rows.clone()), &department_sum())
            .await
            .unwrap();
        results.push(outcome.result);
    }

    for result in &results[1..] {
        assert_eq!(result, &results[0]);
    }
}

#[tokio::test]
async fn test_failure_on_second_batch_discards_result() {
    let failing = FailingSource::new(source(generated_department_rows(2500, &["A"])), 2);
    let released = failing.release_flag();

    let result = ChunkedAggregator::new(1000)
        .unwrap()
        .run(failing, &department_sum())
        .await;

    assert!(matches!(
        result,
        Err(AggregationError::Source(SourceError::Fetch { .. }))
    ));
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_release_failure_after_success_is_reported() {
    let failing = FailingSource::failing_release(source(generated_department_rows(10, &["A"])));
    let released = failing.release_flag();

    let result = ChunkedAggregator::new(4)
        .unwrap()
        .run(failing, &department_sum())
        .await;

    assert!(matches!(
        result,
        Err(AggregationError::Source(SourceError::Release { .. }))
    ));
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_fetch_error_wins_over_release_error() {
    let failing = FailingSource::new(source(generated_department_rows(10, &["A"])), 2)
        .with_failing_release();
    let released = failing.release_flag();

    let result = ChunkedAggregator::new(4)
        .unwrap()
        .run(failing, &department_sum())
        .await;

    assert!(matches!(
        result,
        Err(AggregationError::Source(SourceError::Fetch { .. }))
    ));
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_source_returning_too_many_rows_is_rejected() {
    let mut overfetching = OverfetchingSource::default();
    let result = ChunkedAggregator::new(5)
        .unwrap()
        .run(&mut overfetching, &department_sum())
        .await;

    assert!(matches!(
        result,
        Err(AggregationError::Source(SourceError::Overfetch {
            requested: 5,
            returned: 6
        }))
    ));
    assert!(overfetching.released);
}

#[tokio::test]
async fn test_null_keys_skipped_or_rejected() {
    let mut rows = generated_department_rows(20, &["A"]);
    rows[13][0] = FieldValue::Null;

    let rejected = ChunkedAggregator::new(5)
        .unwrap()
        .run(
            source(rows.clone()),
            &department_sum().with_null_keys(NullKeyPolicy::Reject),
        )
        .await;
    assert!(matches!(
        rejected,
        Err(AggregationError::MalformedRow { ref column, .. }) if column == "Department"
    ));

    let skipped = ChunkedAggregator::new(5)
        .unwrap()
        .run(source(rows), &department_sum())
        .await
        .unwrap();
    // Row 13 carried amount 13
    assert_eq!(skipped.result.get("A"), Some(&BigDecimal::from(190 - 13)));
    assert_eq!(skipped.stats.rows, 20);
}

#[tokio::test]
async fn test_month_grouping_across_batches() {
    let date = |m, d| FieldValue::Date(chrono::NaiveDate::from_ymd_opt(2024, m, d).unwrap());
    let rows = vec![
        vec![date(1, 3), FieldValue::Int(10)],
        vec![date(2, 29), FieldValue::Int(5)],
        vec![date(1, 31), FieldValue::Int(7)],
        vec![FieldValue::from("2024-02-01"), FieldValue::Int(1)],
    ];
    let fold = GroupedAggregation::sum(GroupBy::Month("AdmissionDate".into()), "AmountPaid");
    let outcome = ChunkedAggregator::new(3)
        .unwrap()
        .run(
            MemorySource::new(
                vec!["AdmissionDate".to_string(), "AmountPaid".to_string()],
                rows,
            ),
            &fold,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome.result.into_entries(),
        vec![
            ("2024-01-31".to_string(), BigDecimal::from(17)),
            ("2024-02-29".to_string(), BigDecimal::from(6)),
        ]
    );
}
