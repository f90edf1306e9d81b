use hospital_analytics::aggregation::FieldValue;
use proptest::prelude::*;

pub const DEPARTMENTS: [&str; 5] = [
    "Cardiology",
    "Neurology",
    "Orthopedics",
    "Oncology",
    "Pediatrics",
];

/// (department index, amount in cents) pairs; amounts may be null
pub fn visit_strategy() -> impl Strategy<Value = (usize, Option<i64>)> {
    (0..DEPARTMENTS.len(), prop::option::weighted(0.9, 0i64..1_000_000))
}

pub fn visits_strategy() -> impl Strategy<Value = Vec<(usize, Option<i64>)>> {
    prop::collection::vec(visit_strategy(), 0..300)
}

pub fn batch_size_strategy() -> impl Strategy<Value = usize> {
    prop_oneof![1usize..10, 10usize..100, Just(1000)]
}

/// Rows of (Department, AmountPaid) with amounts as two-decimal values
pub fn to_rows(visits: &[(usize, Option<i64>)]) -> Vec<Vec<FieldValue>> {
    visits
        .iter()
        .map(|(department, cents)| {
            vec![
                DEPARTMENTS[*department].into(),
                cents.map_or(FieldValue::Null, |c| {
                    FieldValue::Decimal(bigdecimal::BigDecimal::new(c.into(), 2))
                }),
            ]
        })
        .collect()
}

pub fn department_columns() -> Vec<String> {
    vec!["Department".to_string(), "AmountPaid".to_string()]
}
