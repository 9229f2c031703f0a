//! Property-based test generators using proptest.
//!
//! Provides strategies for generating names, values and records.

use proptest::prelude::*;
use quill_core::{Record, Value};

/// Strategy for generating valid table names.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for generating field names from a small alphabet, so records
/// generated together share fields.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "name", "age"]).prop_map(str::to_owned)
}

/// Strategy for generating any [`Value`].
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        any::<f64>().prop_map(Value::Float),
        ".{0,24}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
    ]
}

/// Strategy for generating [`Value`]s that compare equal to themselves.
pub fn comparable_value_strategy() -> impl Strategy<Value = Value> {
    value_strategy().prop_filter("NaN never equals itself", |value| {
        !matches!(value, Value::Float(f) if f.is_nan())
    })
}

/// Strategy for generating records with up to five fields.
pub fn record_strategy() -> impl Strategy<Value = Record> {
    prop::collection::btree_map(field_name_strategy(), comparable_value_strategy(), 0..5)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Strategy for generating fill-percent hints in `(0, 1]`.
pub fn fill_percent_strategy() -> impl Strategy<Value = f64> {
    (1u32..=100).prop_map(|percent| f64::from(percent) / 100.0)
}

/// Strategy for generating a batch of records.
pub fn record_batch_strategy(max: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(record_strategy(), 0..max)
}
