//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use eda_keys::logging::setup::{init_logging, LoggingConfig};
use eda_keys::metadata::{ColumnProfile, InMemoryMetadataStore, TableRef};
use eda_keys::sampling::InMemorySampleProvider;

/// Row of `people` whose email repeats the one of the row before it.
pub const DUPLICATE_EMAIL_ROW: i64 = 5_000;

pub fn people() -> TableRef {
    TableRef::new("srv", "crm", "dbo", "people")
}

pub fn pairs() -> TableRef {
    TableRef::new("srv", "crm", "dbo", "pairs")
}

/// `n` people: `id` is unique, `country` takes two values, and `email` is
/// unique except that [`DUPLICATE_EMAIL_ROW`] repeats the previous row's
/// email and country.
pub fn people_batch(n: i64) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("email", DataType::Utf8, false),
        Field::new("country", DataType::Utf8, false),
    ]));
    let person = |i: i64| if i == DUPLICATE_EMAIL_ROW { i - 1 } else { i };
    let emails: Vec<String> = (0..n)
        .map(|i| format!("user{}@example.com", person(i)))
        .collect();
    let countries: Vec<&str> = (0..n)
        .map(|i| if person(i) % 2 == 0 { "NL" } else { "BE" })
        .collect();
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from_iter_values(0..n)),
            Arc::new(StringArray::from(emails)),
            Arc::new(StringArray::from(countries)),
        ],
    )
    .unwrap()
}

/// `n` rows where only the combination `(bucket, parity)` is unique.
pub fn pairs_batch(n: i64) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("bucket", DataType::Int64, false),
        Field::new("parity", DataType::Int64, false),
    ]));
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from_iter_values((0..n).map(|i| i / 2))),
            Arc::new(Int64Array::from_iter_values((0..n).map(|i| i % 2))),
        ],
    )
    .unwrap()
}

/// Profiles marking every listed column as eligible.
pub fn eligible_profiles(table: &TableRef, columns: &[&str]) -> Vec<ColumnProfile> {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            ColumnProfile::new(table.clone(), *column, i as i64 + 1, "varchar", 1_000, 0)
        })
        .collect()
}

pub async fn metadata_store(table: &TableRef, columns: &[&str]) -> InMemoryMetadataStore {
    let store = InMemoryMetadataStore::new();
    store
        .replace_profiles(table, eligible_profiles(table, columns))
        .await
        .unwrap();
    store
}

pub async fn sample_provider(table: &TableRef, batch: RecordBatch) -> InMemorySampleProvider {
    let provider = InMemorySampleProvider::new();
    provider.insert(table.clone(), vec![batch]).await;
    provider
}

pub fn init_test_logging() {
    let config = LoggingConfig::development()
        .with_env_filter("eda_keys=debug")
        .with_test_writer(true);
    // Only the first test in a binary installs the subscriber
    let _ = init_logging(config);
}
