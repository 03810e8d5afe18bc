//! Benchmarks for combination enumeration, uniqueness evaluation and full searches.

use arrow::array::{ArrayRef, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use eda_keys::config::{SearchConfig, TierSizes};
use eda_keys::metadata::{ColumnProfile, InMemoryMetadataStore, TableRef};
use eda_keys::sampling::{InMemorySampleProvider, Sample, SampleTier};
use eda_keys::search::{
    ColumnSet, CombinationEnumerator, NoopReporter, ProgressiveKeySearch, UniquenessEvaluator,
};

/// `id` is unique, `c1..` cycle with growing periods.
fn wide_batch(rows: i64, columns: usize) -> RecordBatch {
    let mut fields = vec![Field::new("id", DataType::Int64, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(Int64Array::from_iter_values(0..rows))];
    for c in 1..columns {
        let period = 7 * c as i64;
        fields.push(Field::new(format!("c{c}"), DataType::Int64, false));
        arrays.push(Arc::new(Int64Array::from_iter_values((0..rows).map(|i| i % period))));
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
}

fn bench_enumeration(c: &mut Criterion) {
    let mut group = c.benchmark_group("combination_enumeration");

    for m in [10, 20, 40] {
        let columns: Vec<String> = (0..m).map(|i| format!("c{i}")).collect();
        let enumerator = CombinationEnumerator::new(columns);
        for k in [2, 3] {
            group.throughput(Throughput::Elements(enumerator.count(k)));
            group.bench_with_input(
                BenchmarkId::from_parameter(format!("m{m}_k{k}")),
                &k,
                |b, &k| b.iter(|| enumerator.combinations(black_box(k)).count()),
            );
        }
    }

    group.finish();
}

fn bench_uniqueness(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let evaluator = UniquenessEvaluator::new().unwrap();

    let mut group = c.benchmark_group("uniqueness_evaluation");
    group.measurement_time(Duration::from_secs(10));

    for rows in [10_000i64, 100_000] {
        let batch = wide_batch(rows, 4);
        let sample = Sample::try_new(
            SampleTier::Small,
            TableRef::bare("bench"),
            batch.schema(),
            vec![batch],
            rows as usize,
        )
        .unwrap();

        group.throughput(Throughput::Elements(rows as u64));
        for (name, set) in [
            ("single", ColumnSet::new(["id"])),
            ("triple", ColumnSet::new(["c1", "c2", "c3"])),
        ] {
            group.bench_with_input(BenchmarkId::new(name, rows), &set, |b, set| {
                b.iter(|| rt.block_on(evaluator.evaluate(black_box(&sample), set)).unwrap());
            });
        }
    }

    group.finish();
}

fn bench_full_search(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let table = TableRef::bare("bench");
    let columns = 8;

    let store = InMemoryMetadataStore::new();
    let samples = InMemorySampleProvider::new();
    rt.block_on(async {
        let mut names = vec!["id".to_string()];
        names.extend((1..columns).map(|c| format!("c{c}")));
        let profiles = names
            .iter()
            .enumerate()
            .map(|(i, n)| ColumnProfile::new(table.clone(), n.as_str(), i as i64, "bigint", 100, 0))
            .collect();
        store.replace_profiles(&table, profiles).await.unwrap();
        samples.insert(table.clone(), vec![wide_batch(50_000, columns)]).await;
    });

    let mut group = c.benchmark_group("progressive_search");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(20));

    for concurrency in [1, 4] {
        let config = SearchConfig::default()
            .with_tiers(TierSizes::new(1_000, 10_000, 50_000))
            .with_max_columns(2)
            .with_concurrency(concurrency);
        let search = ProgressiveKeySearch::new(config, store.clone(), samples.clone())
            .unwrap()
            .with_reporter(Arc::new(NoopReporter));

        group.bench_with_input(
            BenchmarkId::new("concurrency", concurrency),
            &concurrency,
            |b, _| b.iter(|| rt.block_on(search.run(black_box(&table)))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_enumeration, bench_uniqueness, bench_full_search);
criterion_main!(benches);
