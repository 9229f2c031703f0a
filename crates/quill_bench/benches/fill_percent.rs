//! Effect of the fill-percent hint on paged commits.
//!
//! Besides timing, each configuration prints the leaf pages it ended up
//! using, which is what the hint trades against rewrite cost.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use quill_bench::{load, paged_engine, sequential_keys, shuffled_keys};
use quill_core::{Engine, Table, Transaction, TuningContext};
use rand::Rng;

const ROWS: usize = 2_000;
const BATCH: usize = 100;
const FILLS: [f64; 4] = [0.3, 0.5, 0.8, 1.0];

/// Benchmark sequential (append-only) loads at several fill ratios.
fn bench_sequential_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_load");
    group.sample_size(10);
    group.throughput(Throughput::Elements(ROWS as u64));
    let keys = sequential_keys(ROWS);

    for fill in FILLS {
        let tuning = TuningContext::new().with_fill_percent(fill);
        group.bench_with_input(BenchmarkId::from_parameter(fill), &tuning, |b, tuning| {
            b.iter(|| {
                let engine = paged_engine();
                let ids = load(&engine, "t", black_box(&keys), BATCH, tuning).unwrap();
                black_box(ids);
            });
        });

        let engine = paged_engine();
        load(&engine, "t", &keys, BATCH, &tuning).unwrap();
        if let Some(pages) = engine.stats().pages {
            println!("fill {fill}: {} leaf pages", pages.leaf_pages);
        }
    }

    group.finish();
}

/// Benchmark random inserts and deletes against a preloaded table.
fn bench_random_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_churn");
    group.sample_size(10);
    let keys = shuffled_keys(ROWS);

    for fill in FILLS {
        let tuning = TuningContext::new().with_fill_percent(fill);
        group.bench_with_input(BenchmarkId::from_parameter(fill), &tuning, |b, tuning| {
            let engine = paged_engine();
            let mut live = load(&engine, "t", &keys, BATCH, tuning).unwrap();
            let mut rng = rand::thread_rng();

            b.iter(|| {
                let mut tx = engine.begin(true).unwrap();
                {
                    let table = tx.table("t").unwrap();
                    for _ in 0..10 {
                        if !live.is_empty() {
                            let victim = live.swap_remove(rng.gen_range(0..live.len()));
                            table.delete(victim).unwrap();
                        }
                        let id = table
                            .insert(quill_bench::random_record(rng.gen(), 64), tuning)
                            .unwrap();
                        live.push(id);
                    }
                }
                tx.commit().unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sequential_load, bench_random_churn);
criterion_main!(benches);
