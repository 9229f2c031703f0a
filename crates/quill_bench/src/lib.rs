//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use quill_core::{
    CoreResult, Engine, EngineConfig, PagedEngine, Record, RecordId, Table, Transaction,
    TuningContext,
};
use rand::seq::SliceRandom;
use rand::Rng;

/// Page size used by the benchmarks.
pub const BENCH_PAGE_SIZE: usize = 4096;

/// Generates a record with an integer key and a random text payload.
pub fn random_record(key: i64, payload_len: usize) -> Record {
    let mut rng = rand::thread_rng();
    let payload: String = (0..payload_len)
        .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
        .collect();
    Record::new().with("key", key).with("payload", payload)
}

/// Generates `count` keys in ascending order.
pub fn sequential_keys(count: usize) -> Vec<i64> {
    (0..count as i64).collect()
}

/// Generates `count` distinct keys in random order.
pub fn shuffled_keys(count: usize) -> Vec<i64> {
    let mut keys = sequential_keys(count);
    keys.shuffle(&mut rand::thread_rng());
    keys
}

/// Opens a paged engine over an in-memory page store without fsync.
pub fn paged_engine() -> PagedEngine {
    let config = EngineConfig::new()
        .page_size(BENCH_PAGE_SIZE)
        .sync_on_commit(false);
    PagedEngine::in_memory(config).expect("Failed to open paged engine")
}

/// Inserts one record per key into `table`, `batch` records per commit.
pub fn load<E: Engine>(
    engine: &E,
    table: &str,
    keys: &[i64],
    batch: usize,
    tuning: &TuningContext,
) -> CoreResult<Vec<RecordId>> {
    {
        let mut tx = engine.begin(true)?;
        if tx.table(table).is_err() {
            tx.create_table(table)?;
        }
        tx.commit()?;
    }

    let mut ids = Vec::with_capacity(keys.len());
    for chunk in keys.chunks(batch.max(1)) {
        let mut tx = engine.begin(true)?;
        {
            let handle = tx.table(table)?;
            for &key in chunk {
                ids.push(handle.insert(random_record(key, 64), tuning)?);
            }
        }
        tx.commit()?;
    }
    Ok(ids)
}
