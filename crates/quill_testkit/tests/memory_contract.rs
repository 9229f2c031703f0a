//! Contract conformance for the in-memory engine.

use quill_core::{Engine, MemoryEngine, Record, Table, Transaction, TuningContext};
use quill_testkit::{fail_fast_config, memory_engine, with_reader, with_writer};

quill_testkit::contract_tests!(quill_testkit::memory_engine);

mod fail_fast {
    quill_testkit::contract_tests!(|| quill_core::MemoryEngine::new(
        quill_testkit::fail_fast_config()
    ));
}

#[test]
fn run_all_passes_for_default_config() {
    quill_testkit::contract::run_all(MemoryEngine::default);
}

#[test]
fn state_is_lost_with_the_engine() {
    let engine = memory_engine();
    with_writer(&engine, |tx| tx.create_table("t"));
    engine.close().unwrap();
    drop(engine);

    let engine = MemoryEngine::new(fail_fast_config());
    let found = with_reader(&engine, |tx| Ok(tx.table("t").is_ok()));
    assert!(!found);
}

#[test]
fn stats_track_activity() {
    let engine = memory_engine();
    with_writer(&engine, |tx| {
        tx.create_table("t")?;
        tx.create_index("t", "f")?;
        tx.table("t")?.insert(Record::new(), &TuningContext::new())?;
        Ok(())
    });

    let reader = engine.begin(false).unwrap();
    let stats = engine.stats();
    assert_eq!(stats.tables, 1);
    assert_eq!(stats.indexes, 1);
    assert_eq!(stats.active_readers, 1);
    assert!(!stats.writer_active);
    assert!(stats.pages.is_none());
    drop(reader);

    assert_eq!(engine.stats().active_readers, 0);
}
