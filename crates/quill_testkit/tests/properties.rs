//! Property tests over randomly generated data.

use proptest::prelude::*;
use quill_core::{Engine, Index, Record, Table, Transaction, TuningContext, Value};
use quill_testkit::{
    fill_percent_strategy, memory_engine, record_batch_strategy, value_strategy, with_reader,
    with_writer, TempPagedEngine,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn paged_reopen_returns_what_was_committed(
        records in record_batch_strategy(40),
        fill in fill_percent_strategy(),
    ) {
        let fixture = TempPagedEngine::new();
        let tuning = TuningContext::new().with_fill_percent(fill);
        let ids = with_writer(&fixture, |tx| {
            tx.create_table("t")?;
            let table = tx.table("t")?;
            records
                .iter()
                .map(|record| table.insert(record.clone(), &tuning))
                .collect::<Result<Vec<_>, _>>()
        });

        let fixture = fixture.reopen();
        let stored: Vec<(_, Record)> = with_reader(&fixture, |tx| {
            Ok(tx.table("t")?.cursor()?.collect())
        });

        prop_assert_eq!(stored.len(), records.len());
        for ((id, record), (expected_id, expected)) in stored.iter().zip(ids.iter().zip(&records)) {
            prop_assert_eq!(id, expected_id);
            prop_assert_eq!(record, expected);
        }
    }

    #[test]
    fn index_cursor_is_sorted_and_lookup_matches(
        values in prop::collection::vec(value_strategy(), 1..40),
    ) {
        let engine = memory_engine();
        with_writer(&engine, |tx| {
            tx.create_table("t")?;
            let table = tx.table("t")?;
            let index = tx.create_index("t", "v")?;
            for value in &values {
                let id = table.insert(Record::new().with("v", value.clone()), &TuningContext::new())?;
                index.set(value, id, &TuningContext::new())?;
            }
            Ok(())
        });

        with_reader(&engine, |tx| {
            let index = tx.index("t", "v")?;
            let keys: Vec<_> = index
                .cursor()?
                .map(|entry| entry.map(|(value, _)| quill_core::IndexKey::encode(&value)))
                .collect::<Result<_, _>>()?;
            assert!(keys.windows(2).all(|pair| pair[0] <= pair[1]));
            assert_eq!(keys.len(), values.len());

            let table = tx.table("t")?;
            for value in &values {
                for id in index.lookup(value)? {
                    let stored = table.get(id)?;
                    let field = stored.get("v").cloned().unwrap_or(Value::Null);
                    assert_eq!(
                        quill_core::IndexKey::encode(&field),
                        quill_core::IndexKey::encode(value)
                    );
                }
            }
            Ok(())
        });
    }
}

#[test]
fn generic_code_runs_on_any_engine() {
    fn count_tables<E: Engine>(engine: &E, names: &[&str]) -> usize {
        with_reader(engine, |tx| {
            Ok(names.iter().filter(|name| tx.table(name).is_ok()).count())
        })
    }

    let engine = memory_engine();
    with_writer(&engine, |tx| tx.create_table("a"));
    assert_eq!(count_tables(&engine, &["a", "b"]), 1);
}
