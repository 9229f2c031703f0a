//! Backend-agnostic conformance checks.
//!
//! Every check takes a freshly opened engine and panics on the first
//! violation. [`run_all`] runs them in sequence; the
//! [`contract_tests!`](crate::contract_tests) macro turns each into its own
//! `#[test]`.

use quill_core::{
    CoreError, CoreResult, Engine, ErrorKind, Index, Record, RecordId, Table, Transaction,
    TuningContext, Value,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Runs every check, each against a fresh engine from `factory`.
pub fn run_all<E: Engine, F: FnMut() -> E>(mut factory: F) {
    terminal_transactions_reject_calls(&factory());
    at_most_one_writer(&factory());
    create_then_lookup_in_same_transaction(&factory());
    duplicate_table_is_rejected(&factory());
    index_on_missing_table_is_rejected(&factory());
    read_only_transactions_cannot_write(&factory());
    fill_percent_hint_is_accepted(&factory());
    users_scenario(&factory());
    snapshot_scenario(&factory());
    close_with_open_transaction(&factory());
    rollback_is_invisible(&factory());
    indexes_follow_snapshot(&factory());
    table_iteration_is_stable(&factory());
    index_iterates_in_key_order(&factory());
    drop_table_removes_indexes(&factory());
    record_ids_are_not_reused(&factory());
}

fn begin<E: Engine>(engine: &E, writable: bool) -> E::Transaction {
    engine.begin(writable).expect("begin failed")
}

fn expect_err<T>(result: CoreResult<T>, what: &str) -> CoreError {
    match result {
        Ok(_) => panic!("{what}: expected an error, got Ok"),
        Err(err) => err,
    }
}

fn assert_kind<T>(result: CoreResult<T>, kind: ErrorKind, what: &str) {
    let err = expect_err(result, what);
    assert_eq!(err.kind(), kind, "{what}: unexpected error {err}");
}

/// Commits a writer that creates `tables`.
fn setup_tables<E: Engine>(engine: &E, tables: &[&str]) {
    let mut tx = begin(engine, true);
    for table in tables {
        tx.create_table(table).expect("create_table failed");
    }
    tx.commit().expect("commit failed");
}

/// After commit or rollback, every call fails with `ClosedResource`.
pub fn terminal_transactions_reject_calls<E: Engine>(engine: &E) {
    setup_tables(engine, &["t"]);

    for writable in [false, true] {
        for commit in [false, true] {
            let mut tx = begin(engine, writable);
            if commit {
                tx.commit().expect("commit failed");
            } else {
                tx.rollback().expect("rollback failed");
            }

            let closed = ErrorKind::ClosedResource;
            assert_kind(tx.commit(), closed, "commit");
            assert_kind(tx.rollback(), closed, "rollback");
            assert_kind(tx.table("t"), closed, "table");
            assert_kind(tx.create_table("u"), closed, "create_table");
            assert_kind(tx.drop_table("t"), closed, "drop_table");
            assert_kind(tx.index("t", "f"), closed, "index");
            assert_kind(tx.indexes("t"), closed, "indexes");
            assert_kind(tx.create_index("t", "f"), closed, "create_index");
            assert_kind(tx.drop_index("t", "f"), closed, "drop_index");
        }
    }
}

/// No two writable transactions are ever active at once.
pub fn at_most_one_writer<E: Engine>(engine: &E) {
    const THREADS: usize = 4;
    const COMMITS: usize = 10;

    setup_tables(engine, &["w"]);
    let active = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);

    thread::scope(|scope| {
        for worker in 0..THREADS {
            let (active, peak) = (&active, &peak);
            scope.spawn(move || {
                let mut done = 0;
                while done < COMMITS {
                    let mut tx = match engine.begin(true) {
                        Ok(tx) => tx,
                        Err(CoreError::WriterConflict) => {
                            thread::yield_now();
                            continue;
                        }
                        Err(err) => panic!("begin failed: {err}"),
                    };

                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tx.table("w")
                        .expect("table failed")
                        .insert(
                            Record::new().with("worker", worker as i64),
                            &TuningContext::new(),
                        )
                        .expect("insert failed");
                    thread::sleep(Duration::from_micros(200));
                    active.fetch_sub(1, Ordering::SeqCst);

                    tx.commit().expect("commit failed");
                    done += 1;
                }
            });
        }
    });

    assert_eq!(peak.load(Ordering::SeqCst), 1, "writers overlapped");

    let tx = begin(engine, false);
    let count = tx.table("w").expect("table failed").len().expect("len failed");
    assert_eq!(count, THREADS * COMMITS);
}

/// A table created in a transaction is visible to that transaction.
pub fn create_then_lookup_in_same_transaction<E: Engine>(engine: &E) {
    let mut tx = begin(engine, true);
    tx.create_table("t").expect("create_table failed");

    let id = {
        let first = tx.table("t").expect("table failed");
        assert_eq!(first.name(), "t");
        let id = first
            .insert(Record::new().with("k", "v"), &TuningContext::new())
            .expect("insert failed");
        id
    };

    let second = tx.table("t").expect("table failed");
    assert_eq!(
        second.get(id).expect("get failed").get("k"),
        Some(&Value::from("v"))
    );
    drop(second);
    tx.commit().expect("commit failed");
}

/// Creating a taken table name fails with `TableAlreadyExists`.
pub fn duplicate_table_is_rejected<E: Engine>(engine: &E) {
    let mut tx = begin(engine, true);
    tx.create_table("t").expect("create_table failed");
    assert!(matches!(
        tx.create_table("t"),
        Err(CoreError::TableAlreadyExists { .. })
    ));
    tx.commit().expect("commit failed");

    let mut tx = begin(engine, true);
    assert!(matches!(
        tx.create_table("t"),
        Err(CoreError::TableAlreadyExists { .. })
    ));
    assert!(tx.create_table("T").is_ok(), "names are case-sensitive");
    tx.rollback().expect("rollback failed");
}

/// Indexing a missing table fails with `TableNotFound`.
pub fn index_on_missing_table_is_rejected<E: Engine>(engine: &E) {
    let mut tx = begin(engine, true);
    let err = expect_err(tx.create_index("missing_table", "f"), "create_index");
    assert!(matches!(err, CoreError::TableNotFound { .. }), "got {err}");
    tx.rollback().expect("rollback failed");
}

/// Read-only transactions reject every write and allow every lookup.
pub fn read_only_transactions_cannot_write<E: Engine>(engine: &E) {
    let id = {
        let mut tx = begin(engine, true);
        tx.create_table("t").expect("create_table failed");
        tx.create_index("t", "f").expect("create_index failed");
        let id = tx
            .table("t")
            .expect("table failed")
            .insert(Record::new().with("f", 1), &TuningContext::new())
            .expect("insert failed");
        tx.commit().expect("commit failed");
        id
    };

    let mut tx = begin(engine, false);
    assert!(!tx.is_writable());
    let read_only = ErrorKind::ReadOnlyViolation;
    let tuning = TuningContext::new();

    assert_kind(tx.create_table("u"), read_only, "create_table");
    assert_kind(tx.create_index("t", "g"), read_only, "create_index");
    assert_kind(tx.drop_table("t"), read_only, "drop_table");
    assert_kind(tx.drop_index("t", "f"), read_only, "drop_index");

    {
        let table = tx.table("t").expect("table lookup must succeed");
        assert_kind(table.insert(Record::new(), &tuning), read_only, "insert");
        assert_kind(table.replace(id, Record::new(), &tuning), read_only, "replace");
        assert_kind(table.delete(id), read_only, "delete");
        assert_eq!(table.len().expect("len failed"), 1);

        let index = tx.index("t", "f").expect("index lookup must succeed");
        assert_kind(index.set(&Value::Integer(2), id, &tuning), read_only, "set");
        assert_kind(index.delete(&Value::Integer(1), id), read_only, "index delete");

        let indexes = tx.indexes("t").expect("indexes lookup must succeed");
        assert_eq!(indexes.len(), 1);
    }

    tx.commit().expect("read-only commit failed");
}

/// Hints derive without mutation and writes accept any hint.
pub fn fill_percent_hint_is_accepted<E: Engine>(engine: &E) {
    let base = TuningContext::new();
    let packed = base.with_fill_percent(0.9);
    assert_eq!(base.fill_percent(), None);
    assert_eq!(packed.fill_percent(), Some(0.9));
    assert_eq!(packed.with_fill_percent(0.6).fill_percent(), Some(0.6));

    let mut tx = begin(engine, true);
    tx.create_table("t").expect("create_table failed");
    {
        let table = tx.table("t").expect("table failed");
        for (n, fill) in [0.9, 1.0, 0.1, 5.0, 0.0, f64::NAN].into_iter().enumerate() {
            let tuning = base.with_fill_percent(fill);
            table
                .insert(Record::new().with("n", n as i64), &tuning)
                .expect("insert with hint failed");
        }
        let id = table
            .insert(Record::new(), &base)
            .expect("insert without hint failed");
        table
            .replace(id, Record::new().with("n", -1), &packed)
            .expect("replace with hint failed");

        let index = tx.create_index("t", "n").expect("create_index failed");
        index
            .set(&Value::Integer(-1), id, &packed)
            .expect("set with hint failed");
    }
    tx.commit().expect("commit failed");

    let tx = begin(engine, false);
    assert_eq!(tx.table("t").expect("table failed").len().expect("len failed"), 7);
}

/// Create, fail on duplicate, commit.
pub fn users_scenario<E: Engine>(engine: &E) {
    let mut tx1 = begin(engine, true);
    tx1.create_table("users").expect("create_table failed");
    assert!(matches!(
        tx1.create_table("users"),
        Err(CoreError::TableAlreadyExists { .. })
    ));
    tx1.commit().expect("commit failed");
}

/// A reader begun before a commit never sees it; one begun after does.
pub fn snapshot_scenario<E: Engine>(engine: &E) {
    let mut tx1 = begin(engine, true);
    let tx3 = begin(engine, false);

    tx1.create_table("users").expect("create_table failed");
    tx1.commit().expect("commit failed");

    let tx2 = begin(engine, false);
    assert!(tx2.table("users").is_ok(), "later reader must see users");
    assert!(
        matches!(tx3.table("users"), Err(CoreError::TableNotFound { .. })),
        "earlier reader must not see users"
    );
}

/// Close fails while anything is open and succeeds once it is not.
pub fn close_with_open_transaction<E: Engine>(engine: &E) {
    for writable in [false, true] {
        let mut tx = begin(engine, writable);
        let err = expect_err(engine.close(), "close with open transaction");
        assert!(matches!(err, CoreError::LeakedTransaction { .. }), "got {err}");
        tx.rollback().expect("rollback failed");
    }

    engine.close().expect("close failed");
    engine.close().expect("second close must be a no-op");
    assert!(matches!(engine.begin(false), Err(CoreError::EngineClosed)));
    assert!(matches!(engine.begin(true), Err(CoreError::EngineClosed)));
}

/// A rolled-back writer leaves no trace for any reader.
pub fn rollback_is_invisible<E: Engine>(engine: &E) {
    setup_tables(engine, &["t"]);
    let before = begin(engine, false);

    let mut tx = begin(engine, true);
    tx.create_table("u").expect("create_table failed");
    tx.table("t")
        .expect("table failed")
        .insert(Record::new().with("x", 1), &TuningContext::new())
        .expect("insert failed");
    tx.rollback().expect("rollback failed");

    let after = begin(engine, false);
    for reader in [&before, &after] {
        assert!(reader.table("u").is_err());
        let table = reader.table("t").expect("table failed");
        assert!(table.is_empty().expect("is_empty failed"));
    }
}

/// `indexes` lists exactly the indexes of the transaction's snapshot.
pub fn indexes_follow_snapshot<E: Engine>(engine: &E) {
    let mut tx = begin(engine, true);
    tx.create_table("t").expect("create_table failed");
    tx.create_table("other").expect("create_table failed");
    tx.create_index("t", "a").expect("create_index failed");
    tx.create_index("t", "b").expect("create_index failed");
    tx.create_index("other", "z").expect("create_index failed");
    assert!(matches!(
        tx.create_index("t", "a"),
        Err(CoreError::IndexAlreadyExists { .. })
    ));
    tx.commit().expect("commit failed");

    let reader = begin(engine, false);

    let mut tx = begin(engine, true);
    tx.create_index("t", "c").expect("create_index failed");
    tx.commit().expect("commit failed");

    let indexes = reader.indexes("t").expect("indexes failed");
    let names: BTreeSet<_> = indexes.keys().map(String::as_str).collect();
    assert_eq!(names, BTreeSet::from(["a", "b"]));
    for (name, index) in &indexes {
        assert_eq!(index.name(), name.as_str());
        assert_eq!(index.table(), "t");
        assert_eq!(&index.field().expect("field failed"), name);
    }

    assert!(matches!(
        reader.indexes("missing"),
        Err(CoreError::TableNotFound { .. })
    ));
    assert!(matches!(
        reader.index("t", "c"),
        Err(CoreError::IndexNotFound { .. })
    ));

    let latest = begin(engine, false);
    assert_eq!(latest.indexes("t").expect("indexes failed").len(), 3);
}

/// Iteration is restartable and unaffected by later commits.
pub fn table_iteration_is_stable<E: Engine>(engine: &E) {
    let mut tx = begin(engine, true);
    tx.create_table("t").expect("create_table failed");
    {
        let table = tx.table("t").expect("table failed");
        for n in 0..5 {
            table
                .insert(Record::new().with("n", n), &TuningContext::new())
                .expect("insert failed");
        }
    }
    tx.commit().expect("commit failed");

    let reader = begin(engine, false);
    let table = reader.table("t").expect("table failed");
    let first: Vec<RecordId> = table.cursor().expect("cursor failed").map(|(id, _)| id).collect();
    assert_eq!(first.len(), 5);

    let mut tx = begin(engine, true);
    tx.table("t")
        .expect("table failed")
        .insert(Record::new().with("n", 5), &TuningContext::new())
        .expect("insert failed");
    tx.commit().expect("commit failed");

    let again: Vec<RecordId> = table.cursor().expect("cursor failed").map(|(id, _)| id).collect();
    assert_eq!(first, again);
}

/// Index entries come back in value order and lookups find their ids.
pub fn index_iterates_in_key_order<E: Engine>(engine: &E) {
    let mut tx = begin(engine, true);
    tx.create_table("people").expect("create_table failed");
    let ages = [41, 7, 36, 7, -3];
    {
        let people = tx.table("people").expect("table failed");
        let by_age = tx.create_index("people", "age").expect("create_index failed");
        for age in ages {
            let id = people
                .insert(Record::new().with("age", age), &TuningContext::new())
                .expect("insert failed");
            by_age
                .set(&Value::Integer(age.into()), id, &TuningContext::new())
                .expect("set failed");
        }
    }
    tx.commit().expect("commit failed");

    let reader = begin(engine, false);
    let by_age = reader.index("people", "age").expect("index failed");
    assert_eq!(by_age.len().expect("len failed"), ages.len());

    let values: Vec<Value> = by_age
        .cursor()
        .expect("cursor failed")
        .map(|entry| entry.expect("bad index entry").0)
        .collect();
    let mut sorted: Vec<i64> = ages.iter().map(|&a| i64::from(a)).collect();
    sorted.sort_unstable();
    assert_eq!(values, sorted.into_iter().map(Value::Integer).collect::<Vec<_>>());

    let sevens = by_age.lookup(&Value::Integer(7)).expect("lookup failed");
    assert_eq!(sevens.len(), 2);
    let people = reader.table("people").expect("table failed");
    for id in sevens {
        let record = people.get(id).expect("indexed record missing");
        assert_eq!(record.get("age"), Some(&Value::Integer(7)));
    }
    assert!(by_age.lookup(&Value::Integer(8)).expect("lookup failed").is_empty());
}

/// Dropping a table drops its indexes; the name becomes free again.
pub fn drop_table_removes_indexes<E: Engine>(engine: &E) {
    let mut tx = begin(engine, true);
    tx.create_table("t").expect("create_table failed");
    tx.create_index("t", "f").expect("create_index failed");
    tx.commit().expect("commit failed");

    let mut tx = begin(engine, true);
    tx.drop_table("t").expect("drop_table failed");
    assert!(matches!(tx.drop_table("t"), Err(CoreError::TableNotFound { .. })));
    assert!(matches!(
        tx.drop_index("t", "f"),
        Err(CoreError::IndexNotFound { .. })
    ));
    tx.create_table("t").expect("recreate failed");
    assert!(tx.indexes("t").expect("indexes failed").is_empty());
    tx.commit().expect("commit failed");

    let reader = begin(engine, false);
    assert!(reader.index("t", "f").is_err());
}

/// Record ids grow and deleted ids are never handed out again.
pub fn record_ids_are_not_reused<E: Engine>(engine: &E) {
    setup_tables(engine, &["t"]);
    let tuning = TuningContext::new();

    let mut tx = begin(engine, true);
    let last = {
        let table = tx.table("t").expect("table failed");
        let a = table.insert(Record::new(), &tuning).expect("insert failed");
        let b = table.insert(Record::new(), &tuning).expect("insert failed");
        assert!(b > a);
        table.delete(b).expect("delete failed");
        b
    };
    tx.commit().expect("commit failed");

    let mut tx = begin(engine, true);
    let next = tx
        .table("t")
        .expect("table failed")
        .insert(Record::new(), &tuning)
        .expect("insert failed");
    assert!(next > last);
    tx.commit().expect("commit failed");
}
