//! Multi-threaded behaviour of both engines.

use quill_core::{CoreError, Engine, MemoryEngine, PagedEngine, Transaction};
use quill_testkit::{
    bounded_wait_config, fail_fast_config, init_tracing, memory_engine, paged_memory_engine,
    stress_readers_and_writers, test_config, StressConfig,
};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn readers_never_see_torn_commits_in_memory() {
    init_tracing();
    let engine = memory_engine();
    let result = stress_readers_and_writers(&engine, &StressConfig::default());
    assert_eq!(result.commits, 100);
    assert!(result.reads >= 4);
    assert_eq!(result.conflicts, 0);
}

#[test]
fn readers_never_see_torn_commits_on_pages() {
    init_tracing();
    let engine = paged_memory_engine();
    let config = StressConfig {
        commits_per_writer: 20,
        fill_percent: Some(0.9),
        ..StressConfig::default()
    };
    let result = stress_readers_and_writers(&engine, &config);
    assert_eq!(result.commits, 40);
}

#[test]
fn fail_fast_writers_retry_until_done() {
    let engine = MemoryEngine::new(fail_fast_config());
    let config = StressConfig {
        writers: 4,
        readers: 1,
        commits_per_writer: 25,
        ..StressConfig::default()
    };
    let result = stress_readers_and_writers(&engine, &config);
    assert_eq!(result.commits, 100);
}

#[test]
fn blocked_writer_resumes_after_commit() {
    let engine = PagedEngine::in_memory(test_config()).unwrap();
    let mut first = engine.begin(true).unwrap();
    first.create_table("t").unwrap();

    let (sender, receiver) = mpsc::channel();
    thread::scope(|scope| {
        scope.spawn(|| {
            let mut second = engine.begin(true).unwrap();
            let saw_table = second.table("t").is_ok();
            second.commit().unwrap();
            sender.send(saw_table).unwrap();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(receiver.try_recv().is_err(), "second writer did not wait");
        first.commit().unwrap();
    });

    assert!(receiver.recv().unwrap(), "second writer must start from the new commit");
}

#[test]
fn blocked_writer_gives_up_after_timeout() {
    let engine = MemoryEngine::new(bounded_wait_config(Duration::from_millis(30)));
    let mut first = engine.begin(true).unwrap();

    let started = Instant::now();
    let second = engine.begin(true).map(|_| ());
    assert!(matches!(second, Err(CoreError::WriterConflict)));
    assert!(started.elapsed() >= Duration::from_millis(30));

    first.rollback().unwrap();
    let mut third = engine.begin(true).unwrap();
    third.rollback().unwrap();
}

#[test]
fn readers_do_not_wait_for_the_writer() {
    let engine = MemoryEngine::new(fail_fast_config());
    let mut writer = engine.begin(true).unwrap();
    writer.create_table("t").unwrap();

    let readers: Vec<_> = (0..8).map(|_| engine.begin(false).unwrap()).collect();
    assert_eq!(engine.stats().active_readers, 8);
    for reader in &readers {
        assert!(reader.table("t").is_err());
    }

    writer.commit().unwrap();
    drop(readers);
    engine.close().unwrap();
}
