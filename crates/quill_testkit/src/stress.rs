//! Stress tests for Quill engines.
//!
//! These helpers drive an engine from several threads at once and check
//! that readers always see a consistent snapshot while a writer commits.

use quill_core::{CoreError, Engine, Record, Table, Transaction, TuningContext};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Writable transactions committed.
    pub commits: usize,
    /// Read-only transactions completed.
    pub reads: usize,
    /// Writable `begin` calls rejected with `WriterConflict`.
    pub conflicts: usize,
    /// Total duration.
    pub duration: Duration,
}

impl StressTestResult {
    /// Commits per second.
    pub fn commits_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.commits as f64 / secs
        } else {
            0.0
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Commits each writer thread performs.
    pub commits_per_writer: usize,
    /// Records inserted per commit.
    pub records_per_commit: usize,
    /// Number of writer threads.
    pub writers: usize,
    /// Number of reader threads.
    pub readers: usize,
    /// Fill-percent hint attached to every insert.
    pub fill_percent: Option<f64>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            commits_per_writer: 50,
            records_per_commit: 4,
            writers: 2,
            readers: 4,
            fill_percent: None,
        }
    }
}

/// Name of the table the stress helpers write to.
pub const STRESS_TABLE: &str = "stress";

/// Runs writers and readers concurrently against `engine`.
///
/// Every commit inserts `records_per_commit` records, so a consistent
/// snapshot always holds a multiple of that many. Readers assert this, and
/// that the count they see never shrinks across their own transactions.
///
/// # Panics
///
/// Panics if any reader observes a torn or regressing snapshot.
pub fn stress_readers_and_writers<E: Engine>(engine: &E, config: &StressConfig) -> StressTestResult {
    {
        let mut tx = engine.begin(true).expect("Failed to begin setup");
        if tx.table(STRESS_TABLE).is_err() {
            tx.create_table(STRESS_TABLE).expect("Failed to create stress table");
        }
        tx.commit().expect("Failed to commit setup");
    }

    let tuning = config
        .fill_percent
        .map_or_else(TuningContext::new, |p| TuningContext::new().with_fill_percent(p));
    let writers_done = AtomicBool::new(false);
    let commits = AtomicUsize::new(0);
    let reads = AtomicUsize::new(0);
    let conflicts = AtomicUsize::new(0);
    let start = Instant::now();

    thread::scope(|scope| {
        let writer_handles: Vec<_> = (0..config.writers)
            .map(|_| {
                scope.spawn(|| {
                    let mut done = 0;
                    while done < config.commits_per_writer {
                        let mut tx = match engine.begin(true) {
                            Ok(tx) => tx,
                            Err(CoreError::WriterConflict) => {
                                conflicts.fetch_add(1, Ordering::Relaxed);
                                thread::yield_now();
                                continue;
                            }
                            Err(err) => panic!("writer begin failed: {err}"),
                        };
                        {
                            let table = tx.table(STRESS_TABLE).expect("stress table missing");
                            for n in 0..config.records_per_commit {
                                table
                                    .insert(Record::new().with("n", n as i64), &tuning)
                                    .expect("insert failed");
                            }
                        }
                        tx.commit().expect("commit failed");
                        commits.fetch_add(1, Ordering::Relaxed);
                        done += 1;
                    }
                })
            })
            .collect();

        for _ in 0..config.readers {
            scope.spawn(|| {
                let mut last_seen = 0;
                loop {
                    let finished = writers_done.load(Ordering::Acquire);
                    let mut tx = engine.begin(false).expect("reader begin failed");
                    let (len, walked) = {
                        let table = tx.table(STRESS_TABLE).expect("stress table missing");
                        let len = table.len().expect("len failed");
                        (len, table.cursor().expect("cursor failed").count())
                    };
                    tx.rollback().expect("reader rollback failed");

                    assert_eq!(len, walked, "cursor disagrees with len");
                    assert_eq!(len % config.records_per_commit.max(1), 0, "torn snapshot");
                    assert!(len >= last_seen, "snapshot went backwards");
                    last_seen = len;
                    reads.fetch_add(1, Ordering::Relaxed);

                    if finished {
                        break;
                    }
                }
            });
        }

        for handle in writer_handles {
            handle.join().expect("writer panicked");
        }
        writers_done.store(true, Ordering::Release);
    });

    let result = StressTestResult {
        commits: commits.into_inner(),
        reads: reads.into_inner(),
        conflicts: conflicts.into_inner(),
        duration: start.elapsed(),
    };
    info!(
        commits = result.commits,
        reads = result.reads,
        conflicts = result.conflicts,
        commits_per_second = result.commits_per_second(),
        "stress run finished"
    );
    result
}
